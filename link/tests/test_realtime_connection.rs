//! `RealtimeConnection` against a local fake of the Phoenix realtime
//! endpoint: join handshake, change routing, duplicate suppression and
//! rejected joins.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;
use venered_link::{
    AuthContext, ChangeKind, ChannelSpec, EventSelector, Realtime, RealtimeEvent, RowFilter,
    Table, VeneredLinkClient, VeneredLinkError, VeneredLinkTimeouts,
};

mod common;

fn change_frame(topic: &str, id: &str, commit: &str) -> String {
    json!({
        "topic": topic,
        "event": "postgres_changes",
        "ref": null,
        "payload": {
            "ids": [1],
            "data": {
                "type": "INSERT",
                "table": "messages",
                "schema": "public",
                "commit_timestamp": commit,
                "record": {"id": id, "receiver_id": "me", "read": false},
                "old_record": null,
            }
        }
    })
    .to_string()
}

/// Serve one socket. Joins are answered with `join_status`; accepted joins
/// are followed by a change, a duplicate of it, and a second change. Every
/// frame received is forwarded to the returned receiver.
async fn fake_realtime(join_status: &'static str) -> (String, mpsc::UnboundedReceiver<JsonValue>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Ok(text) = msg.to_text() else { continue };
            let Ok(frame) = serde_json::from_str::<JsonValue>(text) else { continue };
            let _ = seen_tx.send(frame.clone());

            let topic = frame["topic"].as_str().unwrap_or_default().to_string();
            let reply = |status: &str, response: JsonValue| {
                json!({
                    "topic": topic,
                    "event": "phx_reply",
                    "ref": frame["ref"],
                    "join_ref": frame["join_ref"],
                    "payload": {"status": status, "response": response},
                })
                .to_string()
            };

            match frame["event"].as_str() {
                Some("phx_join") if join_status == "ok" => {
                    ws.send(Message::text(reply("ok", json!({"postgres_changes": []}))))
                        .await
                        .unwrap();
                    for (id, commit) in [("m1", "2024-05-01T10:00:00Z"), ("m1", "2024-05-01T10:00:00Z"), ("m2", "2024-05-01T10:00:01Z")] {
                        ws.send(Message::text(change_frame(&topic, id, commit))).await.unwrap();
                    }
                },
                Some("phx_join") => {
                    ws.send(Message::text(reply("error", json!({"reason": "invalid filter"}))))
                        .await
                        .unwrap();
                },
                Some("heartbeat") | Some("phx_leave") => {
                    ws.send(Message::text(reply("ok", json!({})))).await.unwrap();
                },
                _ => {},
            }
        }
    });

    (base_url, seen_rx)
}

async fn connect(base_url: &str) -> venered_link::RealtimeConnection {
    let client = VeneredLinkClient::builder()
        .base_url(base_url)
        .api_key("anon")
        .timeouts(VeneredLinkTimeouts::fast())
        .build()
        .unwrap();
    let auth = AuthContext::new(Uuid::new_v4(), "user-token");
    client.connect_realtime(&auth).await.unwrap()
}

fn spec() -> ChannelSpec {
    ChannelSpec::new("unread-messages-me").on(
        EventSelector::Insert,
        Table::Messages,
        Some(RowFilter::eq("receiver_id", "me")),
    )
}

#[tokio::test]
async fn test_join_and_receive_changes_without_duplicates() {
    let (base_url, mut seen) = fake_realtime("ok").await;
    let realtime = connect(&base_url).await;
    assert!(realtime.is_connected());

    let mut sub = realtime.subscribe(spec()).await.unwrap();

    let join = tokio::time::timeout(common::WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["topic"], "realtime:unread-messages-me");
    assert_eq!(join["payload"]["access_token"], "user-token");
    assert_eq!(
        join["payload"]["config"]["postgres_changes"][0],
        json!({"event": "INSERT", "schema": "public", "table": "messages", "filter": "receiver_id=eq.me"})
    );

    let mut changes = Vec::new();
    while changes.len() < 2 {
        match tokio::time::timeout(common::WAIT, sub.next()).await.unwrap() {
            Some(Ok(RealtimeEvent::Subscribed { rejoin, .. })) => assert!(!rejoin),
            Some(Ok(RealtimeEvent::Change(change))) => changes.push(change),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(changes[0].kind, ChangeKind::Insert);
    assert_eq!(changes[0].row_id().as_deref(), Some("m1"));
    assert_eq!(changes[1].row_id().as_deref(), Some("m2"));
    assert_eq!(realtime.list_channels().await, vec!["unread-messages-me".to_string()]);
}

#[tokio::test]
async fn test_rejected_join_fails_subscribe_and_frees_name() {
    let (base_url, _seen) = fake_realtime("error").await;
    let realtime = connect(&base_url).await;

    match realtime.subscribe(spec()).await {
        Err(VeneredLinkError::ChannelError(message)) => assert!(message.contains("invalid filter")),
        other => panic!("expected ChannelError, got {:?}", other.map(|s| s.channel().to_string())),
    }
    assert!(realtime.list_channels().await.is_empty());
}

#[tokio::test]
async fn test_close_sends_leave() {
    let (base_url, mut seen) = fake_realtime("ok").await;
    let realtime = connect(&base_url).await;

    let mut sub = realtime.subscribe(spec()).await.unwrap();
    sub.close();

    let leave = loop {
        let frame = tokio::time::timeout(common::WAIT, seen.recv()).await.unwrap().unwrap();
        if frame["event"] == "phx_leave" {
            break frame;
        }
    };
    assert_eq!(leave["topic"], "realtime:unread-messages-me");
    assert!(realtime.list_channels().await.is_empty());
}

#[tokio::test]
async fn test_close_then_resubscribe_same_name() {
    let (base_url, _seen) = fake_realtime("ok").await;
    let realtime = connect(&base_url).await;

    let mut first = realtime.subscribe(spec()).await.unwrap();
    first.close();
    let second = realtime.subscribe(spec()).await.unwrap();
    assert_eq!(second.channel(), "unread-messages-me");
    drop(second);

    assert!(realtime.subscribe(spec()).await.is_ok());
}
