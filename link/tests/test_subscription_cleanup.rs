//! Channel lifecycle: `close()` and `Drop` release the channel on every exit
//! path, so the same channel name can be subscribed again afterwards.

use std::sync::Arc;

use venered_link::{
    watch, Backend, ChannelSpec, EventSelector, FnHandler, MemoryBackend, Realtime, RealtimeEvent, Table,
    VeneredLinkError,
};

mod common;
use common::{message_to, session};

fn spec(name: &str) -> ChannelSpec {
    ChannelSpec::new(name).on(EventSelector::Insert, Table::Messages, None)
}

#[tokio::test]
async fn test_close_is_idempotent_and_releases() {
    let memory = MemoryBackend::new();
    let mut sub = memory.subscribe(spec("room")).await.unwrap();
    assert!(!sub.is_closed());

    sub.close();
    sub.close();
    assert!(sub.is_closed());
    assert!(sub.next().await.is_none());
    assert!(memory.channel_names().is_empty());

    assert!(memory.subscribe(spec("room")).await.is_ok());
}

#[tokio::test]
async fn test_second_subscriber_on_open_name_is_rejected() {
    let memory = MemoryBackend::new();
    let _open = memory.subscribe(spec("room")).await.unwrap();
    match memory.subscribe(spec("room")).await {
        Err(VeneredLinkError::ChannelError(message)) => assert!(message.contains("already exists")),
        other => panic!("expected ChannelError, got {:?}", other.map(|s| s.channel().to_string())),
    }
}

#[tokio::test]
async fn test_drop_releases_on_early_exit() {
    let memory = MemoryBackend::new();

    async fn bail_out(memory: &MemoryBackend) -> Result<(), VeneredLinkError> {
        let _sub = memory.subscribe(spec("room")).await?;
        Err(VeneredLinkError::Cancelled)
    }
    assert!(bail_out(&memory).await.is_err());
    assert!(memory.channel_names().is_empty());
    assert!(memory.subscribe(spec("room")).await.is_ok());
}

#[tokio::test]
async fn test_counter_remount_reuses_channel_name() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;

    let first = session.unread_messages();
    first.start(session.realtime()).await.unwrap();
    let name = first.channel_name();
    assert_eq!(memory.channel_names(), vec![name.clone()]);
    drop(first);
    assert!(memory.channel_names().is_empty());

    let second = session.unread_messages();
    second.start(session.realtime()).await.unwrap();
    assert_eq!(second.channel_name(), name);

    memory
        .insert(Table::Messages, vec![message_to(me, false)])
        .await
        .map(|_| ())
        .unwrap();
    common::eventually("remounted counter live", || second.count() == 1).await;
}

#[tokio::test]
async fn test_restart_in_place() {
    let memory = MemoryBackend::new();
    let session = session(&memory);

    let badge = session.unread_notifications();
    badge.start(session.realtime()).await.unwrap();
    badge.start(session.realtime()).await.unwrap();
    assert!(badge.is_live());
    badge.close();
    assert!(memory.channel_names().is_empty());
}

#[tokio::test]
async fn test_watch_drop_releases() {
    let memory = MemoryBackend::new();
    let handler = Arc::new(FnHandler::new(|_| {}));

    let handle = watch(&memory, spec("watched"), handler.clone()).await.unwrap();
    assert!(handle.is_active());
    drop(handle);
    assert!(memory.channel_names().is_empty());

    let again = watch(&memory, spec("watched"), handler).await.unwrap();
    assert_eq!(again.channel(), "watched");
}

#[tokio::test]
async fn test_first_event_is_subscribed() {
    let memory = MemoryBackend::new();
    let mut sub = memory.subscribe(spec("room")).await.unwrap();
    match sub.next().await {
        Some(Ok(RealtimeEvent::Subscribed { channel, rejoin })) => {
            assert_eq!(channel, "room");
            assert!(!rejoin);
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_close_then_remount_without_yielding() {
    let memory = MemoryBackend::new();
    let session = session(&memory);

    let first = session.unread_messages();
    first.start(session.realtime()).await.unwrap();
    first.close();
    assert!(memory.channel_names().is_empty());

    let second = session.unread_messages();
    second.start(session.realtime()).await.unwrap();
    assert_eq!(memory.channel_names(), vec![second.channel_name()]);
    drop(second);

    let third = session.unread_messages();
    assert!(third.start(session.realtime()).await.is_ok());
}

#[tokio::test]
async fn test_feed_close_then_remount_without_yielding() {
    let memory = MemoryBackend::new();
    let session = session(&memory);

    let feed = session.notification_feed();
    feed.start(session.realtime()).await.unwrap();
    drop(feed);
    assert!(memory.channel_names().is_empty());

    let again = session.notification_feed();
    assert!(again.start(session.realtime()).await.is_ok());
    assert!(again.is_live());
}

#[tokio::test]
async fn test_watch_close_frees_name_immediately() {
    let memory = MemoryBackend::new();
    let handler = Arc::new(FnHandler::new(|_| {}));

    let mut handle = watch(&memory, spec("watched"), handler.clone()).await.unwrap();
    handle.close();
    handle.close();
    assert!(memory.channel_names().is_empty());
    assert!(watch(&memory, spec("watched"), handler).await.is_ok());
}
