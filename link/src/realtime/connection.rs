//! Shared realtime WebSocket multiplexed across channels.
//!
//! One background task owns the socket and handles:
//!
//! - Phoenix channel joins and leaves, one topic per [`ChannelSpec`]
//! - Routing `postgres_changes` frames to the owning subscription
//! - Heartbeats on the `phoenix` topic and a dead-socket timeout
//! - Automatic reconnection with exponential backoff, then rejoining every
//!   open channel
//! - Connection lifecycle events (`on_connect`, `on_disconnect`, `on_error`)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream as TungsteniteStream};
use url::Url;

use super::subscription::Subscription;
use super::Realtime;
use crate::{
    error::{Result, VeneredLinkError},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{
        realtime_frame::{
            PostgresChangesPayload, PHX_CLOSE, PHX_ERROR, PHX_REPLY, POSTGRES_CHANGES, SYSTEM,
        },
        ChangeEvent, ChannelSpec, ConnectionOptions, PhoenixFrame, RealtimeEvent,
    },
    timeouts::VeneredLinkTimeouts,
};

pub(crate) type WebSocketStream = TungsteniteStream<MaybeTlsStream<TcpStream>>;

/// Capacity of each subscription's event queue.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum text frame size (16 MiB).
const MAX_WS_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// Effectively "never" for `sleep_until` without overflowing `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Realtime endpoint for a project URL:
/// `https://host` becomes `wss://host/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
pub(crate) fn resolve_ws_url(base_url: &str, api_key: &str) -> Result<String> {
    let base = Url::parse(base_url.trim()).map_err(|e| {
        VeneredLinkError::ConfigurationError(format!("Invalid base_url '{}': {}", base_url, e))
    })?;
    validate_base_url(&base)?;

    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(VeneredLinkError::ConfigurationError(format!(
                "base_url must use http(s) or ws(s) (found '{}')",
                other
            )))
        },
    };

    let mut ws_url = base.clone();
    ws_url.set_scheme(scheme).map_err(|_| {
        VeneredLinkError::ConfigurationError(format!("Cannot derive {} URL from base_url", scheme))
    })?;
    let path = format!("{}/realtime/v1/websocket", base.path().trim_end_matches('/'));
    ws_url.set_path(&path);
    ws_url
        .query_pairs_mut()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(ws_url.to_string())
}

fn validate_base_url(url: &Url) -> Result<()> {
    if url.host_str().is_none() {
        return Err(VeneredLinkError::ConfigurationError(
            "base_url must include a host".to_string(),
        ));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(VeneredLinkError::ConfigurationError(
            "base_url must not include username/password credentials".to_string(),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(VeneredLinkError::ConfigurationError(
            "base_url must not include query parameters or fragments".to_string(),
        ));
    }
    Ok(())
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
enum ConnCmd {
    /// Join a channel over the shared socket.
    Join {
        spec: ChannelSpec,
        generation: u64,
        event_tx: mpsc::Sender<Result<RealtimeEvent>>,
        result_tx: oneshot::Sender<Result<()>>,
    },
    /// Leave a channel. Ignored unless `generation` matches the current
    /// entry, so a stale handle cannot close a channel reopened under the
    /// same name.
    Leave { topic: String, generation: u64 },
    /// Names of all open channels.
    ListChannels {
        result_tx: oneshot::Sender<Vec<String>>,
    },
    /// Gracefully shut down the connection.
    Shutdown,
}

// ── Per-channel state ───────────────────────────────────────────────────────

struct ChannelEntry {
    spec: ChannelSpec,
    event_tx: mpsc::Sender<Result<RealtimeEvent>>,
    generation: u64,
    /// Set after the first successful join; later joins are rejoins.
    ever_joined: bool,
}

/// Join frames in flight, keyed by frame ref.
struct PendingJoin {
    topic: String,
    generation: u64,
}

/// Everything the connection task tracks between sockets.
struct ChannelState {
    channels: HashMap<String, ChannelEntry>,
    pending: HashMap<String, PendingJoin>,
    /// Subscribe calls still waiting for their first `phx_reply`, by topic.
    waiters: HashMap<String, oneshot::Sender<Result<()>>>,
    next_ref: u64,
    access_token: String,
}

impl ChannelState {
    fn new(access_token: String) -> Self {
        Self {
            channels: HashMap::new(),
            pending: HashMap::new(),
            waiters: HashMap::new(),
            next_ref: 1,
            access_token,
        }
    }

    fn next_ref(&mut self) -> String {
        let reference = self.next_ref.to_string();
        self.next_ref += 1;
        reference
    }

    /// Register a channel. Rejects a name that is still open.
    fn accept_join(
        &mut self,
        spec: ChannelSpec,
        generation: u64,
        event_tx: mpsc::Sender<Result<RealtimeEvent>>,
        result_tx: oneshot::Sender<Result<()>>,
    ) -> Option<String> {
        let topic = spec.topic();
        if self.channels.contains_key(&topic) {
            let _ = result_tx.send(Err(VeneredLinkError::ChannelError(format!(
                "channel '{}' already exists",
                spec.name
            ))));
            return None;
        }
        self.channels.insert(
            topic.clone(),
            ChannelEntry {
                spec,
                event_tx,
                generation,
                ever_joined: false,
            },
        );
        self.waiters.insert(topic.clone(), result_tx);
        Some(topic)
    }

    /// Remove a channel if `generation` matches. Returns true when removed.
    fn remove(&mut self, topic: &str, generation: u64) -> bool {
        let matches = self
            .channels
            .get(topic)
            .map_or(false, |e| e.generation == generation);
        if !matches {
            log::debug!(
                "[REALTIME] Ignoring stale leave for '{}' (gen={}, current={:?})",
                topic,
                generation,
                self.channels.get(topic).map(|e| e.generation),
            );
            return false;
        }
        self.channels.remove(topic);
        self.waiters.remove(topic);
        self.pending.retain(|_, p| p.topic != topic);
        true
    }

    fn names(&self) -> Vec<String> {
        self.channels.values().map(|e| e.spec.name.clone()).collect()
    }

    /// Fail every open channel and waiter, leaving the state empty.
    fn fail_all(&mut self, message: &str) {
        for (_, entry) in self.channels.drain() {
            let _ = entry
                .event_tx
                .try_send(Err(VeneredLinkError::WebSocketError(message.to_string())));
        }
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(VeneredLinkError::WebSocketError(message.to_string())));
        }
        self.pending.clear();
    }
}

// ── RealtimeConnection (public handle) ──────────────────────────────────────

/// A single realtime WebSocket shared by every channel of one session.
///
/// Created via [`VeneredLinkClient::connect_realtime`](crate::VeneredLinkClient::connect_realtime).
/// Subscribe and leave requests are commands to a background task that owns
/// the socket; commands are processed in the order they were issued, so a
/// leave followed by a join of the same name always succeeds.
pub struct RealtimeConnection {
    cmd_tx: mpsc::UnboundedSender<ConnCmd>,
    connected: Arc<AtomicBool>,
    next_generation: AtomicU64,
    subscribe_timeout: Duration,
    dedup_window: usize,
    _task: JoinHandle<()>,
}

impl RealtimeConnection {
    /// Open the realtime socket.
    ///
    /// Waits for the initial handshake. If it fails the error is logged and
    /// the background task keeps retrying when auto-reconnect is enabled.
    pub(crate) async fn connect(
        ws_url: String,
        access_token: String,
        timeouts: VeneredLinkTimeouts,
        connection_options: ConnectionOptions,
        event_handlers: EventHandlers,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ConnCmd>();
        let connected = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let subscribe_timeout = timeouts.subscribe_timeout;
        let dedup_window = connection_options.dedup_window;
        let auto_reconnect = connection_options.auto_reconnect;
        let connected_clone = connected.clone();

        let task = tokio::spawn(async move {
            connection_task(
                cmd_rx,
                ws_url,
                ChannelState::new(access_token),
                timeouts,
                connection_options,
                event_handlers,
                connected_clone,
                Some(ready_tx),
            )
            .await;
        });

        match ready_rx.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) if !auto_reconnect => return Err(e),
            Ok(Err(e)) => log::warn!("[REALTIME] Initial connection failed: {}", e),
            Err(_) => log::warn!("[REALTIME] Connection task exited before signalling readiness"),
        }

        Ok(Self {
            cmd_tx,
            connected,
            next_generation: AtomicU64::new(1),
            subscribe_timeout,
            dedup_window,
            _task: task,
        })
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Names of all open channels.
    pub async fn list_channels(&self) -> Vec<String> {
        let (result_tx, result_rx) = oneshot::channel();
        if self.cmd_tx.send(ConnCmd::ListChannels { result_tx }).is_err() {
            return Vec::new();
        }
        result_rx.await.unwrap_or_default()
    }

    /// Leave every channel and close the socket.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(ConnCmd::Shutdown);
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(ConnCmd::Shutdown);
    }
}

#[async_trait]
impl Realtime for RealtimeConnection {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription> {
        let (event_tx, event_rx) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = oneshot::channel();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let topic = spec.topic();
        let name = spec.name.clone();

        self.cmd_tx
            .send(ConnCmd::Join {
                spec,
                generation,
                event_tx,
                result_tx,
            })
            .map_err(|_| {
                VeneredLinkError::WebSocketError("Connection task is not running".to_string())
            })?;

        let outcome = if VeneredLinkTimeouts::is_no_timeout(self.subscribe_timeout) {
            Ok(result_rx.await)
        } else {
            tokio::time::timeout(self.subscribe_timeout, result_rx).await
        };

        match outcome {
            Ok(Ok(Ok(()))) => {},
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(_)) => {
                return Err(VeneredLinkError::WebSocketError(
                    "Connection task died before confirming join".to_string(),
                ))
            },
            Err(_) => {
                let _ = self.cmd_tx.send(ConnCmd::Leave { topic, generation });
                return Err(VeneredLinkError::TimeoutError(format!(
                    "Join of '{}' not acknowledged within {:?}",
                    name, self.subscribe_timeout
                )));
            },
        }

        log::info!("[REALTIME] Joined channel '{}'", name);
        let cmd_tx = self.cmd_tx.clone();
        Ok(Subscription::new(
            name,
            event_rx,
            self.dedup_window,
            // Queued ahead of any later Join, so the name is free for the
            // next subscriber as soon as this returns.
            Box::new(move || {
                let _ = cmd_tx.send(ConnCmd::Leave { topic, generation });
            }),
        ))
    }
}

// ── Socket helpers ──────────────────────────────────────────────────────────

/// Open the WebSocket.
async fn establish_ws(
    ws_url: &str,
    timeouts: &VeneredLinkTimeouts,
    event_handlers: &EventHandlers,
) -> Result<WebSocketStream> {
    log::debug!("[REALTIME] Establishing WebSocket connection");

    let connect_result = if !VeneredLinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        tokio::time::timeout(
            timeouts.connection_timeout,
            tokio_tungstenite::connect_async(ws_url),
        )
        .await
    } else {
        Ok(tokio_tungstenite::connect_async(ws_url).await)
    };

    match connect_result {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(WsError::Http(response))) => {
            let status = response.status();
            let body_text = response
                .into_body()
                .as_ref()
                .and_then(|b| {
                    if b.is_empty() {
                        None
                    } else {
                        Some(String::from_utf8_lossy(b).into_owned())
                    }
                })
                .unwrap_or_default();
            let message = match status.as_u16() {
                401 => "Unauthorized: realtime requires a valid api key".to_string(),
                403 => "Forbidden: access to realtime denied".to_string(),
                code if body_text.is_empty() => format!("WebSocket HTTP error: {}", code),
                code => format!("WebSocket HTTP error {}: {}", code, body_text),
            };
            event_handlers.emit_error(ConnectionError::new(&message, false));
            Err(VeneredLinkError::WebSocketError(message))
        },
        Ok(Err(e)) => {
            let msg = format!("Connection failed: {}", e);
            event_handlers.emit_error(ConnectionError::new(&msg, true));
            Err(VeneredLinkError::WebSocketError(msg))
        },
        Err(_) => {
            let msg = format!("Connection timeout ({:?})", timeouts.connection_timeout);
            event_handlers.emit_error(ConnectionError::new(&msg, true));
            Err(VeneredLinkError::TimeoutError(msg))
        },
    }
}

async fn send_frame(
    ws: &mut WebSocketStream,
    frame: &PhoenixFrame,
    event_handlers: &EventHandlers,
) -> Result<()> {
    let payload = serde_json::to_string(frame)?;
    event_handlers.emit_send(&payload);
    ws.send(Message::Text(payload.into())).await.map_err(|e| {
        VeneredLinkError::WebSocketError(format!("Failed to send {}: {}", frame.event, e))
    })
}

/// Send the join frame for `topic` and record it as pending.
async fn send_join(
    ws: &mut WebSocketStream,
    state: &mut ChannelState,
    topic: &str,
    event_handlers: &EventHandlers,
) -> Result<()> {
    let (config, generation) = match state.channels.get(topic) {
        Some(entry) => (entry.spec.join_config(), entry.generation),
        None => return Ok(()),
    };
    let reference = state.next_ref();
    let frame = PhoenixFrame::join(topic, config, &state.access_token, reference.clone());
    send_frame(ws, &frame, event_handlers).await?;
    state.pending.insert(
        reference,
        PendingJoin {
            topic: topic.to_string(),
            generation,
        },
    );
    Ok(())
}

/// Rejoin every open channel after a reconnect.
async fn rejoin_all(
    ws: &mut WebSocketStream,
    state: &mut ChannelState,
    event_handlers: &EventHandlers,
) -> Result<()> {
    state.pending.clear();
    let topics: Vec<String> = state.channels.keys().cloned().collect();
    log::info!("[REALTIME] Rejoining {} channel(s) after reconnect", topics.len());
    for topic in topics {
        send_join(ws, state, &topic, event_handlers).await?;
    }
    Ok(())
}

/// Dispatch one inbound frame. Returns topics that must be rejoined.
async fn route_frame(
    frame: PhoenixFrame,
    state: &mut ChannelState,
    event_handlers: &EventHandlers,
) -> Vec<String> {
    match frame.event.as_str() {
        PHX_REPLY => {
            let Some(pending) = frame
                .reference
                .as_ref()
                .and_then(|r| state.pending.remove(r))
            else {
                // Heartbeat and leave replies
                return Vec::new();
            };
            let Some(reply) = frame.reply() else {
                return Vec::new();
            };
            let Some(entry) = state
                .channels
                .get_mut(&pending.topic)
                .filter(|e| e.generation == pending.generation)
            else {
                return Vec::new();
            };

            if reply.is_ok() {
                let rejoin = entry.ever_joined;
                entry.ever_joined = true;
                let event = RealtimeEvent::Subscribed {
                    channel: entry.spec.name.clone(),
                    rejoin,
                };
                let _ = entry.event_tx.send(Ok(event)).await;
                if let Some(waiter) = state.waiters.remove(&pending.topic) {
                    let _ = waiter.send(Ok(()));
                }
            } else {
                let message = format!("join of '{}' rejected: {}", entry.spec.name, reply.reason());
                log::warn!("[REALTIME] {}", message);
                event_handlers.emit_error(ConnectionError::new(&message, false));
                match state.waiters.remove(&pending.topic) {
                    Some(waiter) => {
                        state.channels.remove(&pending.topic);
                        let _ = waiter.send(Err(VeneredLinkError::ChannelError(message)));
                    },
                    None => {
                        let _ = entry
                            .event_tx
                            .send(Err(VeneredLinkError::ChannelError(message)))
                            .await;
                    },
                }
            }
            Vec::new()
        },
        POSTGRES_CHANGES => {
            let Some(entry) = state.channels.get(&frame.topic) else {
                log::debug!("[REALTIME] Change for unknown topic '{}'", frame.topic);
                return Vec::new();
            };
            match serde_json::from_value::<PostgresChangesPayload>(frame.payload) {
                Ok(payload) => {
                    let data = payload.data;
                    let change = ChangeEvent {
                        channel: entry.spec.name.clone(),
                        table: data.table,
                        kind: data.kind,
                        commit_timestamp: data.commit_timestamp,
                        record: data.record,
                        old_record: data.old_record,
                    };
                    if entry.event_tx.send(Ok(RealtimeEvent::Change(change))).await.is_err() {
                        log::debug!("[REALTIME] Receiver for '{}' dropped", entry.spec.name);
                    }
                },
                Err(e) => log::warn!("[REALTIME] Undecodable change on '{}': {}", frame.topic, e),
            }
            Vec::new()
        },
        PHX_ERROR | PHX_CLOSE => {
            let Some(entry) = state.channels.get(&frame.topic) else {
                return Vec::new();
            };
            let message = format!("channel '{}' got {}", entry.spec.name, frame.event);
            log::warn!("[REALTIME] {}", message);
            event_handlers.emit_error(ConnectionError::new(&message, true));
            vec![frame.topic]
        },
        SYSTEM => {
            let status = frame.payload.get("status").and_then(|s| s.as_str());
            let text = frame.payload.get("message").and_then(|s| s.as_str()).unwrap_or("");
            if status == Some("error") {
                if let Some(entry) = state.channels.get(&frame.topic) {
                    let message = format!("channel '{}': {}", entry.spec.name, text);
                    event_handlers.emit_error(ConnectionError::new(&message, false));
                    let _ = entry
                        .event_tx
                        .send(Err(VeneredLinkError::ChannelError(message)))
                        .await;
                }
            } else {
                log::debug!("[REALTIME] System message on '{}': {}", frame.topic, text);
            }
            Vec::new()
        },
        other => {
            log::debug!("[REALTIME] Ignoring '{}' on '{}'", other, frame.topic);
            Vec::new()
        },
    }
}

// ── Background connection task ──────────────────────────────────────────────

/// The main background task managing the realtime socket.
///
/// Lifecycle:
/// 1. Open the WebSocket
/// 2. Event loop: read frames, process commands, send heartbeats
/// 3. On disconnect: reconnect with exponential backoff
/// 4. On reconnect: rejoin every open channel
#[allow(clippy::too_many_arguments)]
async fn connection_task(
    mut cmd_rx: mpsc::UnboundedReceiver<ConnCmd>,
    ws_url: String,
    mut state: ChannelState,
    timeouts: VeneredLinkTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    connected: Arc<AtomicBool>,
    ready_tx: Option<oneshot::Sender<Result<()>>>,
) {
    let mut ws_stream: Option<WebSocketStream> = None;
    let mut shutdown_requested = false;
    let mut reconnect_attempts: u32 = 0;

    let has_heartbeat = !timeouts.heartbeat_interval.is_zero();
    let heartbeat_dur = if has_heartbeat {
        timeouts.heartbeat_interval
    } else {
        FAR_FUTURE
    };
    let mut heartbeat_deadline = TokioInstant::now() + heartbeat_dur;

    // After a heartbeat some frame must arrive within this window.
    let pong_timeout_dur = timeouts.pong_timeout;
    let has_pong_timeout = has_heartbeat && !pong_timeout_dur.is_zero();
    let mut awaiting_pong = false;
    let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

    match establish_ws(&ws_url, &timeouts, &event_handlers).await {
        Ok(stream) => {
            ws_stream = Some(stream);
            connected.store(true, Ordering::SeqCst);
            event_handlers.emit_connect();
            if let Some(tx) = ready_tx {
                let _ = tx.send(Ok(()));
            }
        },
        Err(e) => {
            if let Some(tx) = ready_tx {
                let _ = tx.send(Err(e));
            }
            if !connection_options.auto_reconnect {
                return;
            }
        },
    }

    loop {
        if shutdown_requested {
            if let Some(ref mut ws) = ws_stream {
                let topics: Vec<String> = state.channels.keys().cloned().collect();
                for topic in topics {
                    let reference = state.next_ref();
                    let _ = send_frame(ws, &PhoenixFrame::leave(&topic, reference), &event_handlers)
                        .await;
                }
                let _ = ws.close(None).await;
            }
            state.fail_all("Connection closed");
            if connected.swap(false, Ordering::SeqCst) {
                event_handlers.emit_disconnect(DisconnectReason::new("Client disconnected"));
            }
            return;
        }

        if let Some(ref mut ws) = ws_stream {
            let mut drop_socket = false;
            let heartbeat_sleep = tokio::time::sleep_until(heartbeat_deadline);
            tokio::pin!(heartbeat_sleep);
            let pong_sleep = tokio::time::sleep_until(pong_deadline);
            tokio::pin!(pong_sleep);

            tokio::select! {
                biased;

                _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                    log::warn!(
                        "[REALTIME] No frame within {:?} of heartbeat, treating socket as dead",
                        pong_timeout_dur,
                    );
                    event_handlers.emit_disconnect(DisconnectReason::new(format!(
                        "Heartbeat timeout ({:?})",
                        pong_timeout_dur,
                    )));
                    drop_socket = true;
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ConnCmd::Join { spec, generation, event_tx, result_tx }) => {
                            if let Some(topic) = state.accept_join(spec, generation, event_tx, result_tx) {
                                if let Err(e) = send_join(ws, &mut state, &topic, &event_handlers).await {
                                    log::warn!("[REALTIME] {}", e);
                                    drop_socket = true;
                                }
                            }
                        },
                        Some(ConnCmd::Leave { topic, generation }) => {
                            if state.remove(&topic, generation) {
                                let reference = state.next_ref();
                                let frame = PhoenixFrame::leave(&topic, reference);
                                if let Err(e) = send_frame(ws, &frame, &event_handlers).await {
                                    log::warn!("[REALTIME] {}", e);
                                    drop_socket = true;
                                }
                            }
                        },
                        Some(ConnCmd::ListChannels { result_tx }) => {
                            let _ = result_tx.send(state.names());
                        },
                        Some(ConnCmd::Shutdown) | None => {
                            shutdown_requested = true;
                        },
                    }
                }

                _ = &mut heartbeat_sleep, if has_heartbeat && !awaiting_pong => {
                    let reference = state.next_ref();
                    if let Err(e) = send_frame(ws, &PhoenixFrame::heartbeat(reference), &event_handlers).await {
                        log::warn!("[REALTIME] Heartbeat failed: {}", e);
                        event_handlers.emit_disconnect(DisconnectReason::new(format!(
                            "Heartbeat failed: {}",
                            e
                        )));
                        drop_socket = true;
                    } else if has_pong_timeout {
                        awaiting_pong = true;
                        pong_deadline = TokioInstant::now() + pong_timeout_dur;
                    }
                    heartbeat_deadline = TokioInstant::now() + heartbeat_dur;
                }

                frame = ws.next() => {
                    heartbeat_deadline = TokioInstant::now() + heartbeat_dur;
                    awaiting_pong = false;
                    pong_deadline = TokioInstant::now() + FAR_FUTURE;

                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
                                log::warn!("[REALTIME] Text frame too large ({} bytes)", text.len());
                            } else {
                                event_handlers.emit_receive(&text);
                                match serde_json::from_str::<PhoenixFrame>(&text) {
                                    Ok(frame) => {
                                        let rejoin = route_frame(frame, &mut state, &event_handlers).await;
                                        for topic in rejoin {
                                            if let Err(e) = send_join(ws, &mut state, &topic, &event_handlers).await {
                                                log::warn!("[REALTIME] {}", e);
                                                drop_socket = true;
                                                break;
                                            }
                                        }
                                    },
                                    Err(e) => log::warn!("[REALTIME] Failed to parse frame: {}", e),
                                }
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let reason = match frame {
                                Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                                None => DisconnectReason::new("Server closed connection"),
                            };
                            event_handlers.emit_disconnect(reason);
                            drop_socket = true;
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => {
                            let msg = e.to_string();
                            event_handlers.emit_error(ConnectionError::new(&msg, true));
                            event_handlers.emit_disconnect(DisconnectReason::new(format!(
                                "WebSocket error: {}",
                                msg
                            )));
                            drop_socket = true;
                        },
                        None => {
                            event_handlers.emit_disconnect(DisconnectReason::new("WebSocket stream ended"));
                            drop_socket = true;
                        },
                    }
                }
            }

            if drop_socket {
                connected.store(false, Ordering::SeqCst);
                awaiting_pong = false;
                pong_deadline = TokioInstant::now() + FAR_FUTURE;
                ws_stream = None;
            }
        } else {
            // ── Not connected ──

            if !connection_options.auto_reconnect {
                state.fail_all("Connection lost and auto-reconnect is disabled");
                match cmd_rx.recv().await {
                    Some(ConnCmd::Join { result_tx, .. }) => {
                        let _ = result_tx.send(Err(VeneredLinkError::WebSocketError(
                            "Not connected and auto-reconnect is disabled".to_string(),
                        )));
                    },
                    Some(ConnCmd::Leave { topic, generation }) => {
                        state.remove(&topic, generation);
                    },
                    Some(ConnCmd::ListChannels { result_tx }) => {
                        let _ = result_tx.send(state.names());
                    },
                    Some(ConnCmd::Shutdown) | None => shutdown_requested = true,
                }
                continue;
            }

            if !connection_options.may_reconnect(reconnect_attempts) {
                let message = format!(
                    "Max reconnection attempts ({}) reached",
                    reconnect_attempts
                );
                log::warn!("[REALTIME] {}", message);
                event_handlers.emit_error(ConnectionError::new(&message, false));
                state.fail_all(&message);
                loop {
                    match cmd_rx.recv().await {
                        Some(ConnCmd::Join { result_tx, .. }) => {
                            let _ = result_tx.send(Err(VeneredLinkError::WebSocketError(
                                message.clone(),
                            )));
                        },
                        Some(ConnCmd::Leave { .. }) => {},
                        Some(ConnCmd::ListChannels { result_tx }) => {
                            let _ = result_tx.send(Vec::new());
                        },
                        Some(ConnCmd::Shutdown) | None => return,
                    }
                }
            }

            let delay = connection_options.backoff_ms(reconnect_attempts);
            reconnect_attempts += 1;
            log::info!(
                "[REALTIME] Attempting reconnection in {}ms (attempt {})",
                delay,
                reconnect_attempts
            );

            // Wait out the backoff while still serving commands; joins are
            // queued and sent once the socket is back.
            let sleep_fut = tokio::time::sleep(Duration::from_millis(delay));
            tokio::pin!(sleep_fut);
            loop {
                tokio::select! {
                    biased;
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(ConnCmd::Join { spec, generation, event_tx, result_tx }) => {
                                state.accept_join(spec, generation, event_tx, result_tx);
                            },
                            Some(ConnCmd::Leave { topic, generation }) => {
                                state.remove(&topic, generation);
                            },
                            Some(ConnCmd::ListChannels { result_tx }) => {
                                let _ = result_tx.send(state.names());
                            },
                            Some(ConnCmd::Shutdown) | None => {
                                shutdown_requested = true;
                                break;
                            },
                        }
                    }
                    _ = &mut sleep_fut => break,
                }
            }

            if shutdown_requested {
                continue;
            }

            match establish_ws(&ws_url, &timeouts, &event_handlers).await {
                Ok(mut stream) => {
                    log::info!("[REALTIME] Reconnection successful");
                    reconnect_attempts = 0;
                    connected.store(true, Ordering::SeqCst);
                    event_handlers.emit_connect();

                    if let Err(e) = rejoin_all(&mut stream, &mut state, &event_handlers).await {
                        log::warn!("[REALTIME] Rejoin failed: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        continue;
                    }

                    ws_stream = Some(stream);
                    heartbeat_deadline = TokioInstant::now() + heartbeat_dur;
                    awaiting_pong = false;
                    pong_deadline = TokioInstant::now() + FAR_FUTURE;
                },
                Err(e) => {
                    log::warn!("[REALTIME] Reconnection attempt {} failed: {}", reconnect_attempts, e);
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventSelector, Table};

    #[test]
    fn test_resolve_ws_url() {
        let url = resolve_ws_url("https://abc.supabase.co", "anon").unwrap();
        assert_eq!(
            url,
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let url = resolve_ws_url("http://localhost:54321/", "k").unwrap();
        assert_eq!(url, "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0");
    }

    #[test]
    fn test_resolve_ws_url_rejects_bad_bases() {
        assert!(resolve_ws_url("not a url", "k").is_err());
        assert!(resolve_ws_url("https://user:pw@host", "k").is_err());
        assert!(resolve_ws_url("https://host/?x=1", "k").is_err());
        assert!(resolve_ws_url("ftp://host", "k").is_err());
    }

    fn spec(name: &str) -> ChannelSpec {
        ChannelSpec::new(name).on(EventSelector::Insert, Table::Messages, None)
    }

    #[tokio::test]
    async fn test_duplicate_channel_name_is_rejected() {
        let mut state = ChannelState::new("tok".into());
        let (event_tx, _rx) = mpsc::channel(1);
        let (result_tx, _result_rx) = oneshot::channel();
        assert!(state.accept_join(spec("a"), 1, event_tx.clone(), result_tx).is_some());

        let (result_tx, result_rx) = oneshot::channel();
        assert!(state.accept_join(spec("a"), 2, event_tx, result_tx).is_none());
        assert!(matches!(
            result_rx.await.unwrap(),
            Err(VeneredLinkError::ChannelError(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_leave_is_ignored() {
        let mut state = ChannelState::new("tok".into());
        let (event_tx, _rx) = mpsc::channel(1);
        let (result_tx, _result_rx) = oneshot::channel();
        let topic = state.accept_join(spec("a"), 7, event_tx, result_tx).unwrap();

        assert!(!state.remove(&topic, 6));
        assert_eq!(state.names(), vec!["a".to_string()]);
        assert!(state.remove(&topic, 7));
        assert!(state.names().is_empty());
    }

    #[tokio::test]
    async fn test_join_reply_and_change_routing() {
        let mut state = ChannelState::new("tok".into());
        let handlers = EventHandlers::new();
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (result_tx, result_rx) = oneshot::channel();
        let topic = state.accept_join(spec("a"), 1, event_tx, result_tx).unwrap();
        state.pending.insert(
            "9".into(),
            PendingJoin {
                topic: topic.clone(),
                generation: 1,
            },
        );

        let reply: PhoenixFrame = serde_json::from_value(serde_json::json!({
            "topic": topic, "event": "phx_reply", "ref": "9",
            "payload": {"status": "ok", "response": {}}
        }))
        .unwrap();
        assert!(route_frame(reply, &mut state, &handlers).await.is_empty());
        assert!(result_rx.await.unwrap().is_ok());
        assert_eq!(
            event_rx.recv().await.unwrap().unwrap(),
            RealtimeEvent::Subscribed {
                channel: "a".into(),
                rejoin: false
            }
        );

        let change: PhoenixFrame = serde_json::from_value(serde_json::json!({
            "topic": topic, "event": "postgres_changes", "ref": null,
            "payload": {"data": {
                "type": "INSERT", "table": "messages", "schema": "public",
                "commit_timestamp": "2024-05-01T10:00:00Z",
                "record": {"id": "m1"}, "old_record": null
            }, "ids": [1]}
        }))
        .unwrap();
        route_frame(change, &mut state, &handlers).await;
        match event_rx.recv().await.unwrap().unwrap() {
            RealtimeEvent::Change(change) => {
                assert_eq!(change.channel, "a");
                assert_eq!(change.row_id().as_deref(), Some("m1"));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_join_fails_waiter_and_frees_name() {
        let mut state = ChannelState::new("tok".into());
        let handlers = EventHandlers::new();
        let (event_tx, _rx) = mpsc::channel(8);
        let (result_tx, result_rx) = oneshot::channel();
        let topic = state.accept_join(spec("a"), 1, event_tx, result_tx).unwrap();
        state.pending.insert("3".into(), PendingJoin { topic: topic.clone(), generation: 1 });

        let reply: PhoenixFrame = serde_json::from_value(serde_json::json!({
            "topic": topic, "event": "phx_reply", "ref": "3",
            "payload": {"status": "error", "response": {"reason": "invalid filter"}}
        }))
        .unwrap();
        route_frame(reply, &mut state, &handlers).await;

        assert!(matches!(
            result_rx.await.unwrap(),
            Err(VeneredLinkError::ChannelError(_))
        ));
        assert!(state.names().is_empty());
    }
}
