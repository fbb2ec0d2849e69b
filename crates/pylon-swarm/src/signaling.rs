//! WebSocket signaling gateway.
//!
//! One persistent connection per browser peer. Frames are JSON messages
//! from [`crate::messages`]; registry mutations happen under the registry
//! lock, delivery happens afterwards over per-connection unbounded queues
//! so a slow socket never stalls a mutation. Broadcasts iterate a
//! membership snapshot and tolerate individual send failures.

use crate::messages::{ClientMessage, ServerMessage};
use crate::rate_limit::SlidingWindow;
use crate::registry::SwarmRegistry;
use crate::types::{PeerId, now_millis};
use crate::SwarmError;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Close code for a frame that is not valid JSON (or not text at all).
pub const CLOSE_MALFORMED: u16 = 4002;
/// Close code for exceeding the per-connection message budget.
pub const CLOSE_TOO_MANY_MESSAGES: u16 = 4008;
/// Close code for a frame above the size cap.
pub const CLOSE_OVERSIZED: u16 = 4009;
/// Close code for missing two consecutive heartbeat pings.
pub const CLOSE_HEARTBEAT: u16 = 4000;

/// Gateway limits and timer periods.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Server-wide connection cap
    pub max_connections: usize,
    /// Largest accepted frame in bytes
    pub max_frame_bytes: usize,
    /// Messages one connection may send over its lifetime
    pub max_messages_per_connection: u64,
    /// Connections allowed per IP inside `rate_window`
    pub rate_max_connections: usize,
    /// Sliding window for the per-IP limiter
    pub rate_window: Duration,
    /// Ping cadence; a connection silent for two beats is dropped
    pub heartbeat_interval: Duration,
    /// Cadence of the room staleness sweep
    pub sweep_interval: Duration,
    /// Idle threshold for deleting rooms and orphaned files
    pub room_max_idle: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_frame_bytes: 64 * 1024,
            max_messages_per_connection: 10_000,
            rate_max_connections: 30,
            rate_window: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300),
            room_max_idle: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// What the writer task should do next.
enum Outbound {
    Message(ServerMessage),
    Ping,
    Close { code: u16, reason: &'static str },
}

struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Outbound>,
    /// Cleared when a ping goes out, set again by the pong.
    alive: Arc<AtomicBool>,
}

/// The signaling gateway: connection table plus its registry.
pub struct SignalingGateway {
    registry: Arc<SwarmRegistry>,
    config: SignalingConfig,
    limiter: SlidingWindow,
    connections: DashMap<PeerId, ConnectionHandle>,
}

impl SignalingGateway {
    /// New gateway over `registry`.
    #[must_use]
    pub fn new(registry: Arc<SwarmRegistry>, config: SignalingConfig) -> Self {
        let limiter = SlidingWindow::new(config.rate_max_connections, config.rate_window);
        Self {
            registry,
            config,
            limiter,
            connections: DashMap::new(),
        }
    }

    /// Router exposing `GET /ws`. Serve with
    /// `into_make_service_with_connect_info::<SocketAddr>()` so the
    /// per-IP limiter sees real client addresses.
    pub fn router(gateway: Arc<Self>) -> Router {
        Router::new()
            .route("/ws", get(ws_upgrade))
            .with_state(gateway)
    }

    /// Live connection count.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Registry handle (shared with the maintenance tasks).
    #[must_use]
    pub fn registry(&self) -> Arc<SwarmRegistry> {
        Arc::clone(&self.registry)
    }

    /// Spawn the heartbeat and staleness-sweep timers. The handles abort
    /// with the server on shutdown.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let heartbeat = {
            let gateway = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(gateway.config.heartbeat_interval);
                loop {
                    ticker.tick().await;
                    gateway.heartbeat();
                }
            })
        };

        let sweep = {
            let gateway = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(gateway.config.sweep_interval);
                loop {
                    ticker.tick().await;
                    let report = gateway.registry.sweep_stale(gateway.config.room_max_idle);
                    if report.groups_removed > 0 || report.files_removed > 0 {
                        info!(
                            rooms = report.groups_removed,
                            files = report.files_removed,
                            "idle rooms swept"
                        );
                    }
                    gateway.limiter.cleanup();
                }
            })
        };

        vec![heartbeat, sweep]
    }

    /// One heartbeat round: drop connections that missed the previous
    /// ping, ping the rest.
    fn heartbeat(&self) {
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().alive.swap(false, Ordering::AcqRel) {
                let _ = entry.value().tx.send(Outbound::Ping);
            } else {
                dead.push(entry.key().clone());
            }
        }

        for peer in dead {
            warn!(%peer, "closing unresponsive connection");
            if let Some((_, handle)) = self.connections.remove(&peer) {
                let _ = handle.tx.send(Outbound::Close {
                    code: CLOSE_HEARTBEAT,
                    reason: "heartbeat timeout",
                });
            }
            self.drop_peer(&peer);
        }
    }

    /// Registry removal plus `peer-left` fan-out.
    fn drop_peer(&self, peer: &str) {
        for departure in self.registry.remove_peer(peer) {
            let notice = ServerMessage::PeerLeft {
                room: departure.group,
                peer: peer.to_string(),
                timestamp: now_millis(),
            };
            self.broadcast(&departure.remaining, None, &notice);
        }
    }

    /// Best-effort delivery to one peer.
    fn send_to(&self, peer: &str, msg: &ServerMessage) {
        if let Some(handle) = self.connections.get(peer) {
            let _ = handle.tx.send(Outbound::Message(msg.clone()));
        }
    }

    /// Best-effort delivery to a membership snapshot, optionally skipping
    /// one peer. A failed send never aborts the loop.
    fn broadcast(&self, targets: &[PeerId], exclude: Option<&str>, msg: &ServerMessage) {
        for target in targets {
            if exclude == Some(target.as_str()) {
                continue;
            }
            self.send_to(target, msg);
        }
    }

    /// Lifecycle of one accepted socket.
    async fn handle_socket(self: Arc<Self>, socket: WebSocket, addr: SocketAddr) {
        let peer_id = new_peer_id();
        info!(%peer_id, %addr, "signaling connection open");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        self.connections.insert(
            peer_id.clone(),
            ConnectionHandle {
                tx: tx.clone(),
                alive: Arc::clone(&alive),
            },
        );
        self.registry.ensure_peer(&peer_id);

        let (mut sink, mut stream) = socket.split();
        let writer = tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                let result = match out {
                    Outbound::Message(msg) => {
                        sink.send(Message::Text(msg.to_json().into())).await
                    }
                    Outbound::Ping => sink.send(Message::Ping(Vec::new().into())).await,
                    Outbound::Close { code, reason } => {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                };
                if result.is_err() {
                    break;
                }
            }
        });

        let _ = tx.send(Outbound::Message(ServerMessage::Welcome {
            peer_id: peer_id.clone(),
            timestamp: now_millis(),
        }));

        let mut message_count: u64 = 0;
        while let Some(Ok(frame)) = stream.next().await {
            match frame {
                Message::Text(text) => {
                    message_count += 1;
                    if let Some((code, reason)) = self.frame_violation(text.len(), message_count) {
                        let _ = tx.send(Outbound::Close { code, reason });
                        break;
                    }
                    if !self.handle_frame(&peer_id, text.as_str(), &tx) {
                        break;
                    }
                }
                Message::Binary(_) => {
                    let _ = tx.send(Outbound::Close {
                        code: CLOSE_MALFORMED,
                        reason: "binary frames not accepted",
                    });
                    break;
                }
                Message::Pong(_) => alive.store(true, Ordering::Release),
                Message::Close(_) => break,
                // Client pings are answered by the protocol layer.
                Message::Ping(_) => {}
            }
        }

        self.connections.remove(&peer_id);
        self.drop_peer(&peer_id);
        drop(tx);
        let _ = writer.await;
        info!(%peer_id, "signaling connection closed");
    }

    /// Check a text frame against the connection limits before it is
    /// parsed. `message_count` includes the frame under test. Returns the
    /// close code and reason when a limit is exceeded.
    fn frame_violation(
        &self,
        frame_len: usize,
        message_count: u64,
    ) -> Option<(u16, &'static str)> {
        if frame_len > self.config.max_frame_bytes {
            return Some((CLOSE_OVERSIZED, "frame too large"));
        }
        if message_count > self.config.max_messages_per_connection {
            return Some((CLOSE_TOO_MANY_MESSAGES, "message budget exceeded"));
        }
        None
    }

    /// Handle one text frame. Returns `false` when the connection must
    /// close (unparseable frame); schema violations only earn an error
    /// reply.
    fn handle_frame(
        &self,
        peer_id: &str,
        text: &str,
        tx: &mpsc::UnboundedSender<Outbound>,
    ) -> bool {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                debug!(peer_id, %err, "unparseable frame, closing");
                let _ = tx.send(Outbound::Close {
                    code: CLOSE_MALFORMED,
                    reason: "malformed frame",
                });
                return false;
            }
        };

        let msg: ClientMessage = match serde_json::from_value(value) {
            Ok(msg) => msg,
            Err(err) => {
                let reply = ServerMessage::error("invalid-message", err.to_string());
                let _ = tx.send(Outbound::Message(reply));
                return true;
            }
        };

        self.dispatch(peer_id, msg, tx);
        true
    }

    fn dispatch(&self, peer_id: &str, msg: ClientMessage, tx: &mpsc::UnboundedSender<Outbound>) {
        let reply_error = |err: &SwarmError| {
            let _ = tx.send(Outbound::Message(ServerMessage::error(
                error_code(err),
                err.to_string(),
            )));
        };

        match msg {
            ClientMessage::JoinRoom { room } => match self.registry.join(&room, peer_id) {
                Ok(snapshot) => {
                    let state = ServerMessage::RoomState {
                        room: room.clone(),
                        peers: snapshot
                            .members
                            .iter()
                            .filter(|m| m.as_str() != peer_id)
                            .cloned()
                            .collect(),
                        files: snapshot.files,
                        timestamp: now_millis(),
                    };
                    let _ = tx.send(Outbound::Message(state));

                    let joined = ServerMessage::PeerJoined {
                        room,
                        peer: peer_id.to_string(),
                        timestamp: now_millis(),
                    };
                    self.broadcast(&snapshot.members, Some(peer_id), &joined);
                }
                Err(err) => reply_error(&err),
            },

            ClientMessage::LeaveRoom { room } => match self.registry.leave(&room, peer_id) {
                Ok(departure) => {
                    let left = ServerMessage::PeerLeft {
                        room,
                        peer: peer_id.to_string(),
                        timestamp: now_millis(),
                    };
                    self.broadcast(&departure.remaining, None, &left);
                }
                Err(err) => reply_error(&err),
            },

            ClientMessage::Offer { target, sdp } => {
                self.relay(peer_id, &target, tx, ServerMessage::Offer {
                    from: peer_id.to_string(),
                    sdp,
                    timestamp: now_millis(),
                });
            }
            ClientMessage::Answer { target, sdp } => {
                self.relay(peer_id, &target, tx, ServerMessage::Answer {
                    from: peer_id.to_string(),
                    sdp,
                    timestamp: now_millis(),
                });
            }
            ClientMessage::IceCandidate { target, candidate } => {
                self.relay(peer_id, &target, tx, ServerMessage::IceCandidate {
                    from: peer_id.to_string(),
                    candidate,
                    timestamp: now_millis(),
                });
            }

            ClientMessage::AnnounceFile { room, file } => {
                match self.registry.announce_file(&room, peer_id, &file) {
                    Ok(summary) => {
                        let members = self.registry.members(&room).unwrap_or_default();
                        let notice = ServerMessage::FileAnnounced {
                            room,
                            file: summary,
                            from: peer_id.to_string(),
                            timestamp: now_millis(),
                        };
                        self.broadcast(&members, Some(peer_id), &notice);
                    }
                    Err(err) => reply_error(&err),
                }
            }

            ClientMessage::RequestFile { room, hash } => {
                match self.registry.request_file(&room, peer_id, &hash) {
                    Ok(seeders) => {
                        let notice = ServerMessage::FileRequested {
                            room,
                            hash,
                            from: peer_id.to_string(),
                            timestamp: now_millis(),
                        };
                        self.broadcast(&seeders, Some(peer_id), &notice);
                    }
                    Err(err) => reply_error(&err),
                }
            }

            ClientMessage::PeerMetadata { metadata } => {
                if let Err(err) = self.registry.update_metadata(peer_id, &metadata) {
                    reply_error(&err);
                }
            }
        }
    }

    /// Relay an offer/answer/candidate to `target`, or reply with a
    /// structured error naming the missing peer.
    fn relay(
        &self,
        from: &str,
        target: &str,
        tx: &mpsc::UnboundedSender<Outbound>,
        msg: ServerMessage,
    ) {
        if self.connections.contains_key(target) {
            debug!(from, target, "relaying negotiation message");
            self.send_to(target, &msg);
        } else {
            let _ = tx.send(Outbound::Message(ServerMessage::error(
                "unknown-peer",
                format!("no such peer: {target}"),
            )));
        }
    }

    #[cfg(test)]
    fn register_test_peer(&self, peer_id: &str) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            peer_id.to_string(),
            ConnectionHandle {
                tx,
                alive: Arc::new(AtomicBool::new(true)),
            },
        );
        self.registry.ensure_peer(peer_id);
        rx
    }
}

async fn ws_upgrade(
    State(gateway): State<Arc<SignalingGateway>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if !gateway.limiter.allow(addr.ip()) {
        warn!(%addr, "connection rejected: rate limit");
        return (StatusCode::TOO_MANY_REQUESTS, "connection rate exceeded").into_response();
    }
    if gateway.connections.len() >= gateway.config.max_connections {
        warn!(%addr, "connection rejected: server full");
        return (StatusCode::SERVICE_UNAVAILABLE, "server at capacity").into_response();
    }

    ws.on_upgrade(move |socket| gateway.handle_socket(socket, addr))
}

fn new_peer_id() -> PeerId {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("peer-{suffix}")
}

fn error_code(err: &SwarmError) -> &'static str {
    match err {
        SwarmError::GroupFull { .. } => "room-full",
        SwarmError::UnknownGroup(_) => "unknown-room",
        SwarmError::UnknownPeer(_) => "unknown-peer",
        SwarmError::UnknownFile(_) => "unknown-file",
        SwarmError::InvalidFileHash(_) => "invalid-hash",
        SwarmError::NotAMember { .. } => "not-a-member",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;

    fn gateway() -> Arc<SignalingGateway> {
        let registry = Arc::new(SwarmRegistry::new(RegistryConfig::default()));
        Arc::new(SignalingGateway::new(registry, SignalingConfig::default()))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Outbound::Message(msg) = msg {
                out.push(msg);
            }
        }
        out
    }

    fn join(gw: &SignalingGateway, peer: &str, room: &str) {
        let frame = format!(r#"{{"type":"join-room","room":"{room}"}}"#);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(gw.handle_frame(peer, &frame, &tx));
    }

    #[tokio::test]
    async fn test_new_peer_id_shape() {
        let id = new_peer_id();
        assert!(id.starts_with("peer-"));
        assert_eq!(id.len(), 17);
    }

    #[tokio::test]
    async fn test_join_sends_room_state_and_notifies_members() {
        let gw = gateway();
        let mut rx_a = gw.register_test_peer("a");
        let mut rx_b = gw.register_test_peer("b");

        join(&gw, "a", "demo");
        drain(&mut rx_a);

        // b joins; a must hear peer-joined, b must not
        let (tx_b, mut reply_b) = mpsc::unbounded_channel();
        assert!(gw.handle_frame("b", r#"{"type":"join-room","room":"demo"}"#, &tx_b));

        let replies = drain(&mut reply_b);
        assert!(matches!(
            &replies[0],
            ServerMessage::RoomState { peers, .. } if peers == &vec!["a".to_string()]
        ));

        let to_a = drain(&mut rx_a);
        assert!(to_a
            .iter()
            .any(|m| matches!(m, ServerMessage::PeerJoined { peer, .. } if peer == "b")));
        assert!(drain(&mut rx_b).is_empty(), "joiner gets no self-broadcast");
    }

    #[tokio::test]
    async fn test_oversized_frame_earns_close_4009() {
        let registry = Arc::new(SwarmRegistry::new(RegistryConfig::default()));
        let config = SignalingConfig {
            max_frame_bytes: 32,
            ..SignalingConfig::default()
        };
        let gw = SignalingGateway::new(registry, config);

        assert_eq!(gw.frame_violation(32, 1), None);
        assert_eq!(
            gw.frame_violation(33, 1),
            Some((CLOSE_OVERSIZED, "frame too large"))
        );
    }

    #[tokio::test]
    async fn test_message_budget_earns_close_4008() {
        let registry = Arc::new(SwarmRegistry::new(RegistryConfig::default()));
        let config = SignalingConfig {
            max_messages_per_connection: 3,
            ..SignalingConfig::default()
        };
        let gw = SignalingGateway::new(registry, config);

        assert_eq!(gw.frame_violation(5, 3), None);
        assert_eq!(
            gw.frame_violation(5, 4),
            Some((CLOSE_TOO_MANY_MESSAGES, "message budget exceeded"))
        );
    }

    #[tokio::test]
    async fn test_unparseable_frame_closes() {
        let gw = gateway();
        gw.register_test_peer("a");
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!gw.handle_frame("a", "{not json", &tx));
        match rx.try_recv().unwrap() {
            Outbound::Close { code, .. } => assert_eq!(code, CLOSE_MALFORMED),
            _ => panic!("expected close"),
        }
    }

    #[tokio::test]
    async fn test_schema_violation_replies_error_keeps_connection() {
        let gw = gateway();
        gw.register_test_peer("a");
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(gw.handle_frame("a", r#"{"type":"warp-core-breach"}"#, &tx));
        match rx.try_recv().unwrap() {
            Outbound::Message(ServerMessage::Error { code, .. }) => {
                assert_eq!(code, "invalid-message");
            }
            _ => panic!("expected error reply"),
        }
    }

    #[tokio::test]
    async fn test_relay_to_unknown_target_is_error() {
        let gw = gateway();
        gw.register_test_peer("a");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let frame = r#"{"type":"offer","target":"ghost","sdp":{}}"#;
        assert!(gw.handle_frame("a", frame, &tx));
        match rx.try_recv().unwrap() {
            Outbound::Message(ServerMessage::Error { code, .. }) => {
                assert_eq!(code, "unknown-peer");
            }
            _ => panic!("expected error reply"),
        }
    }

    #[tokio::test]
    async fn test_offer_relayed_with_sender() {
        let gw = gateway();
        gw.register_test_peer("a");
        let mut rx_b = gw.register_test_peer("b");
        let (tx, _rx) = mpsc::unbounded_channel();

        let frame = r#"{"type":"offer","target":"b","sdp":{"kind":"offer"}}"#;
        assert!(gw.handle_frame("a", frame, &tx));

        let to_b = drain(&mut rx_b);
        assert!(matches!(
            &to_b[0],
            ServerMessage::Offer { from, .. } if from == "a"
        ));
    }

    #[tokio::test]
    async fn test_file_announce_and_request_scenario() {
        // Spec scenario: A and B join "demo", A announces, B requests.
        // A alone hears file-requested naming B; B hears nothing back;
        // A is not notified of its own announcement.
        let gw = gateway();
        let mut rx_a = gw.register_test_peer("a");
        let mut rx_b = gw.register_test_peer("b");

        join(&gw, "a", "demo");
        join(&gw, "b", "demo");
        drain(&mut rx_a);
        drain(&mut rx_b);

        let hash = "a".repeat(64);
        let announce = format!(
            r#"{{"type":"announce-file","room":"demo","file":{{"hash":"{hash}","name":"x.iso","size":1048576}}}}"#
        );
        let (tx_a, mut reply_a) = mpsc::unbounded_channel();
        assert!(gw.handle_frame("a", &announce, &tx_a));

        assert!(
            drain(&mut rx_a).is_empty() && drain(&mut reply_a).is_empty(),
            "announcer must not hear its own announcement"
        );
        let to_b = drain(&mut rx_b);
        assert!(matches!(
            &to_b[0],
            ServerMessage::FileAnnounced { from, .. } if from == "a"
        ));

        let request = format!(r#"{{"type":"request-file","room":"demo","hash":"{hash}"}}"#);
        let (tx_b, mut reply_b) = mpsc::unbounded_channel();
        assert!(gw.handle_frame("b", &request, &tx_b));

        let to_a = drain(&mut rx_a);
        assert!(matches!(
            &to_a[0],
            ServerMessage::FileRequested { from, hash: h, .. } if from == "b" && *h == hash
        ));
        assert!(
            drain(&mut rx_b).is_empty() && drain(&mut reply_b).is_empty(),
            "requester must not be notified"
        );
    }

    #[tokio::test]
    async fn test_heartbeat_drops_silent_connection() {
        let gw = gateway();
        let _rx = gw.register_test_peer("a");
        gw.registry.join("demo", "a").unwrap();

        // First round: marks the connection awaiting a pong
        gw.heartbeat();
        assert_eq!(gw.connection_count(), 1);

        // No pong arrives; second round drops it and cleans the registry
        gw.heartbeat();
        assert_eq!(gw.connection_count(), 0);
        assert!(gw.registry.members("demo").is_none());
    }

    #[tokio::test]
    async fn test_metadata_message() {
        let gw = gateway();
        gw.register_test_peer("a");
        let (tx, _rx) = mpsc::unbounded_channel();

        let frame = r#"{"type":"peer-metadata","metadata":{"agent":"firefox","bw":"100mbit"}}"#;
        assert!(gw.handle_frame("a", frame, &tx));
        let stored = gw.registry.metadata("a").unwrap();
        assert_eq!(stored.get("agent").unwrap(), "firefox");
    }

    #[tokio::test]
    async fn test_leave_room_notifies_remaining() {
        let gw = gateway();
        let mut rx_a = gw.register_test_peer("a");
        gw.register_test_peer("b");

        join(&gw, "a", "demo");
        join(&gw, "b", "demo");
        drain(&mut rx_a);

        let (tx_b, _rx) = mpsc::unbounded_channel();
        assert!(gw.handle_frame("b", r#"{"type":"leave-room","room":"demo"}"#, &tx_b));

        let to_a = drain(&mut rx_a);
        assert!(to_a
            .iter()
            .any(|m| matches!(m, ServerMessage::PeerLeft { peer, .. } if peer == "b")));
    }
}
