//! HTTP announce tracker.
//!
//! Stateless bootstrap companion to the signaling gateway: native peers
//! announce `(info_hash, peer_id, port, left)` over plain GET and get a
//! JSON peer list back. Swarm membership lives in a [`SwarmRegistry`]
//! with the tracker profile (large groups, empty swarms kept for the
//! sweep); transfer counters live in a side table keyed by swarm and
//! peer. Stale peers are reaped inline before every response, so the
//! tracker needs no background task of its own.

use crate::registry::{RegistryConfig, SwarmRegistry};
use crate::types::{PeerId, valid_file_hash};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Announce cadence and reaping thresholds.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Re-announce interval handed to clients, seconds
    pub announce_interval: u64,
    /// Floor clients must respect between announces, seconds
    pub min_interval: u64,
    /// A peer silent this long is reaped
    pub peer_timeout: Duration,
    /// Peers returned when the client names no `numwant`
    pub default_numwant: usize,
    /// Hard cap on `numwant`
    pub max_numwant: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            announce_interval: 120,
            min_interval: 60,
            peer_timeout: Duration::from_secs(1800),
            default_numwant: 50,
            max_numwant: 100,
        }
    }
}

/// Query parameters of `GET /announce`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnounceRequest {
    /// Content fingerprint naming the swarm
    pub info_hash: Option<String>,
    /// Announcing peer's self-chosen id
    pub peer_id: Option<String>,
    /// Port the peer listens on
    pub port: Option<u16>,
    /// Bytes uploaded so far
    #[serde(default)]
    pub uploaded: u64,
    /// Bytes downloaded so far
    #[serde(default)]
    pub downloaded: u64,
    /// Bytes still missing; zero marks a seeder
    #[serde(default)]
    pub left: u64,
    /// `started`, `stopped` or `completed`
    pub event: Option<String>,
    /// How many peers the client wants back
    pub numwant: Option<usize>,
    /// Claimed address, overrides the observed one
    pub ip: Option<IpAddr>,
}

/// One entry of the returned peer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncedPeer {
    /// Self-chosen peer id
    #[serde(rename = "peer id")]
    pub peer_id: PeerId,
    /// Claimed or observed address
    pub ip: IpAddr,
    /// Listening port
    pub port: u16,
}

/// Body of a successful announce. Key spelling follows the classic
/// tracker dictionary, spaces included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceResponse {
    /// Seconds until the client should announce again
    pub interval: u64,
    /// Floor the client must respect between announces
    #[serde(rename = "min interval")]
    pub min_interval: u64,
    /// Seeder count for the swarm
    pub complete: usize,
    /// Leecher count for the swarm
    pub incomplete: usize,
    /// Random peer sample, the requester excluded
    pub peers: Vec<AnnouncedPeer>,
}

#[derive(Debug, Clone)]
struct PeerStats {
    ip: IpAddr,
    port: u16,
    uploaded: u64,
    downloaded: u64,
    left: u64,
    last_announce: Instant,
}

impl PeerStats {
    fn is_seeder(&self) -> bool {
        self.left == 0
    }
}

/// The announce tracker.
pub struct TrackerGateway {
    config: TrackerConfig,
    registry: Arc<SwarmRegistry>,
    /// Transfer counters per swarm, keyed by peer id.
    stats: Mutex<HashMap<String, HashMap<PeerId, PeerStats>>>,
}

impl TrackerGateway {
    /// New tracker with its own swarm registry.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SwarmRegistry::new(RegistryConfig::tracker())),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Router exposing `GET /announce`. Serve with
    /// `into_make_service_with_connect_info::<SocketAddr>()`.
    pub fn router(tracker: Arc<Self>) -> Router {
        Router::new()
            .route("/announce", get(announce))
            .with_state(tracker)
    }

    /// Number of tracked swarms.
    #[must_use]
    pub fn swarm_count(&self) -> usize {
        self.registry.group_count()
    }

    /// Process one announce. `observed_ip` is the socket's remote
    /// address, used when the client claims nothing else.
    ///
    /// # Errors
    ///
    /// Returns the failure reason for missing or malformed parameters.
    pub fn handle_announce(
        &self,
        req: &AnnounceRequest,
        observed_ip: IpAddr,
    ) -> Result<AnnounceResponse, String> {
        let info_hash = req
            .info_hash
            .as_deref()
            .ok_or_else(|| "missing info_hash".to_string())?;
        if !valid_file_hash(info_hash) {
            return Err("invalid info_hash".to_string());
        }
        let peer_id = req
            .peer_id
            .as_deref()
            .filter(|id| !id.is_empty() && id.len() <= 64)
            .ok_or_else(|| "missing or invalid peer_id".to_string())?;
        let port = match req.port {
            Some(port) if port != 0 => port,
            _ => return Err("missing or invalid port".to_string()),
        };

        self.reap_stale();

        let event = req.event.as_deref().unwrap_or("");
        if event == "stopped" {
            self.forget(info_hash, peer_id);
            return Ok(self.response_for(info_hash, peer_id, 0));
        }

        let left = if event == "completed" { 0 } else { req.left };
        let ip = req.ip.unwrap_or(observed_ip);

        self.registry.ensure_peer(peer_id);
        self.registry
            .join(info_hash, peer_id)
            .map_err(|err| err.to_string())?;

        {
            let mut stats = self.stats.lock().unwrap();
            stats.entry(info_hash.to_string()).or_default().insert(
                peer_id.to_string(),
                PeerStats {
                    ip,
                    port,
                    uploaded: req.uploaded,
                    downloaded: req.downloaded,
                    left,
                    last_announce: Instant::now(),
                },
            );
        }

        if event == "completed" {
            info!(info_hash, peer_id, "download completed");
        } else {
            debug!(info_hash, peer_id, left, "announce");
        }

        let numwant = req
            .numwant
            .unwrap_or(self.config.default_numwant)
            .min(self.config.max_numwant);
        Ok(self.response_for(info_hash, peer_id, numwant))
    }

    /// Build the response: swarm counts plus up to `numwant` random
    /// peers, the requester excluded.
    fn response_for(&self, info_hash: &str, requester: &str, numwant: usize) -> AnnounceResponse {
        let stats = self.stats.lock().unwrap();
        let swarm = stats.get(info_hash);

        let complete = swarm
            .map(|s| s.values().filter(|p| p.is_seeder()).count())
            .unwrap_or(0);
        let incomplete = swarm
            .map(|s| s.values().filter(|p| !p.is_seeder()).count())
            .unwrap_or(0);

        let mut candidates: Vec<AnnouncedPeer> = swarm
            .map(|s| {
                s.iter()
                    .filter(|(id, _)| id.as_str() != requester)
                    .map(|(id, p)| AnnouncedPeer {
                        peer_id: id.clone(),
                        ip: p.ip,
                        port: p.port,
                    })
                    .collect()
            })
            .unwrap_or_default();

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(numwant);

        AnnounceResponse {
            interval: self.config.announce_interval,
            min_interval: self.config.min_interval,
            complete,
            incomplete,
            peers: candidates,
        }
    }

    /// Drop one peer from one swarm.
    fn forget(&self, info_hash: &str, peer_id: &str) {
        let mut stats = self.stats.lock().unwrap();
        if let Some(swarm) = stats.get_mut(info_hash) {
            swarm.remove(peer_id);
            if swarm.is_empty() {
                stats.remove(info_hash);
            }
        }
        drop(stats);

        if self.registry.leave(info_hash, peer_id).is_ok() {
            debug!(info_hash, peer_id, "peer stopped");
        }
    }

    /// Reap peers whose last announce is older than the timeout. Runs
    /// inline on every announce instead of on a timer.
    fn reap_stale(&self) {
        let timeout = self.config.peer_timeout;
        let mut reaped: Vec<(String, PeerId)> = Vec::new();

        {
            let mut stats = self.stats.lock().unwrap();
            for (hash, swarm) in stats.iter_mut() {
                swarm.retain(|id, peer| {
                    if peer.last_announce.elapsed() > timeout {
                        reaped.push((hash.clone(), id.clone()));
                        false
                    } else {
                        true
                    }
                });
            }
            stats.retain(|_, swarm| !swarm.is_empty());
        }

        for (hash, id) in &reaped {
            let _ = self.registry.leave(hash, id);
        }
        if !reaped.is_empty() {
            warn!(count = reaped.len(), "reaped silent peers");
        }

        // Swarms emptied by reaping age out on the same clock.
        self.registry.sweep_stale(timeout);
    }
}

async fn announce(
    State(tracker): State<Arc<TrackerGateway>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(req): Query<AnnounceRequest>,
) -> Response {
    match tracker.handle_announce(&req, addr.ip()) {
        Ok(body) => Json(body).into_response(),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "failure reason": reason })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(hash: &str, peer: &str, port: u16, left: u64) -> AnnounceRequest {
        AnnounceRequest {
            info_hash: Some(hash.to_string()),
            peer_id: Some(peer.to_string()),
            port: Some(port),
            uploaded: 0,
            downloaded: 0,
            left,
            event: None,
            numwant: None,
            ip: None,
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_announce_registers_and_returns_counts() {
        let tracker = TrackerGateway::new(TrackerConfig::default());

        let resp = tracker
            .handle_announce(&request(HASH, "seeder-1", 6881, 0), ip(1))
            .unwrap();
        assert_eq!(resp.complete, 1);
        assert_eq!(resp.incomplete, 0);
        assert!(resp.peers.is_empty(), "requester is never in its own list");
        assert_eq!(resp.interval, 120);
        assert_eq!(resp.min_interval, 60);
    }

    #[test]
    fn test_seeder_leecher_accounting() {
        let tracker = TrackerGateway::new(TrackerConfig::default());
        tracker
            .handle_announce(&request(HASH, "seeder-1", 6881, 0), ip(1))
            .unwrap();

        let resp = tracker
            .handle_announce(&request(HASH, "leecher-1", 6882, 4096), ip(2))
            .unwrap();
        assert_eq!(resp.complete, 1);
        assert_eq!(resp.incomplete, 1);
        assert_eq!(resp.peers.len(), 1);
        assert_eq!(resp.peers[0].peer_id, "seeder-1");
        assert_eq!(resp.peers[0].port, 6881);
    }

    #[test]
    fn test_completed_event_promotes_to_seeder() {
        let tracker = TrackerGateway::new(TrackerConfig::default());
        tracker
            .handle_announce(&request(HASH, "p1", 6881, 4096), ip(1))
            .unwrap();

        let mut done = request(HASH, "p1", 6881, 4096);
        done.event = Some("completed".to_string());
        let resp = tracker.handle_announce(&done, ip(1)).unwrap();
        assert_eq!(resp.complete, 1);
        assert_eq!(resp.incomplete, 0);
    }

    #[test]
    fn test_stopped_event_removes_peer() {
        let tracker = TrackerGateway::new(TrackerConfig::default());
        tracker
            .handle_announce(&request(HASH, "p1", 6881, 0), ip(1))
            .unwrap();
        tracker
            .handle_announce(&request(HASH, "p2", 6882, 100), ip(2))
            .unwrap();

        let mut stop = request(HASH, "p1", 6881, 0);
        stop.event = Some("stopped".to_string());
        let resp = tracker.handle_announce(&stop, ip(1)).unwrap();
        assert_eq!(resp.complete, 0);
        assert_eq!(resp.incomplete, 1);
    }

    #[test]
    fn test_invalid_info_hash_rejected() {
        let tracker = TrackerGateway::new(TrackerConfig::default());
        let err = tracker
            .handle_announce(&request("not-a-hash", "p1", 6881, 0), ip(1))
            .unwrap_err();
        assert!(err.contains("info_hash"));
    }

    #[test]
    fn test_port_zero_rejected() {
        let tracker = TrackerGateway::new(TrackerConfig::default());
        let err = tracker
            .handle_announce(&request(HASH, "p1", 0, 0), ip(1))
            .unwrap_err();
        assert!(err.contains("port"));
    }

    #[test]
    fn test_numwant_capped() {
        let config = TrackerConfig {
            max_numwant: 3,
            ..TrackerConfig::default()
        };
        let tracker = TrackerGateway::new(config);
        for i in 0..10u8 {
            tracker
                .handle_announce(&request(HASH, &format!("p{i}"), 6880 + u16::from(i), 0), ip(i))
                .unwrap();
        }

        let mut greedy = request(HASH, "asker", 7000, 100);
        greedy.numwant = Some(50);
        let resp = tracker.handle_announce(&greedy, ip(99)).unwrap();
        assert_eq!(resp.peers.len(), 3);
    }

    #[test]
    fn test_claimed_ip_overrides_observed() {
        let tracker = TrackerGateway::new(TrackerConfig::default());
        let mut req = request(HASH, "p1", 6881, 0);
        req.ip = Some(ip(42));
        tracker.handle_announce(&req, ip(1)).unwrap();

        let resp = tracker
            .handle_announce(&request(HASH, "p2", 6882, 100), ip(2))
            .unwrap();
        assert_eq!(resp.peers[0].ip, ip(42));
    }

    #[test]
    fn test_silent_peer_reaped() {
        let config = TrackerConfig {
            peer_timeout: Duration::from_millis(10),
            ..TrackerConfig::default()
        };
        let tracker = TrackerGateway::new(config);
        tracker
            .handle_announce(&request(HASH, "sleepy", 6881, 0), ip(1))
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let resp = tracker
            .handle_announce(&request(HASH, "awake", 6882, 100), ip(2))
            .unwrap();
        assert_eq!(resp.complete, 0, "stale seeder must be gone");
        assert!(resp.peers.is_empty());
    }

    #[test]
    fn test_swarms_are_isolated() {
        let other = "f".repeat(64);
        let tracker = TrackerGateway::new(TrackerConfig::default());
        tracker
            .handle_announce(&request(HASH, "p1", 6881, 0), ip(1))
            .unwrap();
        tracker
            .handle_announce(&request(&other, "p2", 6882, 0), ip(2))
            .unwrap();

        let resp = tracker
            .handle_announce(&request(HASH, "p3", 6883, 100), ip(3))
            .unwrap();
        assert_eq!(resp.peers.len(), 1);
        assert_eq!(resp.peers[0].peer_id, "p1");
        assert_eq!(tracker.swarm_count(), 2);
    }

    #[test]
    fn test_announce_response_wire_shape() {
        let resp = AnnounceResponse {
            interval: 120,
            min_interval: 60,
            complete: 1,
            incomplete: 2,
            peers: vec![AnnouncedPeer {
                peer_id: "p1".to_string(),
                ip: ip(1),
                port: 6881,
            }],
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["min interval"], 60);
        assert_eq!(json["peers"][0]["peer id"], "p1");
        assert_eq!(json["peers"][0]["ip"], "10.0.0.1");
    }
}
