//! TURN relay allocation manager (RFC 5766 subset).
//!
//! Tracks one allocation per client address through the states
//! unallocated -> allocated -> expired. Relay ports come from a configured
//! ephemeral pool and are returned to it when an allocation dies, so a live
//! port is never handed out twice. Authentication is a static
//! username/password table; there is no message-integrity HMAC.
//!
//! The allocator never moves payload bytes itself: a permitted Send
//! indication is validated and handed to the transport collaborator (here,
//! logged), everything else about relaying stays outside this crate.

use crate::error::NatError;
use pylon_proto::{Attribute, Message, MessageClass, Method};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// TURN server configuration
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Address advertised in XOR-RELAYED-ADDRESS replies
    pub relay_ip: IpAddr,
    /// Ephemeral range relay ports are drawn from
    pub port_range: RangeInclusive<u16>,
    /// Lifetime granted by Allocate and restored by Refresh
    pub default_lifetime: Duration,
    /// How often the background sweep reclaims expired allocations
    pub sweep_interval: Duration,
    /// Static credential table; an empty table disables authentication
    pub credentials: HashMap<String, String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            relay_ip: IpAddr::from([127, 0, 0, 1]),
            port_range: 49152..=49407,
            default_lifetime: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            credentials: HashMap::new(),
        }
    }
}

/// One client's relay allocation
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Client transport address the allocation is keyed by
    pub client: SocketAddr,
    /// Relay port reserved for this client
    pub relay_port: u16,
    /// Peer addresses permitted to exchange relayed data
    permissions: HashSet<IpAddr>,
    /// Seconds of life granted at the last allocate/refresh
    lifetime: Duration,
    /// Last allocate/refresh instant
    refreshed_at: Instant,
}

impl Allocation {
    fn new(client: SocketAddr, relay_port: u16, lifetime: Duration) -> Self {
        Self {
            client,
            relay_port,
            permissions: HashSet::new(),
            lifetime,
            refreshed_at: Instant::now(),
        }
    }

    fn refresh(&mut self, lifetime: Duration) {
        self.lifetime = lifetime;
        self.refreshed_at = Instant::now();
    }

    fn is_expired(&self) -> bool {
        self.refreshed_at.elapsed() >= self.lifetime
    }

    /// Whether `peer` may exchange relayed data with this client.
    pub fn permits(&self, peer: IpAddr) -> bool {
        self.permissions.contains(&peer)
    }
}

/// Allocation table plus the free relay-port pool, guarded as one unit so
/// operations on the same allocation (Refresh racing CreatePermission)
/// serialize.
struct AllocTable {
    allocations: HashMap<SocketAddr, Allocation>,
    free_ports: Vec<u16>,
}

impl AllocTable {
    /// Drop `client`'s allocation if its lifetime elapsed, freeing the port.
    fn expire_if_stale(&mut self, client: SocketAddr) {
        let expired = self
            .allocations
            .get(&client)
            .is_some_and(Allocation::is_expired);
        if expired {
            if let Some(alloc) = self.allocations.remove(&client) {
                self.free_ports.push(alloc.relay_port);
                debug!(%client, port = alloc.relay_port, "allocation expired");
            }
        }
    }
}

/// Relay allocation state machine shared by all datagrams.
pub struct TurnAllocator {
    config: TurnConfig,
    table: Mutex<AllocTable>,
}

impl TurnAllocator {
    /// Create an allocator with every port in the configured range free.
    /// The pool is shuffled so relay ports come out in no predictable
    /// order.
    #[must_use]
    pub fn new(config: TurnConfig) -> Self {
        let mut free_ports: Vec<u16> = config.port_range.clone().collect();
        free_ports.shuffle(&mut rand::thread_rng());
        Self {
            config,
            table: Mutex::new(AllocTable {
                allocations: HashMap::new(),
                free_ports,
            }),
        }
    }

    /// Handle one datagram from `from`, returning the reply bytes if the
    /// message calls for a reply. Indications and malformed input yield
    /// `None`.
    pub fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
        let msg = match Message::decode(datagram) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%from, %err, "dropping malformed TURN datagram");
                return None;
            }
        };

        match (msg.class, msg.method) {
            (MessageClass::Request, Method::Allocate) => Some(self.allocate(&msg, from)),
            (MessageClass::Request, Method::Refresh) => Some(self.refresh(&msg, from)),
            (MessageClass::Request, Method::CreatePermission) => {
                Some(self.create_permission(&msg, from))
            }
            (MessageClass::Indication, Method::Send) => {
                self.send_indication(&msg, from);
                None
            }
            (class, method) => {
                debug!(%from, ?class, ?method, "ignoring unsupported TURN message");
                None
            }
        }
        .map(|reply| reply.encode())
    }

    fn authorized(&self, msg: &Message) -> bool {
        if self.config.credentials.is_empty() {
            return true;
        }
        match (msg.username(), msg.password()) {
            (Some(user), Some(pass)) => {
                self.config.credentials.get(user).map(String::as_str) == Some(pass)
            }
            _ => false,
        }
    }

    fn allocate(&self, msg: &Message, from: SocketAddr) -> Message {
        if !self.authorized(msg) {
            warn!(%from, "allocate rejected: bad credentials");
            return Message::error_response(
                Method::Allocate,
                msg.transaction_id,
                401,
                "Unauthorized",
            );
        }

        let mut table = self.table.lock().unwrap();
        table.expire_if_stale(from);

        // Repeated Allocate from a live client refreshes the existing
        // allocation instead of minting a second one.
        if let Some(alloc) = table.allocations.get_mut(&from) {
            alloc.refresh(self.config.default_lifetime);
            let port = alloc.relay_port;
            debug!(%from, port, "allocate on live allocation treated as refresh");
            return self.allocate_success(msg, port);
        }

        let Some(port) = table.free_ports.pop() else {
            warn!(%from, "allocate rejected: relay port pool exhausted");
            return Message::error_response(
                Method::Allocate,
                msg.transaction_id,
                508,
                "Insufficient Capacity",
            );
        };

        table.allocations.insert(
            from,
            Allocation::new(from, port, self.config.default_lifetime),
        );
        info!(%from, port, "relay allocated");
        self.allocate_success(msg, port)
    }

    fn allocate_success(&self, msg: &Message, port: u16) -> Message {
        Message::success_response(Method::Allocate, msg.transaction_id)
            .with_attribute(Attribute::XorRelayedAddress(SocketAddr::new(
                self.config.relay_ip,
                port,
            )))
            .with_attribute(Attribute::Lifetime(
                self.config.default_lifetime.as_secs() as u32,
            ))
    }

    fn refresh(&self, msg: &Message, from: SocketAddr) -> Message {
        let mut table = self.table.lock().unwrap();
        table.expire_if_stale(from);

        match table.allocations.get_mut(&from) {
            Some(alloc) => {
                alloc.refresh(self.config.default_lifetime);
                debug!(%from, port = alloc.relay_port, "allocation refreshed");
                Message::success_response(Method::Refresh, msg.transaction_id).with_attribute(
                    Attribute::Lifetime(self.config.default_lifetime.as_secs() as u32),
                )
            }
            None => {
                debug!(%from, "refresh without allocation");
                Message::error_response(
                    Method::Refresh,
                    msg.transaction_id,
                    437,
                    "Allocation Mismatch",
                )
            }
        }
    }

    fn create_permission(&self, msg: &Message, from: SocketAddr) -> Message {
        let mut table = self.table.lock().unwrap();
        table.expire_if_stale(from);

        let Some(alloc) = table.allocations.get_mut(&from) else {
            return Message::error_response(
                Method::CreatePermission,
                msg.transaction_id,
                437,
                "Allocation Mismatch",
            );
        };

        let Some(peer) = msg.xor_peer_address() else {
            return Message::error_response(
                Method::CreatePermission,
                msg.transaction_id,
                400,
                "Bad Request",
            );
        };

        alloc.permissions.insert(peer.ip());
        debug!(%from, peer = %peer.ip(), "permission installed");
        Message::success_response(Method::CreatePermission, msg.transaction_id)
    }

    /// Validate a Send indication. Indications never generate replies; an
    /// unpermitted or incomplete one is dropped silently.
    fn send_indication(&self, msg: &Message, from: SocketAddr) {
        let Some(peer) = msg.xor_peer_address() else {
            debug!(%from, "send indication without peer address dropped");
            return;
        };
        let Some(len) = msg.find_attribute(|a| match a {
            Attribute::Data(d) => Some(d.len()),
            _ => None,
        }) else {
            debug!(%from, "send indication without data dropped");
            return;
        };

        let mut table = self.table.lock().unwrap();
        table.expire_if_stale(from);

        let permitted = table
            .allocations
            .get(&from)
            .is_some_and(|alloc| alloc.permits(peer.ip()));

        if permitted {
            // Relayed delivery belongs to the transport collaborator.
            debug!(%from, %peer, len, "forwarding relayed data");
        } else {
            debug!(%from, %peer, "send indication without permission dropped");
        }
    }

    /// Reclaim every allocation whose lifetime elapsed without refresh.
    /// Returns the number reclaimed.
    pub fn sweep(&self) -> usize {
        let mut table = self.table.lock().unwrap();
        let before = table.allocations.len();

        let expired: Vec<SocketAddr> = table
            .allocations
            .values()
            .filter(|a| a.is_expired())
            .map(|a| a.client)
            .collect();

        for client in expired {
            if let Some(alloc) = table.allocations.remove(&client) {
                table.free_ports.push(alloc.relay_port);
                debug!(%client, port = alloc.relay_port, "swept expired allocation");
            }
        }

        before - table.allocations.len()
    }

    /// Snapshot of a client's allocation, if live.
    pub fn allocation(&self, client: SocketAddr) -> Option<Allocation> {
        let mut table = self.table.lock().unwrap();
        table.expire_if_stale(client);
        table.allocations.get(&client).cloned()
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.table.lock().unwrap().allocations.len()
    }
}

/// UDP server loop wrapping a shared [`TurnAllocator`].
pub struct TurnServer {
    socket: Arc<UdpSocket>,
    allocator: Arc<TurnAllocator>,
    sweep_interval: Duration,
}

impl TurnServer {
    /// Bind to `addr` (default deployment: 0.0.0.0:3479).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr, config: TurnConfig) -> Result<Self, NatError> {
        let socket = UdpSocket::bind(addr).await?;
        let sweep_interval = config.sweep_interval;
        Ok(Self {
            socket: Arc::new(socket),
            allocator: Arc::new(TurnAllocator::new(config)),
            sweep_interval,
        })
    }

    /// Shared allocator handle.
    #[must_use]
    pub fn allocator(&self) -> Arc<TurnAllocator> {
        Arc::clone(&self.allocator)
    }

    /// Local socket address.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be determined.
    pub fn local_addr(&self) -> Result<SocketAddr, NatError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve allocation requests until the task is cancelled. Spawns the
    /// expiry sweep alongside the receive loop.
    ///
    /// # Errors
    ///
    /// Returns an error only on unrecoverable socket failure.
    pub async fn run(&self) -> Result<(), NatError> {
        info!(addr = %self.socket.local_addr()?, "TURN allocator listening");

        self.spawn_sweep_task();

        let mut buf = vec![0u8; 65536];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if let Some(reply) = self.allocator.handle_datagram(&buf[..len], from) {
                let _ = self.socket.send_to(&reply, from).await;
            }
        }
    }

    fn spawn_sweep_task(&self) {
        let allocator = Arc::clone(&self.allocator);
        let interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reclaimed = allocator.sweep();
                if reclaimed > 0 {
                    info!(reclaimed, "expired allocations reclaimed");
                }
            }
        });
    }
}
