//! STUN binding responder (RFC 5389, server side).
//!
//! Answers binding requests with the sender's observed address as an
//! XOR-MAPPED-ADDRESS attribute. Keeps no state between datagrams: the
//! response is a pure function of the datagram and the observed endpoint.

use crate::error::NatError;
use pylon_proto::{Attribute, Message, MessageClass, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// SOFTWARE attribute value stamped on every response.
const SOFTWARE: &str = concat!("pylon/", env!("CARGO_PKG_VERSION"));

/// Answer one datagram observed from `from`.
///
/// Returns `None` for anything that is not a well-formed binding request;
/// nothing is mutated either way. The response echoes the request's
/// transaction id so the client can XOR-decode the mapped address.
pub fn respond(datagram: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
    let request = match Message::decode(datagram) {
        Ok(msg) => msg,
        Err(err) => {
            debug!(%from, %err, "dropping malformed STUN datagram");
            return None;
        }
    };

    if request.method != Method::Binding || request.class != MessageClass::Request {
        debug!(%from, method = ?request.method, class = ?request.class, "ignoring non-binding message");
        return None;
    }

    let response = Message::success_response(Method::Binding, request.transaction_id)
        .with_attribute(Attribute::XorMappedAddress(from))
        .with_attribute(Attribute::Software(SOFTWARE.to_string()));

    debug!(%from, "answered binding request");
    Some(response.encode())
}

/// UDP server loop wrapping [`respond`].
pub struct StunServer {
    socket: Arc<UdpSocket>,
}

impl StunServer {
    /// Bind to `addr` (default deployment: 0.0.0.0:3478).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self, NatError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Local socket address (useful when bound to port 0 in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be determined.
    pub fn local_addr(&self) -> Result<SocketAddr, NatError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve binding requests until the task is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only on unrecoverable socket failure; per-datagram
    /// problems are logged and skipped.
    pub async fn run(&self) -> Result<(), NatError> {
        info!(addr = %self.socket.local_addr()?, "STUN responder listening");

        let mut buf = vec![0u8; 1500];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if let Some(reply) = respond(&buf[..len], from) {
                // Best effort: a failed send to one client must not stop the loop.
                let _ = self.socket.send_to(&reply, from).await;
            }
        }
    }
}
