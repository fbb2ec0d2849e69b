//! Shared helpers for Pylon integration tests.

use pylon_proto::{Attribute, Message, Method};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// One request/response exchange over a fresh UDP socket.
///
/// # Panics
///
/// Panics if the exchange fails or times out; tests want the failure loud.
pub async fn udp_exchange(server: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
    socket.send_to(payload, server).await.expect("send");

    let mut buf = vec![0u8; 1500];
    let recv = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf));
    let (len, _) = recv.await.expect("response timeout").expect("recv");
    buf.truncate(len);
    buf
}

/// Send a datagram and assert the server stays silent.
///
/// # Panics
///
/// Panics if any reply arrives within the quiet window.
pub async fn udp_expect_silence(server: SocketAddr, payload: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
    socket.send_to(payload, server).await.expect("send");

    let mut buf = vec![0u8; 1500];
    let recv = tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut buf));
    assert!(recv.await.is_err(), "server replied to a silent-drop input");
}

/// An Allocate request with the UDP transport attribute, optionally
/// carrying static credentials.
#[must_use]
pub fn allocate_request(credentials: Option<(&str, &str)>) -> Message {
    let msg = Message::request(Method::Allocate).with_attribute(Attribute::RequestedTransport(17));
    match credentials {
        Some((user, pass)) => msg
            .with_attribute(Attribute::Username(user.to_string()))
            .with_attribute(Attribute::Password(pass.to_string())),
        None => msg,
    }
}

/// A 64-hex content fingerprint filled with one repeated byte.
#[must_use]
pub fn test_hash(fill: char) -> String {
    std::iter::repeat_n(fill, 64).collect()
}
