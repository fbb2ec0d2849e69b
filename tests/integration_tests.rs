//! Integration tests exercising the UDP servers end to end and the
//! swarm bootstrap flow across crates.

use pylon_integration_tests::{allocate_request, test_hash, udp_exchange, udp_expect_silence};
use pylon_nat::{StunServer, TurnConfig, TurnServer};
use pylon_proto::{Attribute, Message, MessageClass, Method};
use pylon_swarm::registry::RegistryConfig;
use pylon_swarm::tracker::{AnnounceRequest, TrackerConfig, TrackerGateway};
use pylon_swarm::{FileInfo, SwarmRegistry};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

// ============================================================================
// STUN over UDP
// ============================================================================

#[tokio::test]
async fn test_stun_binding_roundtrip() {
    let server = StunServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind server");
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_addr = socket.local_addr().unwrap();

    let request = Message::request(Method::Binding);
    socket
        .send_to(&request.encode(), server_addr)
        .await
        .unwrap();

    let mut buf = vec![0u8; 1500];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("response timeout")
        .unwrap();

    let response = Message::decode(&buf[..len]).expect("decodable response");
    assert_eq!(response.class, MessageClass::SuccessResponse);
    assert_eq!(response.method, Method::Binding);
    assert_eq!(response.transaction_id, request.transaction_id);
    assert_eq!(response.xor_mapped_address(), Some(client_addr));
}

#[tokio::test]
async fn test_stun_drops_junk_silently() {
    let server = StunServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    udp_expect_silence(server_addr, b"definitely not a binding request").await;
    udp_expect_silence(server_addr, &[0u8; 19]).await;

    // Indications are valid wire format but earn no reply either
    let indication = Message::indication(Method::Binding);
    udp_expect_silence(server_addr, &indication.encode()).await;
}

// ============================================================================
// TURN over UDP
// ============================================================================

async fn spawn_turn(config: TurnConfig) -> SocketAddr {
    let server = TurnServer::bind("127.0.0.1:0".parse().unwrap(), config)
        .await
        .expect("bind server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

/// Request/response over a long-lived client socket; allocations are
/// keyed by the client's transport address.
async fn exchange(socket: &UdpSocket, server: SocketAddr, msg: &Message) -> Message {
    socket.send_to(&msg.encode(), server).await.unwrap();
    let mut buf = vec![0u8; 1500];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("response timeout")
        .unwrap();
    Message::decode(&buf[..len]).expect("decodable response")
}

#[tokio::test]
async fn test_turn_allocation_lifecycle() {
    let server_addr = spawn_turn(TurnConfig {
        relay_ip: IpAddr::from([127, 0, 0, 1]),
        ..TurnConfig::default()
    })
    .await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Allocate
    let response = exchange(&socket, server_addr, &allocate_request(None)).await;
    assert_eq!(response.class, MessageClass::SuccessResponse);
    assert_eq!(response.method, Method::Allocate);
    assert_eq!(response.lifetime(), Some(600));
    let relayed = response.xor_relayed_address().expect("relayed address");
    assert!((49152..=49407).contains(&relayed.port()));

    // Allocating again from the same address keeps the same relay port
    let repeat = exchange(&socket, server_addr, &allocate_request(None)).await;
    assert_eq!(repeat.class, MessageClass::SuccessResponse);
    assert_eq!(repeat.xor_relayed_address(), Some(relayed));

    // Refresh
    let refresh = exchange(&socket, server_addr, &Message::request(Method::Refresh)).await;
    assert_eq!(refresh.class, MessageClass::SuccessResponse);
    assert_eq!(refresh.lifetime(), Some(600));

    // Permission for a peer
    let peer: SocketAddr = "198.51.100.7:9000".parse().unwrap();
    let permission = Message::request(Method::CreatePermission)
        .with_attribute(Attribute::XorPeerAddress(peer));
    let granted = exchange(&socket, server_addr, &permission).await;
    assert_eq!(granted.class, MessageClass::SuccessResponse);

    // Send indications never earn a reply
    let send = Message::indication(Method::Send)
        .with_attribute(Attribute::XorPeerAddress(peer))
        .with_attribute(Attribute::Data(b"relayed payload".to_vec()));
    socket.send_to(&send.encode(), server_addr).await.unwrap();
    let mut buf = vec![0u8; 1500];
    let quiet = tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut buf));
    assert!(quiet.await.is_err());
}

#[tokio::test]
async fn test_turn_refresh_without_allocation_is_437() {
    let server_addr = spawn_turn(TurnConfig::default()).await;

    let raw = udp_exchange(server_addr, &Message::request(Method::Refresh).encode()).await;
    let response = Message::decode(&raw).expect("decodable response");
    assert_eq!(response.class, MessageClass::ErrorResponse);
    assert_eq!(response.error_code(), Some(437));
}

#[tokio::test]
async fn test_turn_rejects_bad_credentials() {
    let server_addr = spawn_turn(TurnConfig {
        credentials: HashMap::from([("alice".to_string(), "s3cret".to_string())]),
        ..TurnConfig::default()
    })
    .await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let denied = exchange(
        &socket,
        server_addr,
        &allocate_request(Some(("alice", "wrong"))),
    )
    .await;
    assert_eq!(denied.class, MessageClass::ErrorResponse);
    assert_eq!(denied.error_code(), Some(401));

    let granted = exchange(
        &socket,
        server_addr,
        &allocate_request(Some(("alice", "s3cret"))),
    )
    .await;
    assert_eq!(granted.class, MessageClass::SuccessResponse);
}

// ============================================================================
// Swarm bootstrap flow
// ============================================================================

#[test]
fn test_tracker_bootstrap_flow() {
    let tracker = TrackerGateway::new(TrackerConfig::default());
    let hash = test_hash('b');

    // A seeder settles in first
    let seeder = AnnounceRequest {
        info_hash: Some(hash.clone()),
        peer_id: Some("seeder".to_string()),
        port: Some(6881),
        uploaded: 0,
        downloaded: 0,
        left: 0,
        event: Some("started".to_string()),
        numwant: None,
        ip: None,
    };
    let first = tracker
        .handle_announce(&seeder, IpAddr::from([10, 0, 0, 1]))
        .unwrap();
    assert_eq!(first.complete, 1);
    assert!(first.peers.is_empty());

    // A fresh leecher learns about the seeder
    let leecher = AnnounceRequest {
        info_hash: Some(hash),
        peer_id: Some("leecher".to_string()),
        port: Some(6882),
        uploaded: 0,
        downloaded: 0,
        left: 1 << 20,
        event: Some("started".to_string()),
        numwant: None,
        ip: None,
    };
    let second = tracker
        .handle_announce(&leecher, IpAddr::from([10, 0, 0, 2]))
        .unwrap();
    assert_eq!(second.complete, 1);
    assert_eq!(second.incomplete, 1);
    assert_eq!(second.peers.len(), 1);
    assert_eq!(second.peers[0].peer_id, "seeder");
}

#[test]
fn test_registry_rooms_stay_isolated() {
    let registry = SwarmRegistry::new(RegistryConfig::default());
    registry.ensure_peer("a");
    registry.ensure_peer("b");
    registry.join("alpha", "a").unwrap();
    registry.join("beta", "b").unwrap();

    let file = FileInfo {
        hash: test_hash('c'),
        name: "slides.pdf".to_string(),
        size: 4096,
    };
    registry.announce_file("alpha", "a", &file).unwrap();

    // The file is announced in alpha only
    let err = registry.request_file("beta", "b", &file.hash).unwrap_err();
    assert!(matches!(err, pylon_swarm::SwarmError::UnknownFile(_)));

    // Dropping a leaves beta untouched
    registry.remove_peer("a");
    assert!(registry.members("alpha").is_none());
    assert_eq!(registry.members("beta").unwrap(), vec!["b".to_string()]);
}
