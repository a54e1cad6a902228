//! Two nodes on one machine: discovery feeds B's registry, B picks A as its
//! transfer target, and B's broadcast reaches A.

use lanchat_core::{resolve_target, DeviceRegistry, Envelope, NodeConfig, NoPrompt, TransferTarget};
use lanchat_daemon::discovery::PROTOCOL_VERSION;
use lanchat_daemon::{BroadcastBus, Browser, BusConfig, LanNode, PeerEventHandler, ResolvedPeer};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn join_select_and_chat() {
    let a_address: SocketAddr = "192.168.1.10:9001".parse().unwrap();
    let b_address: SocketAddr = "192.168.1.20:9002".parse().unwrap();

    // B learns about A through a discovery join
    let b_registry = Arc::new(DeviceRegistry::with_local_address(b_address));
    let b_browser = Browser::new(Arc::clone(&b_registry), b_address);
    b_browser.on_join(ResolvedPeer {
        name: "A".into(),
        addresses: vec![a_address.ip()],
        port: a_address.port(),
        version: Some(PROTOCOL_VERSION.into()),
    });

    let devices = b_registry.list();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "A");
    assert_eq!(devices[0].address, a_address);

    // With a single peer known, no prompt is needed
    let target = resolve_target(&devices, None, &NoPrompt).unwrap();
    match target {
        TransferTarget::Device(device) => assert_eq!(device.name, "A"),
        other => panic!("expected a device, got {:?}", other),
    }

    // A listens on its own port, B sends there
    let a_port = free_udp_port();
    let a_bus = BroadcastBus::new(BusConfig {
        listen: SocketAddrV4::new(Ipv4Addr::LOCALHOST, a_port),
        destination: SocketAddrV4::new(Ipv4Addr::LOCALHOST, a_port),
        queue_capacity: 16,
    });
    let b_port = free_udp_port();
    let b_bus = BroadcastBus::new(BusConfig {
        listen: SocketAddrV4::new(Ipv4Addr::LOCALHOST, b_port),
        destination: SocketAddrV4::new(Ipv4Addr::LOCALHOST, a_port),
        queue_capacity: 16,
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    a_bus
        .start(move |envelope, _| {
            let _ = tx.send(envelope);
        })
        .await
        .unwrap();
    b_bus.start(|_, _| {}).await.unwrap();

    b_bus.try_broadcast(&Envelope::text("B", "hi")).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("A never heard from B")
        .unwrap();
    assert_eq!(received.sender, "B");
    assert_eq!(received.text, "hi");

    a_bus.stop();
    b_bus.stop();
}

#[tokio::test]
async fn node_serves_and_shuts_down() {
    let work = tempfile::tempdir().unwrap();
    let config = NodeConfig {
        advertise_ip: Some(Ipv4Addr::LOCALHOST),
        broadcast_port: free_udp_port(),
        broadcast_addr: Ipv4Addr::LOCALHOST,
        shared_dir: work.path().join("shared"),
        download_dir: work.path().join("downloads"),
        ..NodeConfig::default()
    };

    let node = LanNode::start(config).await.unwrap();
    let address = node.local_address();
    assert_eq!(address.ip(), Ipv4Addr::LOCALHOST);
    assert_ne!(address.port(), 0);
    assert_eq!(node.registry().local_address(), Some(address));

    // Shared file round trip through the node's own HTTP service
    let source = work.path().join("hello.txt");
    std::fs::write(&source, "hello").unwrap();
    let client = node.transfer_client();
    client.upload(address, &source).await.unwrap();
    let saved = client.download(address, "hello.txt").await.unwrap();
    assert_eq!(std::fs::read_to_string(saved).unwrap(), "hello");

    assert!(client.list_devices(address).await.is_ok());

    let bus = Arc::clone(node.bus());
    node.shutdown();
    assert!(!bus.is_running());
}
