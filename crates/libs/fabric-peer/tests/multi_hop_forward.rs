//! Three-gateway multi-hop forwarding over real `tokio::io::duplex` sessions,
//! covering the ttl-increment-and-forward / ttl-expiry-drop scenario.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fabric_peer::{PacketHandler, PeerService};
use fabric_routing::{RouterEntry, RoutingTable};
use fabric_wire::{Message, MessageHeader, PacketType, RouteInfo};
use tokio::sync::RwLock;

struct CountingHandler {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl PacketHandler for CountingHandler {
    async fn handle(&self, _from_peer: &str, header: MessageHeader, _payload: Vec<u8>) {
        assert_eq!(header.ttl, 1, "ttl should have been incremented exactly once by the relay");
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

fn service(self_id: &str, unreachable_distance: u8) -> (Arc<PeerService>, Arc<RwLock<RoutingTable>>) {
    let routing = Arc::new(RwLock::new(RoutingTable::new(self_id, unreachable_distance)));
    (PeerService::new(self_id, unreachable_distance, 1 << 16, Arc::clone(&routing)), routing)
}

async fn connect(a: &Arc<PeerService>, b: &Arc<PeerService>) {
    let (client, server) = tokio::io::duplex(1 << 16);
    let a = Arc::clone(a);
    let b = Arc::clone(b);
    let a_side = tokio::spawn(async move { a.establish(None, client).await });
    let b_side = tokio::spawn(async move { b.establish(None, server).await });
    a_side.await.unwrap().unwrap();
    b_side.await.unwrap().unwrap();
}

fn message_to(dst: &str, ttl: u16) -> Message {
    Message {
        header: MessageHeader {
            version: 1,
            packet_type: PacketType::P2PMessage,
            ttl,
            ext: fabric_wire::EXT_ROUTE_BY_NODE,
            trace_id: "multi-hop".into(),
            src_gw_node: Vec::new(),
            dst_gw_node: dst.as_bytes().to_vec(),
            route_info: Some(RouteInfo { dst_node: b"front".to_vec(), ..Default::default() }),
        },
        payload: b"payload".to_vec(),
    }
}

#[tokio::test]
async fn forwards_through_intermediate_gateway_with_ttl_increment() {
    let (gw1, routing1) = service("gw-1", 16);
    let (gw2, _routing2) = service("gw-2", 16);
    let (gw3, _routing3) = service("gw-3", 16);

    connect(&gw1, &gw2).await;
    connect(&gw2, &gw3).await;

    // gw-1 only knows gw-2 directly; teach it that gw-3 is reachable one hop
    // further out via gw-2, the way `RouterManager::on_response` would after
    // a real gossip round.
    routing1
    .write()
    .await
    .apply_advertised_table("gw-2", &[RouterEntry { dst: "gw-3".into(), next_hop: "gw-2".into(), distance: 1 }]);

    let delivered = Arc::new(AtomicUsize::new(0));
    gw3.register_handler(PacketType::P2PMessage, Arc::new(CountingHandler { count: delivered.clone() })).await;

    gw1.send_to_node("gw-3", message_to("gw-3", 0)).await.unwrap();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while delivered.load(Ordering::SeqCst) == 0 {
        if tokio::time::Instant::now() >= deadline {
            panic!("message never reached gw-3");
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn drops_frame_whose_ttl_has_reached_the_unreachable_ceiling() {
    let (gw1, routing1) = service("gw-1", 4);
    let (gw2, _routing2) = service("gw-2", 4);
    let (gw3, _routing3) = service("gw-3", 4);

    connect(&gw1, &gw2).await;
    connect(&gw2, &gw3).await;

    routing1
    .write()
    .await
    .apply_advertised_table("gw-2", &[RouterEntry { dst: "gw-3".into(), next_hop: "gw-2".into(), distance: 1 }]);

    let delivered = Arc::new(AtomicUsize::new(0));
    gw3.register_handler(PacketType::P2PMessage, Arc::new(CountingHandler { count: delivered.clone() })).await;

    // ttl = unreachable_distance - 1: gw-2 increments it to the ceiling and
    // must drop rather than forward.
    gw1.send_to_node("gw-3", message_to("gw-3", 3)).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
}
