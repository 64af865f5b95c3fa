//! Scenario 2 (establishment timeout) and scenario 5 (keep-alive), driven
//! with `tokio::time::pause`/`advance` instead of real wall-clock waits.

mod support;

use std::sync::Arc;
use std::time::Duration;

use rns_link::callbacks::LinkCallbacks;
use rns_link::config::LinkConfig;
use rns_link::identity::LongTermIdentity;
use rns_link::packet::InterfaceId;
use rns_link::{Link, LinkStatus};

use support::{to_inbound, FakeTransport, TestIdentity};

const IFACE: InterfaceId = InterfaceId(1);

#[tokio::test(start_paused = true)]
async fn establishment_timeout_closes_link() {
    let (transport_a, _rx_a) = FakeTransport::new(2);
    let identity_unreachable = Arc::new(TestIdentity::generate());

    let arc_a = Link::initiate(
        identity_unreachable.address_hash(),
        identity_unreachable.verifying_key_bytes(),
        transport_a.clone(),
        LinkConfig::default(),
        LinkCallbacks::default(),
    )
    .await;

    assert_eq!(arc_a.lock().await.status, LinkStatus::Pending);

    // PER_HOP(6) * hops(2) + KEEPALIVE_MIN(5) = 17s.
    tokio::time::advance(Duration::from_secs(18)).await;
    tokio::task::yield_now().await;

    assert_eq!(arc_a.lock().await.status, LinkStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn keepalive_exchange_keeps_link_active() {
    let (transport_a, mut rx_a) = FakeTransport::new(1);
    let (transport_b, mut rx_b) = FakeTransport::new(1);

    let identity_b = Arc::new(TestIdentity::generate());
    let destination_b = identity_b.address_hash();

    let mut config = LinkConfig::default();
    config.keepalive_min = 5.0;
    config.keepalive_max = 5.0;

    let arc_a = Link::initiate(
        destination_b,
        identity_b.verifying_key_bytes(),
        transport_a.clone(),
        config,
        LinkCallbacks::default(),
    )
    .await;

    let link_request = rx_a.recv().await.unwrap();
    let arc_b = Link::validate_request(
        &to_inbound(link_request, IFACE, 1),
        identity_b.clone(),
        transport_b.clone(),
        config,
        LinkCallbacks::default(),
    )
    .await
    .unwrap();

    let proof = rx_b.recv().await.unwrap();
    rns_link::receive(&arc_a, to_inbound(proof, IFACE, 1)).await;
    let rtt_packet = rx_a.recv().await.unwrap();
    rns_link::receive(&arc_b, to_inbound(rtt_packet, IFACE, 1)).await;

    assert_eq!(arc_a.lock().await.status, LinkStatus::Active);
    assert_eq!(arc_b.lock().await.status, LinkStatus::Active);

    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    let ping = rx_a.recv().await.expect("A pings after idle keepalive interval");
    assert_eq!(ping.data, vec![0xFF]);
    rns_link::receive(&arc_b, to_inbound(ping, IFACE, 1)).await;

    let pong = rx_b.recv().await.expect("B replies with pong");
    assert_eq!(pong.data, vec![0xFE]);
    rns_link::receive(&arc_a, to_inbound(pong, IFACE, 1)).await;

    assert_eq!(arc_a.lock().await.status, LinkStatus::Active);
    assert_eq!(arc_b.lock().await.status, LinkStatus::Active);
}
