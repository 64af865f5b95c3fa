//! Scenario 1 (happy path), scenario 3 (signature tampering), and the
//! teardown idempotence property.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rns_link::callbacks::{ClosedReason, LinkCallbacks};
use rns_link::config::LinkConfig;
use rns_link::identity::LongTermIdentity;
use rns_link::packet::InterfaceId;
use rns_link::{Link, LinkStatus};

use support::{to_inbound, FakeTransport, TestIdentity};

const IFACE: InterfaceId = InterfaceId(1);

#[tokio::test]
async fn happy_path_establish_send_and_teardown() {
    let (transport_a, mut rx_a) = FakeTransport::new(1);
    let (transport_b, mut rx_b) = FakeTransport::new(1);

    let identity_b = Arc::new(TestIdentity::generate());
    let destination_b = identity_b.address_hash();

    let received = Arc::new(std::sync::Mutex::new(None));
    let received2 = received.clone();
    let closed = Arc::new(AtomicBool::new(false));
    let closed2 = closed.clone();
    let closed_reason = Arc::new(std::sync::Mutex::new(None));
    let closed_reason2 = closed_reason.clone();
    let callbacks_b = LinkCallbacks {
        packet: Some(Arc::new(move |data| {
            *received2.lock().unwrap() = Some(data);
        })),
        link_closed: Some(Arc::new(move |reason| {
            closed2.store(true, Ordering::SeqCst);
            *closed_reason2.lock().unwrap() = Some(reason);
        })),
        ..Default::default()
    };

    let arc_a = Link::initiate(
        destination_b,
        identity_b.verifying_key_bytes(),
        transport_a.clone(),
        LinkConfig::default(),
        LinkCallbacks::default(),
    )
    .await;

    let link_request = rx_a.recv().await.expect("A emits LINKREQUEST");
    let inbound_request = to_inbound(link_request, IFACE, 1);

    let arc_b =
        Link::validate_request(&inbound_request, identity_b.clone(), transport_b.clone(), LinkConfig::default(), callbacks_b)
            .await
            .expect("B validates the request");

    let proof = rx_b.recv().await.expect("B emits LRPROOF");
    rns_link::receive(&arc_a, to_inbound(proof, IFACE, 1)).await;

    let rtt_packet = rx_a.recv().await.expect("A emits LRRTT after proof verifies");
    rns_link::receive(&arc_b, to_inbound(rtt_packet, IFACE, 1)).await;

    assert_eq!(arc_a.lock().await.status, LinkStatus::Active);
    assert_eq!(arc_b.lock().await.status, LinkStatus::Active);

    let payload = vec![7u8; 100];
    arc_a.lock().await.send(&payload).expect("A is ACTIVE");

    let data_packet = rx_a.recv().await.expect("A emits DATA/NONE");
    rns_link::receive(&arc_b, to_inbound(data_packet, IFACE, 1)).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*received.lock().unwrap(), Some(payload));

    rns_link::teardown(&arc_a).await;
    assert_eq!(arc_a.lock().await.status, LinkStatus::Closed);
    assert_eq!(arc_a.lock().await.closed_reason, Some(ClosedReason::InitiatorClosed));

    let link_close = rx_a.recv().await.expect("A emits LINKCLOSE");
    rns_link::receive(&arc_b, to_inbound(link_close, IFACE, 1)).await;
    assert_eq!(arc_b.lock().await.status, LinkStatus::Closed);
    assert_eq!(arc_b.lock().await.closed_reason, Some(ClosedReason::InitiatorClosed));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(*closed_reason.lock().unwrap(), Some(ClosedReason::InitiatorClosed));

    // Second teardown is a no-op (idempotence property, §8).
    rns_link::teardown(&arc_a).await;
    assert_eq!(arc_a.lock().await.status, LinkStatus::Closed);
}

#[tokio::test]
async fn tampered_proof_signature_never_activates() {
    let (transport_a, mut rx_a) = FakeTransport::new(1);
    let (transport_b, mut rx_b) = FakeTransport::new(1);

    let identity_b = Arc::new(TestIdentity::generate());
    let destination_b = identity_b.address_hash();

    let arc_a = Link::initiate(
        destination_b,
        identity_b.verifying_key_bytes(),
        transport_a.clone(),
        LinkConfig::default(),
        LinkCallbacks::default(),
    )
    .await;

    let link_request = rx_a.recv().await.unwrap();
    let arc_b = Link::validate_request(
        &to_inbound(link_request, IFACE, 1),
        identity_b.clone(),
        transport_b.clone(),
        LinkConfig::default(),
        LinkCallbacks::default(),
    )
    .await
    .unwrap();

    let mut proof = rx_b.recv().await.unwrap();
    proof.data[0] ^= 0x01; // flip a bit inside the 64-byte signature, not the signalling tail

    rns_link::receive(&arc_a, to_inbound(proof, IFACE, 1)).await;

    assert_eq!(arc_a.lock().await.status, LinkStatus::Closed);
    assert_eq!(arc_a.lock().await.closed_reason, Some(ClosedReason::Timeout));
    assert_eq!(arc_b.lock().await.status, LinkStatus::Handshake);
}
