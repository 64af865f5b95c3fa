//! Shared fixtures for the integration suite: a minimal in-process
//! `Transport` plus a throwaway `LongTermIdentity`, mirroring the library's
//! own `#[cfg(test)]` `FakeTransport` (not reusable here since it isn't
//! compiled into the library for downstream/integration crates).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use rns_link::hash::{AddressHash, LinkId};
use rns_link::identity::LongTermIdentity;
use rns_link::packet::{InboundPacket, InterfaceId, OutboundPacket};
use rns_link::transport::Transport;
use rns_link::Link;

pub struct FakeTransport {
    pub outbox: Mutex<mpsc::UnboundedSender<OutboundPacket>>,
    pub links: Mutex<HashMap<LinkId, Arc<Mutex<Link>>>>,
    pub hops: u8,
}

impl FakeTransport {
    pub fn new(hops: u8) -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self { outbox: Mutex::new(tx), links: Mutex::new(HashMap::new()), hops });
        (transport, rx)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn register_link(&self, link_id: LinkId, link: Arc<Mutex<Link>>) {
        self.links.lock().await.insert(link_id, link);
    }

    async fn activate_link(&self, _link_id: LinkId) {}

    fn hops_to(&self, _destination: AddressHash) -> u8 {
        self.hops
    }

    fn next_hop_interface_hw_mtu(&self, _destination: AddressHash) -> Option<u32> {
        None
    }

    fn get_first_hop_timeout(&self, _destination: AddressHash) -> f64 {
        1.0
    }

    async fn send(&self, packet: OutboundPacket) {
        let _ = self.outbox.lock().await.send(packet);
    }
}

/// Converts an `OutboundPacket` one peer emitted into the `InboundPacket`
/// the other peer's Transport would have delivered, as if it arrived on
/// `interface`.
pub fn to_inbound(packet: OutboundPacket, interface: InterfaceId, hops: u8) -> InboundPacket {
    InboundPacket {
        packet_type: packet.packet_type,
        context: packet.context,
        destination: packet.destination,
        receiving_interface: interface,
        hops,
        data: packet.data,
    }
}

pub struct TestIdentity {
    signing: rns_link::crypto::SigningKeypair,
    dh: rns_link::crypto::DhKeypair,
}

impl TestIdentity {
    pub fn generate() -> Self {
        Self {
            signing: rns_link::crypto::SigningKeypair::generate_os_rng(),
            dh: rns_link::crypto::DhKeypair::generate_os_rng(),
        }
    }
}

impl LongTermIdentity for TestIdentity {
    fn verifying_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_bytes()
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message)
    }

    fn dh_public_bytes(&self) -> [u8; 32] {
        self.dh.public_bytes()
    }

    fn address_hash(&self) -> AddressHash {
        AddressHash::truncated_from(&self.verifying_key_bytes())
    }
}
