//! The Reticulum Transport router is out of scope (§1); Link depends on it
//! only through this trait, so it can be constructed and driven in tests
//! without a real router — the same discipline the wider stack applies by
//! keeping its own `Transport` a concrete, unit-testable struct rather than
//! a process-wide singleton.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::hash::{AddressHash, LinkId};
use crate::link::Link;
use crate::packet::OutboundPacket;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn register_link(&self, link_id: LinkId, link: Arc<Mutex<Link>>);
    async fn activate_link(&self, link_id: LinkId);
    fn hops_to(&self, destination: AddressHash) -> u8;
    fn next_hop_interface_hw_mtu(&self, destination: AddressHash) -> Option<u32>;
    fn get_first_hop_timeout(&self, destination: AddressHash) -> f64;
    async fn send(&self, packet: OutboundPacket);
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    /// Drives two `Link`s against each other in-process: `send` enqueues
    /// onto a channel the test harness drains and feeds to the peer's
    /// `Link::receive`.
    pub struct FakeTransport {
        pub outbox: Mutex<mpsc::UnboundedSender<OutboundPacket>>,
        pub links: Mutex<HashMap<LinkId, Arc<Mutex<Link>>>>,
        pub hops: u8,
        pub hw_mtu: Option<u32>,
        pub first_hop_timeout: f64,
    }

    impl FakeTransport {
        pub fn new(hops: u8) -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundPacket>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Arc::new(Self {
                outbox: Mutex::new(tx),
                links: Mutex::new(HashMap::new()),
                hops,
                hw_mtu: None,
                first_hop_timeout: 1.0,
            });
            (transport, rx)
        }

        pub async fn link(&self, link_id: &LinkId) -> Option<Arc<Mutex<Link>>> {
            self.links.lock().await.get(link_id).cloned()
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
            self.hw_mtu
        }

        fn get_first_hop_timeout(&self, _destination: AddressHash) -> f64 {
            self.first_hop_timeout
        }

        async fn send(&self, packet: OutboundPacket) {
            let _ = self.outbox.lock().await.send(packet);
        }
    }
}
