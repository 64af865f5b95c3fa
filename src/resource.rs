//! The chunked-transfer engine (Resource) is out of scope (§1); this module
//! is only the Link-side bookkeeping spec §3/§4.2/§4.6 require: which
//! resources are in flight, and how to route a resource sub-packet to one
//! of them. Grounded on the wider stack's `ResourceManager::handle_packet`
//! dispatch shape, simplified to tracking rather than reassembly.

use std::collections::HashMap;

use crate::hash::{Hash, LinkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStrategy {
    AcceptNone,
    AcceptApp,
    AcceptAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHandle {
    pub hash: Hash,
    pub link_id: LinkId,
    pub is_response: bool,
    pub request_id: Option<[u8; 16]>,
}

/// The Link's `incoming_resources` / `outgoing_resources` collections plus
/// dedup-by-hash routing.
#[derive(Default)]
pub struct ResourceTable {
    incoming: HashMap<Hash, ResourceHandle>,
    outgoing: HashMap<Hash, ResourceHandle>,
    seen_request_hashes: HashMap<Hash, ()>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_incoming(&mut self, handle: ResourceHandle) {
        self.incoming.insert(handle.hash, handle);
    }

    pub fn track_outgoing(&mut self, handle: ResourceHandle) {
        self.outgoing.insert(handle.hash, handle);
    }

    pub fn find_outgoing(&self, hash: &Hash) -> Option<&ResourceHandle> {
        self.outgoing.get(hash)
    }

    pub fn find_incoming(&self, hash: &Hash) -> Option<&ResourceHandle> {
        self.incoming.get(hash)
    }

    pub fn complete(&mut self, hash: &Hash) {
        self.incoming.remove(hash);
        self.outgoing.remove(hash);
    }

    /// Dedup a RESOURCE_REQ-style packet by its content hash (spec §4.2's
    /// "dedupe by packet hash"). Returns `true` the first time a given hash
    /// is seen.
    pub fn dedupe(&mut self, packet_hash: Hash) -> bool {
        self.seen_request_hashes.insert(packet_hash, ()).is_none()
    }

    pub fn cancel_all(&mut self) {
        self.incoming.clear();
        self.outgoing.clear();
    }

    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }
}

/// Lets the external Resource engine ask Link policy whether to accept an
/// inbound advertisement, instead of Link owning chunk reassembly itself.
/// `AcceptApp` can't be decided here — the caller must already have the
/// application's `resource` callback verdict in hand (see
/// `LinkCallbacks::fire_resource`) and pass it as `app_decision`.
pub trait ResourceSink: Send + Sync {
    fn accept(&self, strategy: ResourceStrategy, is_response: bool, app_decision: bool) -> bool;
}

pub struct DefaultResourceSink;

impl ResourceSink for DefaultResourceSink {
    fn accept(&self, strategy: ResourceStrategy, is_response: bool, app_decision: bool) -> bool {
        if is_response {
            // Responses bound to a pending request are always accepted —
            // the strategy only governs unsolicited advertisements.
            return true;
        }
        match strategy {
            ResourceStrategy::AcceptNone => false,
            ResourceStrategy::AcceptAll => true,
            ResourceStrategy::AcceptApp => app_decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_accepts_once() {
        let mut table = ResourceTable::new();
        let h = Hash::of(b"part");
        assert!(table.dedupe(h));
        assert!(!table.dedupe(h));
    }

    #[test]
    fn accept_none_rejects_unsolicited_advertisements() {
        let sink = DefaultResourceSink;
        assert!(!sink.accept(ResourceStrategy::AcceptNone, false, false));
        assert!(sink.accept(ResourceStrategy::AcceptNone, true, false));
    }

    #[test]
    fn accept_app_defers_to_the_app_decision() {
        let sink = DefaultResourceSink;
        assert!(sink.accept(ResourceStrategy::AcceptApp, false, true));
        assert!(!sink.accept(ResourceStrategy::AcceptApp, false, false));
    }

    #[test]
    fn cancel_all_clears_tables() {
        let mut table = ResourceTable::new();
        table.track_incoming(ResourceHandle {
            hash: Hash::of(b"in"),
            link_id: LinkId::truncated_from(b"link"),
            is_response: false,
            request_id: None,
        });
        table.track_outgoing(ResourceHandle {
            hash: Hash::of(b"out"),
            link_id: LinkId::truncated_from(b"link"),
            is_response: false,
            request_id: None,
        });
        table.cancel_all();
        assert_eq!(table.incoming_len(), 0);
        assert_eq!(table.outgoing_len(), 0);
    }
}
