//! The Link's narrow view of the wire: just enough of the packet type and
//! context space to drive dispatch. Real framing — IFAC, transport headers,
//! hop counting — belongs to the Transport router (§1 out of scope).

use crate::hash::LinkId;

/// Opaque handle for "the interface this packet arrived on". Transport
/// hands these out; Link only ever compares them for equality (invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    LinkRequest,
    Proof,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketContext {
    None,
    LinkIdentify,
    Request,
    Response,
    Lrrtt,
    LinkClose,
    ResourceAdvertisement,
    ResourceRequest,
    ResourceHashUpdate,
    ResourceInitiatorCancel,
    ResourceReceiverCancel,
    Resource,
    ResourceProof,
    Keepalive,
    Channel,
}

/// What the packet dispatcher receives from Transport.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub packet_type: PacketType,
    pub context: PacketContext,
    pub destination: LinkId,
    pub receiving_interface: InterfaceId,
    pub hops: u8,
    pub data: Vec<u8>,
}

/// What Link hands back to Transport. Transport is responsible for framing
/// and the non-blocking hand-off described in spec §5.
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    pub packet_type: PacketType,
    pub context: PacketContext,
    pub destination: LinkId,
    pub data: Vec<u8>,
}
