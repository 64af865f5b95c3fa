//! Packet dispatcher (spec §4.2). Single entry point for every inbound
//! packet; enforces the three gate conditions then routes by
//! `(PacketType, PacketContext)`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::hash::Hash;
use crate::packet::{InboundPacket, PacketContext, PacketType};
use crate::resource::ResourceHandle;

use super::{Link, LinkStatus};

/// Transport's single hand-off point: `link.receive(packet)` in spec terms.
/// Locks the same mutex the watchdog locks, so at most one status
/// transition happens at a time (spec §5 ordering guarantee; §4.3's
/// already-adopted REDESIGN FLAG).
pub async fn receive(link: &Arc<Mutex<Link>>, packet: InboundPacket) {
    let mut guard = link.lock().await;
    guard.handle_receive(packet);
}

impl Link {
    fn handle_receive(&mut self, packet: InboundPacket) {
        // Gate 1.
        if self.status == LinkStatus::Closed {
            return;
        }

        // Gate 2: initiators never act on their own echoed keep-alive ping.
        if self.initiator
            && packet.packet_type == PacketType::Data
            && packet.context == PacketContext::Keepalive
            && packet.data.first() == Some(&0xFF)
        {
            return;
        }

        // Gate 3: interface pinning, enforced only once ACTIVE (invariant 4).
        if matches!(self.status, LinkStatus::Active | LinkStatus::Stale) {
            if let Some(attached) = self.attached_interface {
                if packet.receiving_interface != attached {
                    log::warn!(
                        target: "rns_link",
                        "link {} dropped packet from interface {:?}, pinned to {:?}",
                        self.link_id, packet.receiving_interface, attached
                    );
                    return;
                }
            }
        }

        self.last_inbound = Some(Instant::now());
        if packet.context != PacketContext::Keepalive {
            self.last_data = Some(Instant::now());
        }
        self.rx += 1;
        self.rxbytes += packet.data.len() as u64;
        if self.status == LinkStatus::Stale {
            log::debug!(target: "rns_link", "link {} recovered from stale", self.link_id);
            self.status = LinkStatus::Active;
        }

        match (packet.packet_type, packet.context) {
            (PacketType::Proof, PacketContext::None) => self.handle_proof(packet),
            (PacketType::Data, PacketContext::None) => self.handle_data_none(packet),
            (PacketType::Data, PacketContext::LinkIdentify) => self.handle_identify_packet(packet),
            (PacketType::Data, PacketContext::Request) => self.handle_request_packet(packet),
            (PacketType::Data, PacketContext::Response) => self.handle_response_packet(packet),
            (PacketType::Data, PacketContext::Lrrtt) => self.handle_rtt(packet),
            (PacketType::Data, PacketContext::LinkClose) => self.handle_link_close(packet),
            (PacketType::Data, PacketContext::ResourceAdvertisement) => {
                self.handle_resource_advertisement(packet)
            }
            (PacketType::Data, PacketContext::ResourceRequest)
            | (PacketType::Data, PacketContext::ResourceHashUpdate)
            | (PacketType::Data, PacketContext::ResourceInitiatorCancel)
            | (PacketType::Data, PacketContext::ResourceReceiverCancel)
            | (PacketType::Data, PacketContext::Resource) => self.handle_resource_forward(&packet),
            (PacketType::Data, PacketContext::Keepalive) => self.handle_keepalive(&packet),
            (PacketType::Data, PacketContext::Channel) => self.handle_channel(packet),
            (PacketType::Proof, PacketContext::ResourceProof) => self.handle_resource_forward(&packet),
            (packet_type, context) => {
                log::debug!(
                    target: "rns_link",
                    "link {} received unhandled packet ({:?}, {:?})",
                    self.link_id, packet_type, context
                );
            }
        }
    }

    fn handle_data_none(&mut self, packet: InboundPacket) {
        let Some(token) = self.token.as_ref() else { return };
        let Ok(plaintext) = token.decrypt(&packet.data) else { return };
        self.callbacks.fire_packet(plaintext);
    }

    fn handle_keepalive(&mut self, packet: &InboundPacket) {
        // Only the responder replies; the initiator never acts on inbound
        // keep-alives beyond the self-echo gate above (spec §4.2, invariant 7).
        if self.initiator {
            return;
        }
        if packet.data.first() == Some(&0xFF) {
            self.enqueue(crate::packet::PacketType::Data, PacketContext::Keepalive, vec![0xFE]);
        }
    }

    fn handle_channel(&mut self, packet: InboundPacket) {
        let Some(token) = self.token.as_ref() else { return };
        let Ok(plaintext) = token.decrypt(&packet.data) else { return };
        if let Some(sink) = self.channel_sink.as_ref() {
            sink.deliver(&plaintext);
        }
    }

    fn handle_resource_advertisement(&mut self, packet: InboundPacket) {
        let Some(token) = self.token.as_ref() else { return };
        let Ok(plaintext) = token.decrypt(&packet.data) else { return };

        // This crate tracks resources but does not reimplement the chunked
        // transfer engine (§1 out of scope): advertisements here carry the
        // whole payload inline, which is enough to drive the Link-level
        // request/response state machine end to end (see DESIGN.md).
        if let Some(request_id) = self.response_request_id_for(&plaintext) {
            self.complete_resource_response(request_id, plaintext);
            return;
        }

        if !self.sink_accepts(&plaintext) {
            log::debug!(target: "rns_link", "link {} rejected resource advertisement", self.link_id);
            return;
        }
        let hash = Hash::of(&plaintext);
        self.resources.track_incoming(ResourceHandle {
            hash,
            link_id: self.link_id,
            is_response: false,
            request_id: None,
        });
        self.callbacks.fire_resource_started();
        self.handle_inline_request(plaintext);
        self.resources.complete(&hash);
        self.callbacks.fire_resource_concluded();
    }

    fn handle_resource_forward(&mut self, packet: &InboundPacket) {
        let hash = Hash::of(&packet.data);
        if self.resources.find_outgoing(&hash).is_none() && self.resources.find_incoming(&hash).is_none() {
            log::debug!(target: "rns_link", "link {} dropped resource sub-packet for unknown hash", self.link_id);
        }
    }

    /// Unsolicited advertisements only — responses short-circuit above.
    /// `AcceptApp` asks the application per advertisement (spec §6); the
    /// other strategies don't need the app callback's verdict at all, so it
    /// isn't computed unless it's actually consulted.
    fn sink_accepts(&self, plaintext: &[u8]) -> bool {
        use crate::resource::{DefaultResourceSink, ResourceSink, ResourceStrategy};
        let app_decision = match self.resource_strategy {
            ResourceStrategy::AcceptApp => self.callbacks.fire_resource(plaintext.to_vec()),
            _ => false,
        };
        DefaultResourceSink.accept(self.resource_strategy, false, app_decision)
    }
}
