//! The Link state object: the central entity of this crate. Holds keys,
//! counters, status, and callbacks, and implements the handshake, proof
//! validation, RTT exchange, identify sub-protocol, and teardown.
//!
//! Grounded on the wider transport stack's `transport/links.rs`, which keeps
//! each Link behind an `Arc<Mutex<Link>>` and serializes access through
//! `.lock().await` rather than splitting state across channels.

mod dispatch;
mod request;
mod watchdog;

pub use dispatch::receive;
pub use request::{request, HandlerResponse, RequestHandler, RequestHandlerWithLink, RequestReceipt, RequestStatus};
pub use watchdog::spawn_watchdog;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::callbacks::{ClosedReason, LinkCallbacks};
use crate::channel::ChannelSink;
use crate::config::LinkConfig;
use crate::crypto::{self, AeadToken, DhKeypair, Mode, SigningKeypair, ED25519_PUB_SIZE, X25519_PUB_SIZE};
use crate::error::LinkError;
use crate::hash::{truncated_hash, AddressHash, LinkId};
use crate::identity::{AllowPolicy, LongTermIdentity, RemoteIdentity};
use crate::packet::{InboundPacket, InterfaceId, OutboundPacket, PacketContext, PacketType};
use crate::resource::{ResourceStrategy, ResourceTable};
use crate::signalling::{self, SIGNALLING_SIZE};
use crate::transport::Transport;

use request::RegisteredHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Pending,
    Handshake,
    Active,
    Stale,
    Closed,
}

/// The central entity (spec §3). Every field here is touched only while the
/// owning `Arc<Mutex<Link>>` is locked — the dispatcher and the watchdog
/// share that single lock instead of a separate hand-off flag (§4.3's
/// already-adopted REDESIGN FLAG).
pub struct Link {
    pub link_id: LinkId,
    pub destination: AddressHash,
    pub initiator: bool,
    pub status: LinkStatus,
    pub mode: Mode,
    pub mtu: u32,
    pub mdu: u32,

    own_dh: Option<DhKeypair>,
    own_signing: Option<SigningKeypair>,
    destination_verifying_key: Option<[u8; ED25519_PUB_SIZE]>,
    peer_dh_public: Option<[u8; X25519_PUB_SIZE]>,
    token: Option<AeadToken>,

    pub rtt: Option<f64>,
    pub keepalive: f64,
    pub stale_time: f64,

    pub tx: u64,
    pub rx: u64,
    pub txbytes: u64,
    pub rxbytes: u64,
    pub establishment_cost: u64,

    created_at: Instant,
    request_time: Instant,
    pub activated_at: Option<Instant>,
    pub last_inbound: Option<Instant>,
    pub last_outbound: Option<Instant>,
    pub last_keepalive: Option<Instant>,
    pub last_data: Option<Instant>,
    pub last_proof: Option<Instant>,

    resources: ResourceTable,
    pending_requests: HashMap<[u8; 16], RequestReceipt>,
    handlers: HashMap<[u8; 16], RegisteredHandler>,

    /// Hop count to the destination, used by the watchdog to scale the
    /// establishment timeout (`PER_HOP * max(1, hops) + KEEPALIVE`).
    pub hops: u8,
    pub attached_interface: Option<InterfaceId>,
    pub remote_identity: Option<RemoteIdentity>,
    pub resource_strategy: ResourceStrategy,
    pub allow_policy: AllowPolicy,
    pub closed_reason: Option<ClosedReason>,

    channel_sink: Option<Arc<dyn ChannelSink>>,
    config: LinkConfig,
    callbacks: LinkCallbacks,
    transport: Arc<dyn Transport>,
}

impl Link {
    /// Initiator path (spec §4.1). Generates ephemeral DH and Ed25519
    /// keypairs, builds the LINKREQUEST payload, computes `link_id`,
    /// registers with Transport, starts the watchdog, and sends the
    /// request. `peer_verifying_key` is the destination's long-term
    /// identity key, obtained out of band (e.g. via an Announce, which is
    /// out of scope here) — see spec §9's open question: this is the key
    /// that actually verifies LRPROOF, not anything carried in the request.
    pub async fn initiate(
        destination: AddressHash,
        peer_verifying_key: [u8; ED25519_PUB_SIZE],
        transport: Arc<dyn Transport>,
        config: LinkConfig,
        callbacks: LinkCallbacks,
    ) -> Arc<Mutex<Link>> {
        let own_dh = DhKeypair::generate_os_rng();
        let own_signing = SigningKeypair::generate_os_rng();
        let mtu = config.default_mtu;
        let mode = Mode::Aes256Cbc;
        let signalling = signalling::pack_signalling(mtu, mode);

        let mut payload = Vec::with_capacity(crypto::ECPUBSIZE + SIGNALLING_SIZE);
        payload.extend_from_slice(&own_dh.public_bytes());
        payload.extend_from_slice(&own_signing.verifying_bytes());
        let link_id = AddressHash::truncated_from(&payload);
        payload.extend_from_slice(&signalling);

        let now = Instant::now();
        let mdu = config.mdu_for(mtu, crypto::TOKEN_OVERHEAD);
        let hops = transport.hops_to(destination);

        let link = Link {
            link_id,
            destination,
            initiator: true,
            status: LinkStatus::Pending,
            mode,
            mtu,
            mdu,
            own_dh: Some(own_dh),
            own_signing: Some(own_signing),
            destination_verifying_key: Some(peer_verifying_key),
            peer_dh_public: None,
            token: None,
            rtt: None,
            keepalive: config.keepalive_min,
            stale_time: config.stale_time(config.keepalive_min),
            tx: 0,
            rx: 0,
            txbytes: 0,
            rxbytes: 0,
            establishment_cost: payload.len() as u64,
            created_at: now,
            request_time: now,
            activated_at: None,
            last_inbound: None,
            last_outbound: None,
            last_keepalive: None,
            last_data: None,
            last_proof: None,
            resources: ResourceTable::new(),
            pending_requests: HashMap::new(),
            handlers: HashMap::new(),
            attached_interface: None,
            remote_identity: None,
            hops,
            resource_strategy: ResourceStrategy::AcceptApp,
            allow_policy: AllowPolicy::AllowAll,
            closed_reason: None,
            channel_sink: None,
            config,
            callbacks,
            transport,
        };

        let arc = Arc::new(Mutex::new(link));
        {
            let guard = arc.lock().await;
            guard.transport.register_link(link_id, arc.clone()).await;
            guard
                .transport
                .send(OutboundPacket {
                    packet_type: PacketType::LinkRequest,
                    context: PacketContext::None,
                    destination: link_id,
                    data: payload,
                })
                .await;
        }
        watchdog::spawn_watchdog(arc.clone());
        arc
    }

    /// Responder path (spec §4.1, `validate_request`). Returns `Err` on any
    /// malformed payload — per the failure policy, callers must not emit a
    /// packet in that case either.
    pub async fn validate_request(
        packet: &InboundPacket,
        identity: Arc<dyn LongTermIdentity>,
        transport: Arc<dyn Transport>,
        config: LinkConfig,
        callbacks: LinkCallbacks,
    ) -> Result<Arc<Mutex<Link>>, LinkError> {
        let payload = &packet.data;
        if payload.len() != crypto::ECPUBSIZE && payload.len() != crypto::ECPUBSIZE + SIGNALLING_SIZE {
            return Err(LinkError::PacketError);
        }

        let mut peer_dh_pub = [0u8; X25519_PUB_SIZE];
        peer_dh_pub.copy_from_slice(&payload[0..32]);
        // peer's ephemeral signing key rides along as handshake entropy only
        // (spec §9 open question) — not retained, since neither side ever
        // verifies anything against it.

        let link_id = AddressHash::truncated_from(&payload[0..crypto::ECPUBSIZE]);

        let (mtu, mode) = if payload.len() == crypto::ECPUBSIZE + SIGNALLING_SIZE {
            let mut bytes = [0u8; SIGNALLING_SIZE];
            bytes.copy_from_slice(&payload[64..67]);
            signalling::unpack_signalling(bytes)?
        } else {
            (config.default_mtu, Mode::Aes256Cbc)
        };

        let own_dh = DhKeypair::generate_os_rng();
        let shared = own_dh.diffie_hellman(&peer_dh_pub);
        let link_key = crypto::derive_link_key(&shared, &link_id, mode);
        let token = AeadToken::new(link_key);

        let own_dh_pub = own_dh.public_bytes();
        let verifying = identity.verifying_key_bytes();
        let signalling_bytes = signalling::pack_signalling(mtu, mode);

        let mut sign_data = Vec::with_capacity(16 + 32 + 32 + SIGNALLING_SIZE);
        sign_data.extend_from_slice(link_id.as_slice());
        sign_data.extend_from_slice(&own_dh_pub);
        sign_data.extend_from_slice(&verifying);
        sign_data.extend_from_slice(&signalling_bytes);
        let signature = identity.sign(&sign_data);

        let mut proof_payload = Vec::with_capacity(64 + 32 + SIGNALLING_SIZE);
        proof_payload.extend_from_slice(&signature);
        proof_payload.extend_from_slice(&own_dh_pub);
        proof_payload.extend_from_slice(&signalling_bytes);

        let now = Instant::now();
        let mdu = config.mdu_for(mtu, crypto::TOKEN_OVERHEAD);
        let hops = packet.hops;

        let link = Link {
            link_id,
            destination: packet.destination,
            initiator: false,
            status: LinkStatus::Handshake,
            mode,
            mtu,
            mdu,
            own_dh: Some(own_dh),
            own_signing: None,
            destination_verifying_key: None,
            peer_dh_public: Some(peer_dh_pub),
            token: Some(token),
            rtt: None,
            keepalive: config.keepalive_min,
            stale_time: config.stale_time(config.keepalive_min),
            tx: 1,
            rx: 0,
            txbytes: proof_payload.len() as u64,
            rxbytes: payload.len() as u64,
            establishment_cost: (payload.len() + proof_payload.len()) as u64,
            created_at: now,
            request_time: now,
            activated_at: None,
            last_inbound: Some(now),
            last_outbound: Some(now),
            last_keepalive: None,
            last_data: None,
            last_proof: Some(now),
            resources: ResourceTable::new(),
            pending_requests: HashMap::new(),
            handlers: HashMap::new(),
            hops,
            attached_interface: Some(packet.receiving_interface),
            remote_identity: None,
            resource_strategy: ResourceStrategy::AcceptApp,
            allow_policy: AllowPolicy::AllowAll,
            closed_reason: None,
            channel_sink: None,
            config,
            callbacks,
            transport,
        };

        let arc = Arc::new(Mutex::new(link));
        {
            let guard = arc.lock().await;
            guard.transport.register_link(link_id, arc.clone()).await;
            guard
                .transport
                .send(OutboundPacket {
                    packet_type: PacketType::Proof,
                    context: PacketContext::None,
                    destination: link_id,
                    data: proof_payload,
                })
                .await;
        }
        watchdog::spawn_watchdog(arc.clone());
        Ok(arc)
    }

    /// Initiator-side proof validation (spec §4.1). On any failure closes
    /// through `close()` (no closer variant fits a validation failure than
    /// `Timeout`, so it reuses that one) rather than just flipping
    /// `status`, so key material is still zeroed and `link_closed` still
    /// fires.
    fn handle_proof(&mut self, packet: InboundPacket) {
        if !self.initiator || self.status != LinkStatus::Handshake {
            return;
        }
        if let Err(err) = self.try_handle_proof(&packet.data) {
            log::warn!(target: "rns_link", "link {} proof validation failed: {}", self.link_id, err);
            self.close(ClosedReason::Timeout);
        }
    }

    fn try_handle_proof(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if payload.len() != 96 && payload.len() != 96 + SIGNALLING_SIZE {
            return Err(LinkError::PacketError);
        }
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&payload[0..64]);
        let mut peer_dh_pub = [0u8; X25519_PUB_SIZE];
        peer_dh_pub.copy_from_slice(&payload[64..96]);

        let (confirmed_mtu, mode) = if payload.len() == 96 + SIGNALLING_SIZE {
            let mut bytes = [0u8; SIGNALLING_SIZE];
            bytes.copy_from_slice(&payload[96..99]);
            signalling::unpack_signalling(bytes)?
        } else {
            (self.mtu, self.mode)
        };
        if mode != self.mode {
            return Err(LinkError::UnsupportedMode);
        }

        let dest_key = self.destination_verifying_key.ok_or(LinkError::InvalidArgument)?;
        let signalling_bytes = signalling::pack_signalling(confirmed_mtu, mode);
        let mut sign_data = Vec::with_capacity(16 + 32 + 32 + SIGNALLING_SIZE);
        sign_data.extend_from_slice(self.link_id.as_slice());
        sign_data.extend_from_slice(&peer_dh_pub);
        sign_data.extend_from_slice(&dest_key);
        sign_data.extend_from_slice(&signalling_bytes);
        crypto::verify_signature(&dest_key, &sign_data, &signature)?;

        self.peer_dh_public = Some(peer_dh_pub);
        self.mtu = confirmed_mtu;
        self.mdu = self.config.mdu_for(self.mtu, crypto::TOKEN_OVERHEAD);

        let own_dh = self.own_dh.as_ref().ok_or(LinkError::InvalidArgument)?;
        let shared = own_dh.diffie_hellman(&peer_dh_pub);
        let link_key = crypto::derive_link_key(&shared, &self.link_id, self.mode);
        self.token = Some(AeadToken::new(link_key));

        let now = Instant::now();
        self.rtt = Some((now - self.request_time).as_secs_f64());
        self.keepalive = self.config.clamp_keepalive(self.rtt.unwrap());
        self.stale_time = self.config.stale_time(self.keepalive);
        self.last_proof = Some(now);
        self.status = LinkStatus::Active;
        self.activated_at = Some(now);

        self.send_rtt_packet();
        self.callbacks.fire_link_established();
        Ok(())
    }

    fn send_rtt_packet(&mut self) {
        let rtt = self.rtt.unwrap_or(0.0);
        let plaintext = rmp_serde::to_vec(&rtt).expect("f64 always encodes");
        self.send_encrypted(PacketContext::Lrrtt, &plaintext);
    }

    /// Responder-side RTT reception (spec §4.1).
    fn handle_rtt(&mut self, packet: InboundPacket) {
        if self.initiator || self.status != LinkStatus::Handshake || self.token.is_none() {
            return;
        }
        let plaintext = match self.token.as_ref().unwrap().decrypt(&packet.data) {
            Ok(p) => p,
            Err(_) => return,
        };
        let peer_rtt: f64 = match rmp_serde::from_slice(&plaintext) {
            Ok(v) => v,
            Err(_) => return,
        };
        let own_measured = self
            .last_proof
            .map(|t| (Instant::now() - t).as_secs_f64())
            .unwrap_or(peer_rtt);
        let rtt = own_measured.max(peer_rtt);
        self.rtt = Some(rtt);
        self.keepalive = self.config.clamp_keepalive(rtt);
        self.stale_time = self.config.stale_time(self.keepalive);
        self.status = LinkStatus::Active;
        self.activated_at = Some(Instant::now());
        self.callbacks.fire_link_established();
    }

    /// Identify sub-protocol (spec §4.5), initiator-only, ACTIVE-only.
    fn identify_locked(&mut self, identity: &dyn LongTermIdentity) -> Result<(), LinkError> {
        if !self.initiator || self.status != LinkStatus::Active {
            return Err(LinkError::InvalidArgument);
        }
        let pub_bytes = identity.verifying_key_bytes();
        let mut signed = Vec::with_capacity(16 + ED25519_PUB_SIZE);
        signed.extend_from_slice(self.link_id.as_slice());
        signed.extend_from_slice(&pub_bytes);
        let signature = identity.sign(&signed);

        let mut plaintext = Vec::with_capacity(ED25519_PUB_SIZE + 64);
        plaintext.extend_from_slice(&pub_bytes);
        plaintext.extend_from_slice(&signature);
        self.send_encrypted(PacketContext::LinkIdentify, &plaintext);
        Ok(())
    }

    fn handle_identify_packet(&mut self, packet: InboundPacket) {
        let Some(token) = self.token.as_ref() else { return };
        let plaintext = match token.decrypt(&packet.data) {
            Ok(p) => p,
            Err(_) => return,
        };
        if plaintext.len() != ED25519_PUB_SIZE + 64 {
            return;
        }
        let mut pub_bytes = [0u8; ED25519_PUB_SIZE];
        pub_bytes.copy_from_slice(&plaintext[..ED25519_PUB_SIZE]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&plaintext[ED25519_PUB_SIZE..]);

        let mut signed = Vec::with_capacity(16 + ED25519_PUB_SIZE);
        signed.extend_from_slice(self.link_id.as_slice());
        signed.extend_from_slice(&pub_bytes);
        if crypto::verify_signature(&pub_bytes, &signed, &signature).is_err() {
            return;
        }
        let identity = RemoteIdentity::from_public(pub_bytes);
        self.remote_identity = Some(identity);
        self.callbacks.fire_remote_identified(identity);
    }

    /// Teardown (spec §4.6). Idempotent: a second call observes `Closed` and
    /// does nothing.
    fn teardown_locked(&mut self) {
        if matches!(self.status, LinkStatus::Pending | LinkStatus::Closed) {
            self.close(ClosedReason::InitiatorClosed);
            return;
        }
        let reason = if self.initiator {
            ClosedReason::InitiatorClosed
        } else {
            ClosedReason::DestinationClosed
        };
        let plaintext = self.link_id.as_slice().to_vec();
        self.send_encrypted(PacketContext::LinkClose, &plaintext);
        self.close(reason);
    }

    fn handle_link_close(&mut self, packet: InboundPacket) {
        let Some(token) = self.token.as_ref() else { return };
        let plaintext = match token.decrypt(&packet.data) {
            Ok(p) => p,
            Err(_) => return,
        };
        if plaintext != self.link_id.as_slice() {
            return;
        }
        let reason = if self.initiator {
            ClosedReason::DestinationClosed
        } else {
            ClosedReason::InitiatorClosed
        };
        self.close(reason);
    }

    /// Drives the Link to CLOSED, zeroes key material (invariant 2), cancels
    /// in-flight resources, and fires `link_closed`. Safe to call more than
    /// once.
    pub(crate) fn close(&mut self, reason: ClosedReason) {
        if self.status == LinkStatus::Closed {
            return;
        }
        self.status = LinkStatus::Closed;
        self.closed_reason = Some(reason);
        self.token = None;
        self.peer_dh_public = None;
        self.destination_verifying_key = None;
        self.own_dh = None;
        self.own_signing = None;
        self.resources.cancel_all();
        for (_, receipt) in self.pending_requests.drain() {
            if receipt.status != RequestStatus::Ready {
                receipt.callbacks.fire_failed();
            }
        }
        self.channel_sink = None;
        self.callbacks.fire_link_closed(reason);
    }

    fn send_encrypted(&mut self, context: PacketContext, plaintext: &[u8]) {
        let Some(token) = self.token.as_ref() else { return };
        let ciphertext = token.encrypt(plaintext);
        self.enqueue(PacketType::Data, context, ciphertext);
    }

    fn enqueue(&mut self, packet_type: PacketType, context: PacketContext, data: Vec<u8>) {
        self.tx += 1;
        self.txbytes += data.len() as u64;
        self.last_outbound = Some(Instant::now());
        let packet = OutboundPacket { packet_type, context, destination: self.link_id, data };
        let transport = self.transport.clone();
        tokio::spawn(async move {
            transport.send(packet).await;
        });
    }

    /// Sends an application-level packet (DATA/NONE), encrypted under the
    /// link key. The peer's `packet` callback fires with the plaintext.
    pub fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if self.status != LinkStatus::Active {
            return Err(LinkError::Closed);
        }
        self.send_encrypted(PacketContext::None, data);
        Ok(())
    }

    pub fn set_channel_sink(&mut self, sink: Arc<dyn ChannelSink>) {
        self.channel_sink = Some(sink);
    }

    pub fn register_handler(&mut self, path: &str, handler: Arc<dyn RequestHandlerWithLink>) {
        let path_hash = truncated_hash(path.as_bytes());
        self.handlers.insert(path_hash, RegisteredHandler { path: path.to_string(), handler });
    }

    fn seconds_since_creation(&self) -> f64 {
        (Instant::now() - self.created_at).as_secs_f64()
    }
}

/// Teardown entry point (spec §4.6). Locks the same mutex `receive()` and
/// the watchdog use, so teardown can never race a status transition.
pub async fn teardown(link: &Arc<Mutex<Link>>) {
    let mut guard = link.lock().await;
    guard.teardown_locked();
}

/// Identify entry point (spec §4.5).
pub async fn identify(link: &Arc<Mutex<Link>>, identity: &dyn LongTermIdentity) -> Result<(), LinkError> {
    let mut guard = link.lock().await;
    guard.identify_locked(identity)
}
