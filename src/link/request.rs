//! Request/response RPC (spec §4.4). Sends a request inline when it fits
//! the negotiated `mdu`, otherwise hands it to the (external, out-of-scope)
//! Resource engine via an advertisement this crate tracks but does not
//! chunk — see DESIGN.md for why that simplification is sound for this
//! crate's scope.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::callbacks::RequestCallbacks;
use crate::error::LinkError;
use crate::hash::{truncated_hash, Hash};
use crate::identity::RemoteIdentity;
use crate::packet::{InboundPacket, PacketContext};
use crate::resource::ResourceHandle;

use super::{Link, LinkStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Sent,
    Delivered,
    Receiving,
    Ready,
    Failed,
}

/// One in-flight RPC (spec §3's RequestReceipt). Created on `request()`;
/// stays in the Link's pending list after concluding so `response_time()`
/// and `status` are still queryable, and is only actually removed on
/// timeout/failure (mirrors `original_source/RNS/Link.py`'s `RequestReceipt`,
/// which likewise never removes itself from `pending_requests` on success).
pub struct RequestReceipt {
    pub request_id: [u8; 16],
    pub path: String,
    pub status: RequestStatus,
    pub progress: f64,
    pub response: Option<Vec<u8>>,
    pub response_metadata: Option<Vec<u8>>,
    pub sent_at: Instant,
    pub timeout: Duration,
    /// Set when `status` becomes `Ready`; `response_time()` is
    /// `response_concluded_at - sent_at`, per spec §8 scenario 6.
    pub response_concluded_at: Option<Instant>,
    pub(super) callbacks: RequestCallbacks,
}

impl RequestReceipt {
    /// `None` unless the request concluded successfully (spec §8 scenario 6;
    /// mirrors `RequestReceipt.get_response_time()` in the original).
    pub fn response_time(&self) -> Option<Duration> {
        if self.status != RequestStatus::Ready {
            return None;
        }
        self.response_concluded_at.map(|concluded| concluded.saturating_duration_since(self.sent_at))
    }
}

/// A handler that only needs the request's own fields.
pub trait RequestHandler: Send + Sync {
    fn handle(
        &self,
        path: &str,
        data: &[u8],
        request_id: [u8; 16],
        remote_identity: Option<&RemoteIdentity>,
        requested_at: f64,
    ) -> HandlerResponse;
}

/// A handler that also needs to address packets back through the Link
/// (spec §9: "model as two explicit handler variants").
pub trait RequestHandlerWithLink: Send + Sync {
    fn handle(
        &self,
        path: &str,
        data: &[u8],
        request_id: [u8; 16],
        link_id: crate::hash::LinkId,
        remote_identity: Option<&RemoteIdentity>,
        requested_at: f64,
    ) -> HandlerResponse;
}

/// Adapts a plain `RequestHandler` to the `RequestHandlerWithLink` contract
/// every Link actually stores, for applications that don't need `link_id`.
pub struct WithoutLink<H>(pub H);

impl<H: RequestHandler> RequestHandlerWithLink for WithoutLink<H> {
    fn handle(
        &self,
        path: &str,
        data: &[u8],
        request_id: [u8; 16],
        _link_id: crate::hash::LinkId,
        remote_identity: Option<&RemoteIdentity>,
        requested_at: f64,
    ) -> HandlerResponse {
        self.0.handle(path, data, request_id, remote_identity, requested_at)
    }
}

pub enum HandlerResponse {
    Inline(Vec<u8>),
    AsResource(Vec<u8>, Option<Vec<u8>>),
}

pub(super) struct RegisteredHandler {
    pub path: String,
    pub handler: Arc<dyn RequestHandlerWithLink>,
}

#[derive(Serialize, Deserialize)]
struct RequestFrame {
    timestamp: f64,
    path_hash: [u8; 16],
    data: ByteBuf,
}

#[derive(Serialize, Deserialize)]
struct ResponseFrame {
    request_id: [u8; 16],
    response: ByteBuf,
}

/// `request()` entry point (spec §4.4 steps 1-6).
pub async fn request(
    link: &Arc<Mutex<Link>>,
    path: &str,
    data: Vec<u8>,
    timeout: Option<Duration>,
    callbacks: RequestCallbacks,
) -> Result<[u8; 16], LinkError> {
    let mut guard = link.lock().await;
    guard.request_locked(path, data, timeout, callbacks)
}

impl Link {
    fn request_locked(
        &mut self,
        path: &str,
        data: Vec<u8>,
        timeout: Option<Duration>,
        callbacks: RequestCallbacks,
    ) -> Result<[u8; 16], LinkError> {
        if self.status != LinkStatus::Active {
            return Err(LinkError::Closed);
        }

        let path_hash = truncated_hash(path.as_bytes());
        let timestamp = self.seconds_since_creation();
        let frame = RequestFrame { timestamp, path_hash, data: ByteBuf::from(data) };
        let packed = rmp_serde::to_vec_named(&frame).map_err(|_| LinkError::PacketError)?;
        let request_id = truncated_hash(&packed);

        let rtt = self.rtt.unwrap_or(self.config.keepalive_min);
        let timeout = timeout.unwrap_or_else(|| {
            Duration::from_secs_f64(rtt * self.config.traffic_timeout_factor + self.config.response_max_grace * 1.125)
        });

        // An inline request stays SENT until the response arrives; one sent
        // as a resource advertisement is already DELIVERED the moment the
        // (unchunked, see module doc comment) transfer hits the wire, since
        // there's no further local hand-off to wait on.
        let status = if packed.len() <= self.mdu as usize {
            self.send_encrypted(PacketContext::Request, &packed);
            RequestStatus::Sent
        } else {
            self.send_resource_advertisement(&packed, false);
            RequestStatus::Delivered
        };

        let receipt = RequestReceipt {
            request_id,
            path: path.to_string(),
            status,
            progress: 0.0,
            response: None,
            response_metadata: None,
            sent_at: Instant::now(),
            timeout,
            response_concluded_at: None,
            callbacks,
        };
        self.pending_requests.insert(request_id, receipt);
        Ok(request_id)
    }

    /// Spec §8 scenario 6: the app needs to read back a concluded request's
    /// status and response time, not just learn about it via callback.
    pub fn request_status(&self, request_id: [u8; 16]) -> Option<RequestStatus> {
        self.pending_requests.get(&request_id).map(|receipt| receipt.status)
    }

    pub fn request_response_time(&self, request_id: [u8; 16]) -> Option<Duration> {
        self.pending_requests.get(&request_id).and_then(|receipt| receipt.response_time())
    }

    /// DATA/REQUEST handler (dispatch table row; spec §4.4 server-side).
    pub(super) fn handle_request_packet(&mut self, packet: InboundPacket) {
        let Some(token) = self.token.as_ref() else { return };
        let Ok(plaintext) = token.decrypt(&packet.data) else { return };
        self.dispatch_request_frame(plaintext);
    }

    /// Same server-side handling, entered from a resource advertisement
    /// instead of an inline DATA/REQUEST packet.
    pub(super) fn handle_inline_request(&mut self, plaintext: Vec<u8>) {
        self.dispatch_request_frame(plaintext);
    }

    fn dispatch_request_frame(&mut self, plaintext: Vec<u8>) {
        let request_id = truncated_hash(&plaintext);
        let Ok(frame) = rmp_serde::from_slice::<RequestFrame>(&plaintext) else { return };
        let Some(registered) = self.handlers.get(&frame.path_hash) else {
            log::debug!(target: "rns_link", "link {} has no handler for requested path", self.link_id);
            return;
        };
        if !self.allow_policy.permits(self.remote_identity.as_ref()) {
            log::warn!(target: "rns_link", "link {} request rejected by allow-policy", self.link_id);
            return;
        }

        let handler = registered.handler.clone();
        let path = registered.path.clone();
        let remote_identity = self.remote_identity;
        let response = handler.handle(
            &path,
            frame.data.as_ref(),
            request_id,
            self.link_id,
            remote_identity.as_ref(),
            frame.timestamp,
        );

        match response {
            HandlerResponse::Inline(bytes) => {
                let resp_frame = ResponseFrame { request_id, response: ByteBuf::from(bytes) };
                let Ok(packed) = rmp_serde::to_vec_named(&resp_frame) else { return };
                if packed.len() <= self.mdu as usize {
                    self.send_encrypted(PacketContext::Response, &packed);
                } else {
                    self.send_resource_advertisement(&packed, true);
                }
            }
            HandlerResponse::AsResource(bytes, _metadata) => {
                let resp_frame = ResponseFrame { request_id, response: ByteBuf::from(bytes) };
                let Ok(packed) = rmp_serde::to_vec_named(&resp_frame) else { return };
                self.send_resource_advertisement(&packed, true);
            }
        }
    }

    /// DATA/RESPONSE handler (dispatch table row; spec §4.4 client-side).
    pub(super) fn handle_response_packet(&mut self, packet: InboundPacket) {
        let Some(token) = self.token.as_ref() else { return };
        let Ok(plaintext) = token.decrypt(&packet.data) else { return };
        let Ok(frame) = rmp_serde::from_slice::<ResponseFrame>(&plaintext) else { return };
        self.conclude_request(frame.request_id, frame.response.into_vec());
    }

    /// Looks for a pending request whose id matches a resource
    /// advertisement tagged as a response, without consuming it.
    pub(super) fn response_request_id_for(&self, plaintext: &[u8]) -> Option<[u8; 16]> {
        let frame: ResponseFrame = rmp_serde::from_slice(plaintext).ok()?;
        self.pending_requests.contains_key(&frame.request_id).then_some(frame.request_id)
    }

    pub(super) fn complete_resource_response(&mut self, request_id: [u8; 16], plaintext: Vec<u8>) {
        let Ok(frame) = rmp_serde::from_slice::<ResponseFrame>(&plaintext) else { return };
        if let Some(receipt) = self.pending_requests.get_mut(&request_id) {
            receipt.status = RequestStatus::Receiving;
            receipt.callbacks.fire_progress(0.5);
        }
        self.conclude_request(request_id, frame.response.into_vec());
    }

    /// Stays in `pending_requests` once concluded so `request_status()` and
    /// `request_response_time()` can still observe it (see `RequestReceipt`'s
    /// doc comment) — only timeout/failure paths actually remove the entry.
    fn conclude_request(&mut self, request_id: [u8; 16], response: Vec<u8>) {
        let Some(receipt) = self.pending_requests.get_mut(&request_id) else { return };
        receipt.response = Some(response.clone());
        receipt.status = RequestStatus::Ready;
        receipt.progress = 1.0;
        receipt.response_concluded_at = Some(Instant::now());
        let callbacks = receipt.callbacks.clone();
        callbacks.fire_progress(1.0);
        callbacks.fire_response(response);
    }

    /// Sends the packed request/response bytes as a resource advertisement
    /// carrying the full payload inline (see module doc comment).
    fn send_resource_advertisement(&mut self, packed: &[u8], is_response: bool) {
        let hash = Hash::of(packed);
        if is_response {
            // nothing to track client-side for outgoing responses beyond
            // the handle, since this crate's resource layer is bookkeeping
            // only (§1 out of scope).
        } else {
            self.resources.track_outgoing(ResourceHandle {
                hash,
                link_id: self.link_id,
                is_response,
                request_id: None,
            });
        }
        self.send_encrypted(PacketContext::ResourceAdvertisement, packed);
    }

    /// Walks `pending_requests`, failing any whose deadline has passed. The
    /// watchdog calls this on every wake instead of each request owning a
    /// separate timer task (spec §4.4's "timeout callback on the packet
    /// receipt", collapsed onto the single per-Link timer agent).
    pub(super) fn expire_requests(&mut self, now: Instant) {
        let expired: Vec<[u8; 16]> = self
            .pending_requests
            .iter()
            .filter(|(_, receipt)| receipt.status != RequestStatus::Ready)
            .filter(|(_, receipt)| now.saturating_duration_since(receipt.sent_at) >= receipt.timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(receipt) = self.pending_requests.remove(&id) {
                log::debug!(target: "rns_link", "link {} request {:?} timed out", self.link_id, id);
                receipt.callbacks.fire_failed();
            }
        }
    }

    pub(super) fn next_request_deadline(&self) -> Option<Instant> {
        self.pending_requests
            .values()
            .filter(|r| r.status != RequestStatus::Ready)
            .map(|r| r.sent_at + r.timeout)
            .min()
    }
}
