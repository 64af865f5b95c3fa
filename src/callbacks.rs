//! Application hooks. Every callback is dispatched on a detached task so a
//! slow or panicking application handler can never stall the ingress path
//! (§5, §7 item 7) — mirrors the wider stack's habit of firing app-facing
//! events from `tokio::spawn`-ed tasks rather than inline in the packet path.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::identity::RemoteIdentity;

/// Runs `f` on a detached task, converting a panic into a logged error
/// instead of letting it take down the caller. `f` itself stays synchronous;
/// callers that need async work should spawn their own task from inside it.
pub fn spawn_callback<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            log::error!(target: "rns_link", "application callback panicked");
        }
    });
}

pub type PacketCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
pub type ResourceCallback = Arc<dyn Fn() + Send + Sync>;
pub type LinkEventCallback = Arc<dyn Fn() + Send + Sync>;
pub type LinkClosedCallback = Arc<dyn Fn(ClosedReason) + Send + Sync>;
pub type RemoteIdentifiedCallback = Arc<dyn Fn(RemoteIdentity) + Send + Sync>;
pub type ResourceAcceptCallback = Arc<dyn Fn(Vec<u8>) -> bool + Send + Sync>;

/// Optional application hooks a `Link` fires over its lifetime. Every slot is
/// `None` by default; unset hooks are simply skipped.
#[derive(Clone, Default)]
pub struct LinkCallbacks {
    pub link_established: Option<LinkEventCallback>,
    pub link_closed: Option<LinkClosedCallback>,
    pub packet: Option<PacketCallback>,
    pub resource: Option<ResourceAcceptCallback>,
    pub resource_started: Option<ResourceCallback>,
    pub resource_concluded: Option<ResourceCallback>,
    pub remote_identified: Option<RemoteIdentifiedCallback>,
}

impl LinkCallbacks {
    pub fn fire_link_established(&self) {
        if let Some(cb) = self.link_established.clone() {
            spawn_callback(move || cb());
        }
    }

    /// Spec §7: the app must learn *why* a Link closed, not just that it did.
    pub fn fire_link_closed(&self, reason: ClosedReason) {
        if let Some(cb) = self.link_closed.clone() {
            spawn_callback(move || cb(reason));
        }
    }

    pub fn fire_packet(&self, data: Vec<u8>) {
        if let Some(cb) = self.packet.clone() {
            spawn_callback(move || cb(data));
        }
    }

    pub fn fire_remote_identified(&self, identity: RemoteIdentity) {
        if let Some(cb) = self.remote_identified.clone() {
            spawn_callback(move || cb(identity));
        }
    }

    /// Gates an `AcceptApp` resource advertisement. Unlike the other
    /// `fire_*` methods this can't run on a detached task — the dispatcher
    /// needs the verdict before it decides whether to process the
    /// advertisement at all. An unset callback rejects (spec §6: ACCEPT_APP
    /// with no app decision means nothing is ever accepted).
    pub fn fire_resource(&self, advertisement: Vec<u8>) -> bool {
        match self.resource.as_ref() {
            Some(cb) => cb(advertisement),
            None => false,
        }
    }

    pub fn fire_resource_started(&self) {
        if let Some(cb) = self.resource_started.clone() {
            spawn_callback(move || cb());
        }
    }

    pub fn fire_resource_concluded(&self) {
        if let Some(cb) = self.resource_concluded.clone() {
            spawn_callback(move || cb());
        }
    }
}

pub type ResponseCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
pub type FailedCallback = Arc<dyn Fn() + Send + Sync>;
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Per-`RequestReceipt` application hooks.
#[derive(Clone, Default)]
pub struct RequestCallbacks {
    pub response: Option<ResponseCallback>,
    pub failed: Option<FailedCallback>,
    pub progress: Option<ProgressCallback>,
}

impl RequestCallbacks {
    pub fn fire_response(&self, data: Vec<u8>) {
        if let Some(cb) = self.response.clone() {
            spawn_callback(move || cb(data));
        }
    }

    pub fn fire_failed(&self) {
        if let Some(cb) = self.failed.clone() {
            spawn_callback(move || cb());
        }
    }

    pub fn fire_progress(&self, progress: f64) {
        if let Some(cb) = self.progress.clone() {
            spawn_callback(move || cb(progress));
        }
    }
}

/// Tags a closed Link with who initiated teardown, for the `link_closed`
/// callback's reason code (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    Timeout,
    InitiatorClosed,
    DestinationClosed,
}
