//! End-to-end encrypted, mutually-verified virtual circuit (Link) for a
//! Reticulum-style mesh stack. See `link` for the central `Link` type.

pub mod callbacks;
pub mod channel;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod identity;
pub mod link;
pub mod packet;
pub mod resource;
pub mod signalling;
pub mod transport;

pub use callbacks::{ClosedReason, LinkCallbacks, RequestCallbacks};
pub use config::LinkConfig;
pub use error::LinkError;
pub use hash::{AddressHash, Hash, LinkId};
pub use identity::{AllowPolicy, LongTermIdentity, RemoteIdentity};
pub use link::{
    identify, receive, request, spawn_watchdog, teardown, HandlerResponse, Link, LinkStatus,
    RequestHandler, RequestHandlerWithLink, RequestReceipt, RequestStatus,
};
pub use resource::{ResourceSink, ResourceStrategy};
pub use transport::Transport;
