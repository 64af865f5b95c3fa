//! Channel (in-order reliable messaging) is out of scope (§1); the Link only
//! needs somewhere to hand decrypted CHANNEL-context payloads.

/// Ordering and reliability belong to the Channel implementation, not Link.
pub trait ChannelSink: Send + Sync {
    fn deliver(&self, plaintext: &[u8]);
}
