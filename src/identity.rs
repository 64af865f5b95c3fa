//! The Identity/cryptography primitives are an external collaborator (§1);
//! this module gives Link the narrow contract it needs to compile and be
//! unit-testable against a fake, per the Design Notes' "model globals as an
//! explicit dependency" guidance.

use std::collections::HashSet;

use crate::crypto::{ED25519_PUB_SIZE, X25519_PUB_SIZE};
use crate::hash::AddressHash;

/// A destination's long-term key material. The responder signs LRPROOF
/// with `sign_key`, never with an ephemeral key — see spec §4.1.
pub trait LongTermIdentity: Send + Sync {
    fn verifying_key_bytes(&self) -> [u8; ED25519_PUB_SIZE];
    fn sign(&self, message: &[u8]) -> [u8; 64];
    fn dh_public_bytes(&self) -> [u8; X25519_PUB_SIZE];
    fn address_hash(&self) -> AddressHash;
}

/// An initiator's identity, disclosed unilaterally via the `identify`
/// sub-protocol (spec §4.5). Only present if the initiator chose to prove
/// it; the Link never requires or requests it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub public: [u8; ED25519_PUB_SIZE],
    pub hash: AddressHash,
}

impl RemoteIdentity {
    pub fn from_public(public: [u8; ED25519_PUB_SIZE]) -> Self {
        Self { public, hash: AddressHash::truncated_from(&public) }
    }
}

/// Supplements spec §4.4's "enforce allow-policy" sentence with a concrete
/// type: ALLOW_NONE rejects, ALLOW_LIST accepts only known identities,
/// ALLOW_ALL accepts everyone.
#[derive(Debug, Clone)]
pub enum AllowPolicy {
    AllowNone,
    AllowList(HashSet<AddressHash>),
    AllowAll,
}

impl AllowPolicy {
    pub fn permits(&self, remote: Option<&RemoteIdentity>) -> bool {
        match self {
            AllowPolicy::AllowNone => false,
            AllowPolicy::AllowAll => true,
            AllowPolicy::AllowList(allowed) => {
                remote.map(|r| allowed.contains(&r.hash)).unwrap_or(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_none_rejects_everyone() {
        let identity = RemoteIdentity::from_public([1u8; ED25519_PUB_SIZE]);
        assert!(!AllowPolicy::AllowNone.permits(Some(&identity)));
        assert!(!AllowPolicy::AllowNone.permits(None));
    }

    #[test]
    fn allow_all_accepts_everyone() {
        assert!(AllowPolicy::AllowAll.permits(None));
    }

    #[test]
    fn allow_list_checks_membership() {
        let identity = RemoteIdentity::from_public([2u8; ED25519_PUB_SIZE]);
        let mut set = HashSet::new();
        set.insert(identity.hash);
        let policy = AllowPolicy::AllowList(set);
        assert!(policy.permits(Some(&identity)));

        let other = RemoteIdentity::from_public([3u8; ED25519_PUB_SIZE]);
        assert!(!policy.permits(Some(&other)));
        assert!(!policy.permits(None));
    }
}
