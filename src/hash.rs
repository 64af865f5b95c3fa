use core::fmt;
use sha2::{Digest, Sha256};

pub const HASH_SIZE: usize = 32;
pub const ADDRESS_HASH_SIZE: usize = 16;

/// Full SHA-256 digest, used for resource and request hashes.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// 128-bit truncated hash used to address destinations and links.
///
/// Link IDs are truncated `AddressHash`es (the low 16 bytes of a SHA-256
/// digest over the hashable portion of the originating LINKREQUEST packet).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct AddressHash([u8; ADDRESS_HASH_SIZE]);

impl AddressHash {
    pub const fn new(bytes: [u8; ADDRESS_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn truncated_from(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; ADDRESS_HASH_SIZE];
        out.copy_from_slice(&digest[..ADDRESS_HASH_SIZE]);
        Self(out)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressHash({})", hex::encode(self.0))
    }
}

impl fmt::Display for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", hex::encode(self.0))
    }
}

/// A `LinkId` is an `AddressHash` with a narrower meaning: it identifies one
/// circuit, never a destination. Kept as a type alias (rather than a
/// newtype) since it is used interchangeably with `AddressHash` as a
/// transport routing key — see `transport::LinkTable` in the wider stack.
pub type LinkId = AddressHash;

/// Truncated hash over arbitrary request/response payloads (path hashes,
/// request ids). Half the width of `AddressHash` per the wire format in
/// spec §6 (`bytes16` request ids use the full 16 bytes; path hashes reuse
/// the same truncation).
pub fn truncated_hash(data: &[u8]) -> [u8; ADDRESS_HASH_SIZE] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; ADDRESS_HASH_SIZE];
    out.copy_from_slice(&digest[..ADDRESS_HASH_SIZE]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_hash_is_deterministic() {
        let a = truncated_hash(b"hello");
        let b = truncated_hash(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn address_hash_display_is_hex() {
        let h = AddressHash::truncated_from(b"world");
        let s = format!("{}", h);
        assert!(s.starts_with('<') && s.ends_with('>'));
        assert_eq!(s.len(), 2 + ADDRESS_HASH_SIZE * 2);
    }
}
