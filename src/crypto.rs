//! Crypto adapter: wraps X25519 DH, Ed25519 sign/verify, HKDF, and the
//! AEAD token used to encrypt every packet carried over an established
//! Link. Grounded on the wider stack's `crypt::fernet::Fernet` token, minus
//! the version/timestamp fields that token strips for the same reason
//! Reticulum does: they leak initiator metadata and cost bytes nobody
//! reads.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{CryptoRng, OsRng, RngCore};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::LinkError;
use crate::hash::LinkId;

type AesCbcEnc = cbc::Encryptor<aes::Aes256>;
type AesCbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const AES_KEY_SIZE: usize = 32;
const IV_SIZE: usize = 16;
const HMAC_SIZE: usize = 32;
pub const TOKEN_OVERHEAD: usize = IV_SIZE + HMAC_SIZE;
pub const AES_BLOCK_SIZE: usize = 16;

pub const ECPUBSIZE: usize = 64;
pub const X25519_PUB_SIZE: usize = 32;
pub const ED25519_PUB_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

/// Negotiated cipher suite. Only `Aes256Cbc` is enabled; every other 3-bit
/// codepoint on the wire is a reserved value that must be rejected during
/// both request and proof validation (spec Design Notes: "keep the codec
/// extensible, reject unknown modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Aes256Cbc,
}

impl Mode {
    pub fn from_wire(code: u8) -> Result<Self, LinkError> {
        match code {
            0 => Ok(Mode::Aes256Cbc),
            _ => Err(LinkError::UnsupportedMode),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Mode::Aes256Cbc => 0,
        }
    }

    /// HKDF output length for this mode: 32 bytes for a would-be AES-128
    /// variant, 64 for AES-256 (32 sign + 32 encrypt).
    pub fn key_length(self) -> usize {
        match self {
            Mode::Aes256Cbc => 64,
        }
    }
}

/// An ephemeral (or, for the responder's long-term reuse, persistent)
/// X25519 keypair.
pub struct DhKeypair {
    // `x25519_dalek::StaticSecret` zeroizes its scalar on drop.
    secret: x25519_dalek::StaticSecret,
    public: x25519_dalek::PublicKey,
}

impl DhKeypair {
    pub fn generate<R: RngCore + CryptoRng>(mut rng: R) -> Self {
        let secret = x25519_dalek::StaticSecret::random_from_rng(&mut rng);
        let public = x25519_dalek::PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn generate_os_rng() -> Self {
        Self::generate(OsRng)
    }

    pub fn public_bytes(&self) -> [u8; X25519_PUB_SIZE] {
        *self.public.as_bytes()
    }

    pub fn diffie_hellman(&self, peer_public: &[u8; X25519_PUB_SIZE]) -> SharedSecret {
        let peer = x25519_dalek::PublicKey::from(*peer_public);
        SharedSecret(self.secret.diffie_hellman(&peer).to_bytes())
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

/// An Ed25519 keypair. The initiator generates one ephemerally purely as
/// handshake entropy (see spec §9 Open Question — its public key rides in
/// the LINKREQUEST but is never used as `peer_sig_pub` by either side); the
/// responder signs LRPROOF with its long-term identity key instead of an
/// ephemeral one.
pub struct SigningKeypair {
    // `ed25519_dalek::SigningKey` zeroizes its secret bytes on drop.
    signing: SigningKey,
}

impl SigningKeypair {
    pub fn generate<R: RngCore + CryptoRng>(mut rng: R) -> Self {
        Self { signing: SigningKey::generate(&mut rng) }
    }

    pub fn generate_os_rng() -> Self {
        Self::generate(OsRng)
    }

    pub fn verifying_bytes(&self) -> [u8; ED25519_PUB_SIZE] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

pub fn verify_signature(
    verifying_key_bytes: &[u8; ED25519_PUB_SIZE],
    message: &[u8],
    signature_bytes: &[u8; SIGNATURE_SIZE],
) -> Result<(), LinkError> {
    let verifying_key =
        VerifyingKey::from_bytes(verifying_key_bytes).map_err(|_| LinkError::CryptoError)?;
    let signature = Signature::from_bytes(signature_bytes);
    verifying_key.verify(message, &signature).map_err(|_| LinkError::IncorrectSignature)
}

/// Derived symmetric key material: `sign_key` for the HMAC tag, `enc_key`
/// for AES-CBC, split from a single HKDF expansion the way the underlying
/// Fernet construction does.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct LinkKey {
    sign_key: [u8; AES_KEY_SIZE],
    enc_key: [u8; AES_KEY_SIZE],
}

/// `HKDF(salt = link_id, ikm = shared_secret, info = "") -> LinkKey`.
pub fn derive_link_key(shared: &SharedSecret, salt: &LinkId, mode: Mode) -> LinkKey {
    let hk = Hkdf::<Sha256>::new(Some(salt.as_slice()), &shared.0);
    let mut okm = vec![0u8; mode.key_length()];
    // HKDF-Sha256 output is bounded by 255*32 bytes; 64 is always valid.
    hk.expand(&[], &mut okm).expect("hkdf expand within valid range");
    let mut sign_key = [0u8; AES_KEY_SIZE];
    let mut enc_key = [0u8; AES_KEY_SIZE];
    sign_key.copy_from_slice(&okm[..AES_KEY_SIZE]);
    enc_key.copy_from_slice(&okm[AES_KEY_SIZE..AES_KEY_SIZE * 2]);
    LinkKey { sign_key, enc_key }
}

/// AES-256-CBC + HMAC-SHA256 AEAD token. The token owns its key but not any
/// nonce state across calls — each `encrypt` draws a fresh random IV, which
/// is why callers (the `Link`) must serialize concurrent encrypt/decrypt
/// calls the same way the underlying Fernet token requires (spec §5).
pub struct AeadToken {
    key: LinkKey,
}

impl AeadToken {
    pub fn new(key: LinkKey) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut rng = OsRng;
        let mut iv = [0u8; IV_SIZE];
        rng.fill_bytes(&mut iv);

        let padded_len =
            (plaintext.len() / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE;
        let mut buf = vec![0u8; padded_len];
        let ciphertext_len = AesCbcEnc::new(&self.key.enc_key.into(), &iv.into())
            .encrypt_padded_b2b_mut::<Pkcs7>(plaintext, &mut buf)
            .expect("buffer sized for padded ciphertext")
            .len();
        buf.truncate(ciphertext_len);

        let mut out = Vec::with_capacity(IV_SIZE + ciphertext_len + HMAC_SIZE);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key.sign_key)
            .expect("hmac accepts any key length");
        mac.update(&out);
        out.extend_from_slice(&mac.finalize().into_bytes());

        out
    }

    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, LinkError> {
        if token.len() <= TOKEN_OVERHEAD {
            return Err(LinkError::CryptoError);
        }
        let tag_start = token.len() - HMAC_SIZE;
        let (signed, expected_tag) = token.split_at(tag_start);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key.sign_key)
            .expect("hmac accepts any key length");
        mac.update(signed);
        mac.verify_slice(expected_tag).map_err(|_| LinkError::CryptoError)?;

        let iv: [u8; IV_SIZE] =
            signed[..IV_SIZE].try_into().map_err(|_| LinkError::CryptoError)?;
        let ciphertext = &signed[IV_SIZE..];

        let mut buf = ciphertext.to_vec();
        let plaintext_len = AesCbcDec::new(&self.key.enc_key.into(), &iv.into())
            .decrypt_padded_b2b_mut::<Pkcs7>(ciphertext, &mut buf)
            .map_err(|_| LinkError::CryptoError)?
            .len();
        buf.truncate(plaintext_len);
        Ok(buf)
    }
}
