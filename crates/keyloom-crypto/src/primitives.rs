//! Stateless wrappers over X25519, Ed25519, HKDF-SHA256, HMAC-SHA256 and
//! ChaCha20-Poly1305.
//!
//! The domain-separation strings and the associated-data byte layout are part
//! of the wire contract. Changing any of them breaks interoperability with
//! peers without any visible version bump.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::RatchetError;

type HmacSha256 = Hmac<Sha256>;

/// Size of X25519 and Ed25519 public keys, and of all symmetric keys.
pub const KEY_SIZE: usize = 32;

/// Size of the ChaCha20-Poly1305 nonce.
pub const NONCE_SIZE: usize = 12;

/// Size of the Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

/// Size of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// HKDF info for the bootstrap shared secret.
pub const SESSION_INFO: &[u8] = b"keyloom-session-v1";

/// HKDF info for root-key / chain-key derivation on a DH ratchet step.
pub const ROOT_INFO: &[u8] = b"keyloom-root-v1";

/// HKDF info for pairwise message keys.
pub const PAIRWISE_MESSAGE_INFO: &[u8] = b"keyloom-pairwise-message-v1";

/// HKDF info for group message keys.
pub const GROUP_MESSAGE_INFO: &[u8] = b"keyloom-group-message-v1";

/// HMAC label for advancing a chain key.
pub const CHAIN_ADVANCE_LABEL: &[u8] = b"keyloom-chain-advance";

/// X25519 public key for a secret scalar.
pub fn x25519_public(secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let secret = StaticSecret::from(*secret);
    PublicKey::from(&secret).to_bytes()
}

/// X25519 Diffie-Hellman.
///
/// Rejects public keys that yield a non-contributory result (the all-zero key
/// and other low-order points).
pub fn diffie_hellman(
    secret: &[u8; KEY_SIZE],
    public: &[u8; KEY_SIZE],
) -> Result<[u8; KEY_SIZE], RatchetError> {
    let secret = StaticSecret::from(*secret);
    let shared = secret.diffie_hellman(&PublicKey::from(*public));
    if !shared.was_contributory() {
        return Err(RatchetError::InvalidPublicKey);
    }
    Ok(shared.to_bytes())
}

/// Expand `ikm` with HKDF-SHA256 into a fixed-size output.
fn hkdf_expand<const N: usize>(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; N] {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; N];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("outputs up to 255 * 32 bytes are valid for HKDF-SHA256");
    };
    okm
}

/// Derive the 32-byte session secret from the bootstrap DH output.
pub fn derive_shared_secret(dh_output: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    hkdf_expand(None, dh_output, SESSION_INFO)
}

/// Mix a DH output into the root key.
///
/// Returns `(next_root_key, chain_key)`.
pub fn kdf_root(
    root_key: &[u8; KEY_SIZE],
    dh_output: &[u8; KEY_SIZE],
) -> ([u8; KEY_SIZE], [u8; KEY_SIZE]) {
    let mut okm: [u8; 2 * KEY_SIZE] = hkdf_expand(Some(root_key), dh_output, ROOT_INFO);

    let mut root = [0u8; KEY_SIZE];
    let mut chain = [0u8; KEY_SIZE];
    root.copy_from_slice(&okm[..KEY_SIZE]);
    chain.copy_from_slice(&okm[KEY_SIZE..]);
    okm.zeroize();

    (root, chain)
}

/// Derive AEAD key and nonce for one message from a chain key.
pub fn derive_message_material(
    chain_key: &[u8; KEY_SIZE],
    info: &[u8],
) -> ([u8; KEY_SIZE], [u8; NONCE_SIZE]) {
    let mut okm: [u8; KEY_SIZE + NONCE_SIZE] = hkdf_expand(None, chain_key, info);

    let mut key = [0u8; KEY_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    key.copy_from_slice(&okm[..KEY_SIZE]);
    nonce.copy_from_slice(&okm[KEY_SIZE..]);
    okm.zeroize();

    (key, nonce)
}

/// One-way chain advance: `HMAC-SHA256(chain_key, CHAIN_ADVANCE_LABEL)`.
pub fn advance_chain_key(chain_key: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(chain_key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(CHAIN_ADVANCE_LABEL);
    let result = mac.finalize().into_bytes();

    let mut next = [0u8; KEY_SIZE];
    next.copy_from_slice(&result);
    next
}

/// Associated data bound to every pairwise ciphertext.
///
/// Layout: `len(constant) as u32 BE || constant || ratchet_public ||
/// previous_chain_length BE || chain_length BE`.
pub fn build_associated_data(
    constant: &[u8],
    ratchet_public: &[u8; KEY_SIZE],
    previous_chain_length: u32,
    chain_length: u32,
) -> Vec<u8> {
    let mut ad = Vec::with_capacity(4 + constant.len() + KEY_SIZE + 8);
    ad.extend_from_slice(&(constant.len() as u32).to_be_bytes());
    ad.extend_from_slice(constant);
    ad.extend_from_slice(ratchet_public);
    ad.extend_from_slice(&previous_chain_length.to_be_bytes());
    ad.extend_from_slice(&chain_length.to_be_bytes());
    ad
}

/// ChaCha20-Poly1305 encryption. Output includes the 16-byte tag.
pub fn aead_seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    associated_data: &[u8],
) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let payload = Payload { msg: plaintext, aad: associated_data };
    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(nonce), payload) else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };
    ciphertext
}

/// ChaCha20-Poly1305 decryption.
pub fn aead_open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, RatchetError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let payload = Payload { msg: ciphertext, aad: associated_data };
    cipher.decrypt(Nonce::from_slice(nonce), payload).map_err(|_| RatchetError::DecryptionFailure)
}

/// Ed25519 verifying key for a signing seed.
pub fn ed25519_public(signing_seed: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    SigningKey::from_bytes(signing_seed).verifying_key().to_bytes()
}

/// Ed25519 signature over `message`.
pub fn sign(signing_seed: &[u8; KEY_SIZE], message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    SigningKey::from_bytes(signing_seed).sign(message).to_bytes()
}

/// Check that `public` is a well-formed Ed25519 verifying key.
pub fn validate_ed25519_public(public: &[u8; KEY_SIZE]) -> Result<(), RatchetError> {
    VerifyingKey::from_bytes(public).map(|_| ()).map_err(|_| RatchetError::InvalidPublicKey)
}

/// Strict Ed25519 verification.
pub fn verify(
    public: &[u8; KEY_SIZE],
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), RatchetError> {
    let key = VerifyingKey::from_bytes(public).map_err(|_| RatchetError::InvalidPublicKey)?;
    let signature = Signature::from_bytes(signature);
    key.verify_strict(message, &signature).map_err(|_| RatchetError::InvalidSignature)
}
