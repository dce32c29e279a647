//! Outbound half of a sender key.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    chain::{KeyDomain, SymmetricRatchet},
    error::RatchetError,
    persist,
    primitives::{KEY_SIZE, NONCE_SIZE, SIGNATURE_SIZE, TAG_SIZE, aead_seal, ed25519_public, sign},
};

/// A signed group ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedGroupMessage {
    /// `nonce || ChaCha20-Poly1305 output`
    pub ciphertext: Vec<u8>,
    /// Ed25519 signature over `ciphertext`
    pub signature: [u8; SIGNATURE_SIZE],
    /// Chain index the message key was derived at
    pub message_index: u32,
}

impl EncryptedGroupMessage {
    /// Plaintext length (ciphertext minus nonce and tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(NONCE_SIZE + TAG_SIZE)
    }
}

/// Receive-side material for one sender key. Sent pairwise-encrypted to group
/// members, never broadcast.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderKeyExport {
    /// Chain key at `message_index`
    pub chain_key: [u8; KEY_SIZE],
    /// Ed25519 key the sender signs group messages with
    pub signing_public: [u8; KEY_SIZE],
    /// Index of the next message the sender will send
    pub message_index: u32,
    /// Rotation count of the sender key; a later rotation is never replaced
    /// by an earlier one
    pub generation: u32,
}

impl fmt::Debug for SenderKeyExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderKeyExport")
            .field("message_index", &self.message_index)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Drop for SenderKeyExport {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

/// One member's outbound ratchet and signing key for one group.
///
/// # Invariants
///
/// - The message index increases by one per encrypted message
/// - Rotation replaces the whole key; it is never rewound
/// - Each rotation bumps the generation by one
#[derive(Clone, Serialize, Deserialize)]
pub struct GroupSenderKey {
    ratchet: SymmetricRatchet,
    signing_seed: [u8; KEY_SIZE],
    signing_public: [u8; KEY_SIZE],
    #[serde(default)]
    generation: u32,
}

impl GroupSenderKey {
    /// Fresh sender key at index zero.
    ///
    /// Both seeds must come from a cryptographically secure source.
    pub fn generate(chain_seed: [u8; KEY_SIZE], signing_seed: [u8; KEY_SIZE]) -> Self {
        Self {
            ratchet: SymmetricRatchet::new(chain_seed, KeyDomain::Group),
            signing_public: ed25519_public(&signing_seed),
            signing_seed,
            generation: 0,
        }
    }

    /// Fresh key replacing this one, one generation later.
    #[must_use]
    pub fn rotate(&self, chain_seed: [u8; KEY_SIZE], signing_seed: [u8; KEY_SIZE]) -> Self {
        let mut next = Self::generate(chain_seed, signing_seed);
        next.generation = self.generation.saturating_add(1);
        next
    }

    /// Rotation count, zero for a key that was never rotated.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Index the next message will carry.
    pub fn message_index(&self) -> u32 {
        self.ratchet.index()
    }

    /// Ed25519 public key receivers verify against.
    pub fn signing_public(&self) -> &[u8; KEY_SIZE] {
        &self.signing_public
    }

    /// Encrypt and sign one group message, then advance the chain.
    ///
    /// `nonce` must be fresh random bytes; it is prefixed to the ciphertext.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        nonce: [u8; NONCE_SIZE],
    ) -> Result<EncryptedGroupMessage, RatchetError> {
        let message_key = self.ratchet.advance()?;

        let mut ciphertext = Vec::with_capacity(NONCE_SIZE + plaintext.len() + TAG_SIZE);
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&aead_seal(message_key.key(), &nonce, plaintext, &[]));

        let signature = sign(&self.signing_seed, &ciphertext);

        Ok(EncryptedGroupMessage { ciphertext, signature, message_index: message_key.index() })
    }

    /// Material a receiver needs to follow this chain from its current index.
    pub fn export_public(&self) -> SenderKeyExport {
        SenderKeyExport {
            chain_key: *self.ratchet.chain_key(),
            signing_public: self.signing_public,
            message_index: self.ratchet.index(),
            generation: self.generation,
        }
    }

    /// Opaque versioned blob.
    pub fn serialize(&self) -> Result<Vec<u8>, RatchetError> {
        persist::seal(self)
    }

    /// Restore from [`serialize()`](Self::serialize) output.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, RatchetError> {
        persist::open(bytes)
    }
}

impl Drop for GroupSenderKey {
    fn drop(&mut self) {
        self.signing_seed.zeroize();
    }
}

impl fmt::Debug for GroupSenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupSenderKey")
            .field("message_index", &self.message_index())
            .finish_non_exhaustive()
    }
}
