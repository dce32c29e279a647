//! Symmetric hash ratchet for forward-secure message key derivation.
//!
//! # Security Properties
//!
//! - Forward Secrecy: Old chain keys are overwritten when advancing
//! - Key Uniqueness: Each index produces a unique message key
//! - Determinism: Same seed always produces same key sequence

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    error::RatchetError,
    primitives::{
        GROUP_MESSAGE_INFO, KEY_SIZE, NONCE_SIZE, PAIRWISE_MESSAGE_INFO, advance_chain_key,
        derive_message_material,
    },
};

/// Which message-key domain string a chain derives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyDomain {
    /// Pairwise double-ratchet chains
    Pairwise,
    /// Group sender-key chains
    Group,
}

impl KeyDomain {
    fn info(self) -> &'static [u8] {
        match self {
            Self::Pairwise => PAIRWISE_MESSAGE_INFO,
            Self::Group => GROUP_MESSAGE_INFO,
        }
    }
}

/// A message key derived from the ratchet.
///
/// Used for a single encryption or decryption, then discarded.
#[derive(Clone, Serialize, Deserialize)]
pub struct MessageKey {
    key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
    index: u32,
}

impl MessageKey {
    /// 32-byte ChaCha20-Poly1305 key.
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Derived nonce. Group messages use a random nonce instead.
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Chain index this key was derived at.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
        self.nonce.zeroize();
    }
}

/// Forward-secure symmetric ratchet.
///
/// Each [`advance()`](Self::advance) call derives the message key for the
/// current index, replaces the chain key with its one-way successor and
/// increments the index.
#[derive(Clone, Serialize, Deserialize)]
pub struct SymmetricRatchet {
    chain_key: [u8; KEY_SIZE],
    index: u32,
    domain: KeyDomain,
}

impl SymmetricRatchet {
    /// Ratchet starting at index 0.
    pub fn new(seed: [u8; KEY_SIZE], domain: KeyDomain) -> Self {
        Self::at_index(seed, 0, domain)
    }

    /// Ratchet whose `chain_key` belongs to `index`.
    ///
    /// Used when importing a distributed sender key mid-chain.
    pub fn at_index(chain_key: [u8; KEY_SIZE], index: u32, domain: KeyDomain) -> Self {
        Self { chain_key, index, domain }
    }

    /// Index of the next key [`advance()`](Self::advance) will return.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current chain key. Exported for sender-key distribution.
    pub fn chain_key(&self) -> &[u8; KEY_SIZE] {
        &self.chain_key
    }

    /// Message-key domain of this chain.
    pub fn domain(&self) -> KeyDomain {
        self.domain
    }

    /// Derive the key for the current index and step the chain.
    pub fn advance(&mut self) -> Result<MessageKey, RatchetError> {
        if self.index == u32::MAX {
            return Err(RatchetError::ChainExhausted);
        }

        let (key, nonce) = derive_message_material(&self.chain_key, self.domain.info());
        let next_chain_key = advance_chain_key(&self.chain_key);

        self.chain_key.zeroize();
        self.chain_key = next_chain_key;

        let index = self.index;
        self.index += 1;

        Ok(MessageKey { key, nonce, index })
    }

    /// Step the chain up to (not including) `target`, returning every key
    /// passed on the way.
    ///
    /// Nothing is mutated when the request is rejected.
    ///
    /// # Errors
    ///
    /// - `DuplicateOrStaleMessage` if `target` is behind the chain
    /// - `SkipTooFar` if more than `max_skip` keys would be derived
    pub fn skip_to(&mut self, target: u32, max_skip: u32) -> Result<Vec<MessageKey>, RatchetError> {
        if target < self.index {
            return Err(RatchetError::DuplicateOrStaleMessage { index: target });
        }

        let distance = target - self.index;
        if distance > max_skip {
            return Err(RatchetError::SkipTooFar { current: self.index, requested: target, max_skip });
        }

        let mut skipped = Vec::with_capacity(distance as usize);
        while self.index < target {
            skipped.push(self.advance()?);
        }

        Ok(skipped)
    }
}

impl Drop for SymmetricRatchet {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}
