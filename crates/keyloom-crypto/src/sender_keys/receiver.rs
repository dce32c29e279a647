//! Inbound mirror of a remote member's sender key.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::sender::{EncryptedGroupMessage, SenderKeyExport};
use crate::{
    chain::{KeyDomain, SymmetricRatchet},
    error::RatchetError,
    persist,
    primitives::{KEY_SIZE, NONCE_SIZE, TAG_SIZE, aead_open, validate_ed25519_public, verify},
    skipped::{SkipLimits, SkippedKeys},
};

/// Receive side of one (group, remote sender) chain.
///
/// # Invariants
///
/// - The chain index only moves forward
/// - A cached skipped key is consumed at most once, then removed
/// - The cache never holds more than `max_retained` keys after a decrypt
#[derive(Clone, Serialize, Deserialize)]
pub struct GroupSenderKeyReceiver {
    ratchet: SymmetricRatchet,
    signing_public: [u8; KEY_SIZE],
    #[serde(default)]
    generation: u32,
    skipped: SkippedKeys<u32>,
    #[serde(skip)]
    limits: SkipLimits,
}

impl GroupSenderKeyReceiver {
    /// Build a receiver from distributed sender-key material.
    pub fn from_public_export(export: &SenderKeyExport) -> Result<Self, RatchetError> {
        validate_ed25519_public(&export.signing_public)?;

        Ok(Self {
            ratchet: SymmetricRatchet::at_index(
                export.chain_key,
                export.message_index,
                KeyDomain::Group,
            ),
            signing_public: export.signing_public,
            generation: export.generation,
            skipped: SkippedKeys::new(),
            limits: SkipLimits::default(),
        })
    }

    /// Override skip-ahead limits. Not persisted.
    #[must_use]
    pub fn with_skip_limits(mut self, limits: SkipLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Index of the next in-order message.
    pub fn message_index(&self) -> u32 {
        self.ratchet.index()
    }

    /// Ed25519 key messages must be signed with.
    pub fn signing_public(&self) -> &[u8; KEY_SIZE] {
        &self.signing_public
    }

    /// Generation of the sender key this receiver follows.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of cached skipped keys.
    pub fn skipped_len(&self) -> usize {
        self.skipped.len()
    }

    /// Verify, resolve the message key by index, and decrypt.
    ///
    /// The signature is checked before any key is derived. Skip-ahead
    /// advances the chain and fills the cache even if the final AEAD check
    /// fails; callers must persist the receiver after every attempt so a
    /// replay of a consumed index is rejected.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the signature does not verify
    /// - `DuplicateOrStaleMessage` if the index was already consumed
    /// - `SkipTooFar` if the index is beyond the skip cap
    /// - `DecryptionFailure` if authentication fails
    pub fn decrypt(&mut self, message: &EncryptedGroupMessage) -> Result<Vec<u8>, RatchetError> {
        verify(&self.signing_public, &message.ciphertext, &message.signature)?;

        if message.ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(RatchetError::DecryptionFailure);
        }

        let index = message.message_index;
        let message_key = if index < self.ratchet.index() {
            self.skipped.take(&index).ok_or(RatchetError::DuplicateOrStaleMessage { index })?
        } else {
            for key in self.ratchet.skip_to(index, self.limits.max_skip)? {
                self.skipped.insert(key.index(), key);
            }
            let key = self.ratchet.advance()?;
            self.skipped.prune(self.limits.max_retained);
            key
        };

        let (nonce, body) = message.ciphertext.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        aead_open(message_key.key(), &nonce_bytes, body, &[])
    }

    /// Opaque versioned blob.
    pub fn serialize(&self) -> Result<Vec<u8>, RatchetError> {
        persist::seal(self)
    }

    /// Restore from [`serialize()`](Self::serialize) output with default
    /// limits.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, RatchetError> {
        persist::open(bytes)
    }
}

impl fmt::Debug for GroupSenderKeyReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupSenderKeyReceiver")
            .field("message_index", &self.message_index())
            .field("skipped", &self.skipped_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender_keys::GroupSenderKey;

    fn pair() -> (GroupSenderKey, GroupSenderKeyReceiver) {
        let sender = GroupSenderKey::generate([3u8; 32], [4u8; 32]);
        let receiver = GroupSenderKeyReceiver::from_public_export(&sender.export_public()).unwrap();
        (sender, receiver)
    }

    #[test]
    fn in_order_roundtrip() {
        let (mut sender, mut receiver) = pair();

        for i in 0..5u8 {
            let message = sender.encrypt(&[i; 10], [i; 12]).unwrap();
            assert_eq!(receiver.decrypt(&message).unwrap(), vec![i; 10]);
        }
        assert_eq!(receiver.message_index(), 5);
        assert_eq!(receiver.skipped_len(), 0);
    }

    #[test]
    fn out_of_order_0_2_3_1() {
        let (mut sender, mut receiver) = pair();
        let messages: Vec<_> =
            (0..4u8).map(|i| sender.encrypt(&[i], [i; 12]).unwrap()).collect();

        for &i in &[0usize, 2, 3, 1] {
            assert_eq!(receiver.decrypt(&messages[i]).unwrap(), vec![i as u8]);
        }
        assert_eq!(receiver.skipped_len(), 0);
    }

    #[test]
    fn duplicate_is_rejected() {
        let (mut sender, mut receiver) = pair();
        let message = sender.encrypt(b"once", [0u8; 12]).unwrap();

        receiver.decrypt(&message).unwrap();
        assert_eq!(
            receiver.decrypt(&message).err(),
            Some(RatchetError::DuplicateOrStaleMessage { index: 0 })
        );
    }

    #[test]
    fn skipped_key_consumed_once() {
        let (mut sender, mut receiver) = pair();
        let m0 = sender.encrypt(b"zero", [0u8; 12]).unwrap();
        let m1 = sender.encrypt(b"one", [1u8; 12]).unwrap();

        receiver.decrypt(&m1).unwrap();
        receiver.decrypt(&m0).unwrap();
        assert!(matches!(
            receiver.decrypt(&m0),
            Err(RatchetError::DuplicateOrStaleMessage { index: 0 })
        ));
    }

    #[test]
    fn skip_beyond_cap_fails() {
        let (_, mut receiver) = pair();
        let mut sender = GroupSenderKey::generate([3u8; 32], [4u8; 32]);
        let mut message = None;
        for _ in 0..=1500 {
            message = Some(sender.encrypt(b"far", [0u8; 12]).unwrap());
        }

        let result = receiver.decrypt(&message.unwrap());
        assert!(matches!(
            result,
            Err(RatchetError::SkipTooFar { current: 0, requested: 1500, max_skip: 1000 })
        ));
        assert_eq!(receiver.message_index(), 0);
    }

    #[test]
    fn skip_ahead_prunes_cache() {
        let (mut sender, receiver) = pair();
        let mut receiver =
            receiver.with_skip_limits(SkipLimits { max_skip: 1000, max_retained: 10 });

        let mut last = None;
        for _ in 0..50 {
            last = Some(sender.encrypt(b"x", [0u8; 12]).unwrap());
        }
        receiver.decrypt(&last.unwrap()).unwrap();

        assert_eq!(receiver.skipped_len(), 10);
        assert_eq!(receiver.message_index(), 50);
    }

    #[test]
    fn pruned_index_is_stale() {
        let (mut sender, receiver) = pair();
        let mut receiver = receiver.with_skip_limits(SkipLimits { max_skip: 1000, max_retained: 2 });

        let messages: Vec<_> = (0..6u8).map(|i| sender.encrypt(&[i], [i; 12]).unwrap()).collect();
        receiver.decrypt(&messages[5]).unwrap();

        assert!(matches!(
            receiver.decrypt(&messages[0]),
            Err(RatchetError::DuplicateOrStaleMessage { index: 0 })
        ));
        assert_eq!(receiver.decrypt(&messages[4]).unwrap(), vec![4]);
    }

    #[test]
    fn tampered_signature_fails_before_decrypt() {
        let (mut sender, mut receiver) = pair();
        let mut message = sender.encrypt(b"hello", [0u8; 12]).unwrap();
        message.signature[0] ^= 0x01;

        assert_eq!(receiver.decrypt(&message).err(), Some(RatchetError::InvalidSignature));
        assert_eq!(receiver.message_index(), 0);
    }

    #[test]
    fn tampered_ciphertext_fails_signature() {
        let (mut sender, mut receiver) = pair();
        let mut message = sender.encrypt(b"hello", [0u8; 12]).unwrap();
        let last = message.ciphertext.len() - 1;
        message.ciphertext[last] ^= 0x80;

        assert_eq!(receiver.decrypt(&message).err(), Some(RatchetError::InvalidSignature));
    }

    #[test]
    fn rotated_key_is_rejected_until_imported() {
        let (_, mut receiver) = pair();
        let mut rotated = GroupSenderKey::generate([5u8; 32], [6u8; 32]);
        let export = rotated.export_public();
        let message = rotated.encrypt(b"post-rotation", [0u8; 12]).unwrap();

        assert_eq!(receiver.decrypt(&message).err(), Some(RatchetError::InvalidSignature));

        let mut fresh = GroupSenderKeyReceiver::from_public_export(&export).unwrap();
        assert_eq!(fresh.decrypt(&message).unwrap(), b"post-rotation");
        assert_eq!(fresh.generation(), 0);
    }

    #[test]
    fn generation_survives_serialization() {
        let rotated = GroupSenderKey::generate([3u8; 32], [4u8; 32]).rotate([5u8; 32], [6u8; 32]);
        let receiver = GroupSenderKeyReceiver::from_public_export(&rotated.export_public()).unwrap();

        let restored = GroupSenderKeyReceiver::deserialize(&receiver.serialize().unwrap()).unwrap();
        assert_eq!(restored.generation(), 1);
    }

    #[test]
    fn import_mid_chain() {
        let (mut sender, _) = pair();
        sender.encrypt(b"before", [0u8; 12]).unwrap();

        let mut late_joiner =
            GroupSenderKeyReceiver::from_public_export(&sender.export_public()).unwrap();
        let message = sender.encrypt(b"after", [1u8; 12]).unwrap();

        assert_eq!(message.message_index, 1);
        assert_eq!(late_joiner.decrypt(&message).unwrap(), b"after");
    }

    #[test]
    fn serialization_keeps_cache() {
        let (mut sender, mut receiver) = pair();
        let m0 = sender.encrypt(b"zero", [0u8; 12]).unwrap();
        let m1 = sender.encrypt(b"one", [1u8; 12]).unwrap();
        receiver.decrypt(&m1).unwrap();

        let mut restored =
            GroupSenderKeyReceiver::deserialize(&receiver.serialize().unwrap()).unwrap();
        assert_eq!(restored.skipped_len(), 1);
        assert_eq!(restored.decrypt(&m0).unwrap(), b"zero");
    }
}
