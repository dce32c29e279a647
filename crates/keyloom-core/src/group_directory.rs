//! Group sender keys and their receivers.
//!
//! Each local user holds one [`GroupSenderKey`] per group and one
//! [`GroupSenderKeyReceiver`] per (group, remote sender). Receivers are filed
//! under the sender's long-term signing public key, which travels in every
//! [`GroupEnvelope`]. Sender keys are handed out over pairwise sessions, so
//! the group directory sits on top of a [`SessionDirectory`].
//!
//! # Membership changes
//!
//! Removing a member purges their receiver and rotates our sender key. The
//! fresh key is redistributed only to the members the contact directory
//! reports at that point, so callers update membership first.

use std::sync::Arc;

use keyloom_crypto::{GroupSenderKey, GroupSenderKeyReceiver, RatchetError};
use keyloom_proto::{CodecError, GroupEnvelope, PairwiseEnvelope, decode_sender_key, encode_sender_key};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    env::Environment, error::DirectoryError, locks::KeyedLocks,
    session_directory::SessionDirectory, storage::Storage,
};

/// One recipient's copy of our sender key, pairwise-encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyDistribution {
    /// Member the payload is addressed to
    pub contact: String,
    /// Encrypted sender-key export
    pub envelope: PairwiseEnvelope,
}

/// Directory of group sender keys and receivers.
pub struct GroupKeyDirectory<S, E> {
    sessions: Arc<SessionDirectory<S, E>>,
    sender_locks: KeyedLocks<String>,
    receiver_locks: KeyedLocks<(String, [u8; 32])>,
}

impl<S: Storage, E: Environment> GroupKeyDirectory<S, E> {
    /// Group directory distributing keys through `sessions`.
    pub fn new(sessions: Arc<SessionDirectory<S, E>>) -> Self {
        Self { sessions, sender_locks: KeyedLocks::new(), receiver_locks: KeyedLocks::new() }
    }

    /// Key other members file our receivers under.
    pub fn sender_public_key(&self) -> [u8; 32] {
        self.sessions.identity().signing_public_key()
    }

    /// Encrypt `plaintext` to `group` under our sender key, creating the key
    /// on first use.
    ///
    /// A freshly created key reaches nobody until it is distributed with
    /// [`distribute_sender_key`](Self::distribute_sender_key).
    pub async fn encrypt_group_message(
        &self,
        group: &str,
        plaintext: &[u8],
    ) -> Result<GroupEnvelope, DirectoryError> {
        let _guard = self.sender_locks.lock(&group.to_string()).await;

        let mut sender_key = self.load_or_create_sender_key(group)?;
        let message = sender_key.encrypt(plaintext, self.env().random_array())?;
        self.storage().store_sender_key(group, &sender_key.serialize()?)?;

        Ok(GroupEnvelope { sender_public_key: self.sender_public_key(), message })
    }

    /// Verify and decrypt a group message.
    ///
    /// The receiver is persisted after every verified attempt, including
    /// failed ones, because skip-ahead consumes chain positions before the
    /// AEAD check.
    ///
    /// The signature covers the ciphertext only, not `message_index`. A
    /// relayed message with a rewritten index still verifies, so it can
    /// spend skip positions (up to `max_skip`) before the AEAD check
    /// rejects it. Messages skipped that way stay decryptable from the
    /// cache until it is pruned.
    ///
    /// # Errors
    ///
    /// - `Ratchet(UnknownSender)` if no sender key is on file for the sender
    /// - `Ratchet(InvalidSignature)` if the signature does not verify
    /// - `Ratchet(DuplicateOrStaleMessage | SkipTooFar | DecryptionFailure)`
    pub async fn decrypt_group_message(
        &self,
        group: &str,
        envelope: &GroupEnvelope,
    ) -> Result<Vec<u8>, DirectoryError> {
        let sender = envelope.sender_public_key;
        let _guard = self.receiver_locks.lock(&(group.to_string(), sender)).await;

        let Some(blob) = self.storage().load_receiver(group, &sender)? else {
            warn!(group = %group, "group message from unknown sender");
            return Err(RatchetError::UnknownSender.into());
        };
        let mut receiver = GroupSenderKeyReceiver::deserialize(&blob)?
            .with_skip_limits(self.sessions.config().skip_limits);

        let result = receiver.decrypt(&envelope.message);

        // Signature failures return before the receiver is touched.
        if !matches!(result, Err(RatchetError::InvalidSignature)) {
            self.storage().store_receiver(group, &sender, &receiver.serialize()?)?;
        }

        result.map_err(|err| {
            warn!(
                group = %group,
                index = envelope.message.message_index,
                error = %err,
                "group decrypt rejected"
            );
            err.into()
        })
    }

    /// Encrypt our sender key to every other member of `group`.
    ///
    /// Creates the sender key if this is the first use. Stops at the first
    /// member that cannot be reached; payloads built before the failure are
    /// discarded with it.
    ///
    /// # Errors
    ///
    /// - `MissingContactKey` if a member has no usable agreement key
    pub async fn distribute_sender_key(
        &self,
        group: &str,
    ) -> Result<Vec<SenderKeyDistribution>, DirectoryError> {
        let export = {
            let _guard = self.sender_locks.lock(&group.to_string()).await;
            self.load_or_create_sender_key(group)?.export_public()
        };
        let payload = Zeroizing::new(encode_sender_key(&export)?);

        let me = self.sessions.identity().contact_id().to_string();
        let mut distributions = Vec::new();
        for member in self.sessions.contacts().group_members(group) {
            if member == me {
                continue;
            }
            let envelope = self.sessions.encrypt(&member, payload.as_bytes()).await?;
            distributions.push(SenderKeyDistribution { contact: member, envelope });
        }

        info!(
            group = %group,
            recipients = distributions.len(),
            index = export.message_index,
            "distributed sender key"
        );
        Ok(distributions)
    }

    /// Install a sender-key export received from `sender`.
    ///
    /// The caller vouches that the export really came from `sender`;
    /// [`receive_sender_key`](Self::receive_sender_key) does that check for
    /// payloads that arrive over a pairwise session.
    ///
    /// An export for the signing key already on file is ignored, so a
    /// replayed or re-sent distribution cannot rewind the receiver. An
    /// export from a later generation replaces the receiver (the sender
    /// rotated). An export with a different key from the same or an
    /// earlier generation is a delayed distribution of a superseded key
    /// and is ignored.
    pub async fn handle_received_sender_key(
        &self,
        group: &str,
        sender: [u8; 32],
        exported: &str,
    ) -> Result<(), DirectoryError> {
        let export = decode_sender_key(exported)?;
        let _guard = self.receiver_locks.lock(&(group.to_string(), sender)).await;

        if let Some(blob) = self.storage().load_receiver(group, &sender)? {
            let existing = GroupSenderKeyReceiver::deserialize(&blob)?;
            if existing.signing_public() == &export.signing_public {
                debug!(group = %group, "sender key already installed");
                return Ok(());
            }
            if export.generation <= existing.generation() {
                warn!(
                    group = %group,
                    installed = existing.generation(),
                    received = export.generation,
                    "ignoring superseded sender key"
                );
                return Ok(());
            }
            info!(
                group = %group,
                generation = export.generation,
                "sender rotated their key; replacing receiver"
            );
        }

        let receiver = GroupSenderKeyReceiver::from_public_export(&export)?;
        self.storage().store_receiver(group, &sender, &receiver.serialize()?)?;
        debug!(group = %group, index = export.message_index, "installed sender key");
        Ok(())
    }

    /// Pairwise-decrypt a distribution payload from `contact` and install it
    /// as `sender`'s key for `group`.
    ///
    /// # Errors
    ///
    /// - `SenderKeyMismatch` if `sender` is not `contact`'s signing key on
    ///   file; the envelope is left undecrypted
    /// - `Codec(Json)` if the payload is not UTF-8 sender-key JSON
    pub async fn receive_sender_key(
        &self,
        contact: &str,
        group: &str,
        sender: [u8; 32],
        envelope: &PairwiseEnvelope,
    ) -> Result<(), DirectoryError> {
        let owner =
            self.sessions.contacts().signing_public_key(contact).filter(|key| key != &[0u8; 32]);
        if owner != Some(sender) {
            warn!(contact = %contact, group = %group, "sender key offered for another member");
            return Err(DirectoryError::SenderKeyMismatch { contact: contact.to_string() });
        }

        let plaintext = Zeroizing::new(self.sessions.decrypt(contact, envelope).await?);
        let exported = std::str::from_utf8(&plaintext)
            .map_err(|_| CodecError::Json { reason: "sender key payload is not UTF-8".to_string() })?;
        self.handle_received_sender_key(group, sender, exported).await
    }

    /// Replace our sender key for `group` and redistribute it.
    pub async fn rotate_sender_key(
        &self,
        group: &str,
    ) -> Result<Vec<SenderKeyDistribution>, DirectoryError> {
        {
            let _guard = self.sender_locks.lock(&group.to_string()).await;
            let (chain_seed, signing_seed) = (self.env().random_array(), self.env().random_array());
            let fresh = match self.storage().load_sender_key(group)? {
                Some(blob) => GroupSenderKey::deserialize(&blob)?.rotate(chain_seed, signing_seed),
                None => GroupSenderKey::generate(chain_seed, signing_seed),
            };
            self.storage().store_sender_key(group, &fresh.serialize()?)?;
            info!(group = %group, generation = fresh.generation(), "rotated sender key");
        }
        self.distribute_sender_key(group).await
    }

    /// Purge `removed_sender`'s receiver and rotate our sender key.
    ///
    /// Returns the redistribution payloads for the remaining members.
    pub async fn remove_member(
        &self,
        group: &str,
        removed_sender: &[u8; 32],
    ) -> Result<Vec<SenderKeyDistribution>, DirectoryError> {
        {
            let _guard = self.receiver_locks.lock(&(group.to_string(), *removed_sender)).await;
            self.storage().delete_receiver(group, removed_sender)?;
        }
        self.rotate_sender_key(group).await
    }

    /// Senders we hold receivers for in `group`.
    pub fn known_senders(&self, group: &str) -> Result<Vec<[u8; 32]>, DirectoryError> {
        Ok(self.storage().list_receivers(group)?)
    }

    fn load_or_create_sender_key(&self, group: &str) -> Result<GroupSenderKey, DirectoryError> {
        if let Some(blob) = self.storage().load_sender_key(group)? {
            return Ok(GroupSenderKey::deserialize(&blob)?);
        }
        let sender_key = self.generate_sender_key();
        self.storage().store_sender_key(group, &sender_key.serialize()?)?;
        info!(group = %group, "created sender key");
        Ok(sender_key)
    }

    fn generate_sender_key(&self) -> GroupSenderKey {
        GroupSenderKey::generate(self.env().random_array(), self.env().random_array())
    }

    fn storage(&self) -> &S {
        self.sessions.storage()
    }

    fn env(&self) -> &E {
        self.sessions.env()
    }
}
