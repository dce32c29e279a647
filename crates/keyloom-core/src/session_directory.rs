//! Pairwise sessions keyed by contact.
//!
//! Owns the lifecycle of every [`PairwiseSession`]: bootstraps on first
//! contact, persists after every successful operation, and serializes all
//! operations for one contact behind a per-contact lock.
//!
//! # Bootstrap
//!
//! The first message to a contact carries our ephemeral public key. On the
//! receiving side an ephemeral key is handled as follows:
//!
//! - No session: bootstrap a responder session from it.
//! - Session bootstrapped from the same key: ordinary decrypt (a duplicate
//!   first message is rejected as stale).
//! - Session from a different key: the peer re-bootstrapped. A fresh session
//!   is built and replaces the stored one only if the message decrypts. If we
//!   also have an unanswered bootstrap of our own, the side with the lower
//!   agreement key keeps its session so both peers converge on one.

use std::sync::Arc;

use keyloom_crypto::{EncryptedMessage, PairwiseSession, RatchetError};
use keyloom_proto::PairwiseEnvelope;
use tracing::{debug, warn};

use crate::{
    config::DirectoryConfig, contacts::ContactDirectory, env::Environment, error::DirectoryError,
    identity::IdentityProvider, locks::KeyedLocks, storage::Storage,
};

/// Directory of pairwise sessions.
pub struct SessionDirectory<S, E> {
    storage: S,
    env: E,
    identity: Arc<dyn IdentityProvider>,
    contacts: Arc<dyn ContactDirectory>,
    config: DirectoryConfig,
    locks: KeyedLocks<String>,
}

impl<S: Storage, E: Environment> SessionDirectory<S, E> {
    /// Create a directory over `storage`.
    pub fn new(
        storage: S,
        env: E,
        identity: Arc<dyn IdentityProvider>,
        contacts: Arc<dyn ContactDirectory>,
        config: DirectoryConfig,
    ) -> Self {
        Self { storage, env, identity, contacts, config, locks: KeyedLocks::new() }
    }

    /// Encrypt `plaintext` for `contact`, bootstrapping a session if none
    /// exists.
    ///
    /// The returned envelope carries an ephemeral key only when this call
    /// bootstrapped the session.
    ///
    /// # Errors
    ///
    /// - `MissingContactKey` if bootstrapping and the contact has no usable
    ///   agreement key
    /// - `Ratchet` for cryptographic failures
    /// - `Storage` if the session cannot be loaded or persisted
    pub async fn encrypt(
        &self,
        contact: &str,
        plaintext: &[u8],
    ) -> Result<PairwiseEnvelope, DirectoryError> {
        let _guard = self.locks.lock(&contact.to_string()).await;

        if let Some(mut session) = self.load(contact)? {
            let message = session.encrypt(plaintext)?;
            self.store(contact, &session)?;
            return Ok(PairwiseEnvelope::steady(message));
        }

        let their_key = self.contact_key(contact)?;
        let mut session = self.new_session();
        let bootstrap = session.initialize_as_sender(
            &their_key,
            self.env.random_array(),
            self.env.random_array(),
            &self.config.associated_data,
            plaintext,
        )?;
        self.store(contact, &session)?;

        debug!(contact = %contact, "bootstrapped pairwise session as initiator");
        Ok(bootstrap.into())
    }

    /// Decrypt an envelope from `contact`.
    ///
    /// Session state is persisted only when decryption succeeds.
    ///
    /// # Errors
    ///
    /// - `Ratchet(MissingEphemeralKey)` if no session exists and the envelope
    ///   is not a bootstrap
    /// - `Ratchet(DecryptionFailure | DuplicateOrStaleMessage | SkipTooFar)`
    ///   from the ratchet
    /// - `Storage` if the session cannot be loaded or persisted
    pub async fn decrypt(
        &self,
        contact: &str,
        envelope: &PairwiseEnvelope,
    ) -> Result<Vec<u8>, DirectoryError> {
        let _guard = self.locks.lock(&contact.to_string()).await;

        match (self.load(contact)?, envelope.ephemeral_key) {
            (None, None) => {
                warn!(contact = %contact, "message without session or ephemeral key");
                Err(RatchetError::MissingEphemeralKey.into())
            },
            (None, Some(ephemeral)) => {
                let (session, plaintext) = self.bootstrap_responder(&ephemeral, &envelope.message)?;
                self.store(contact, &session)?;
                debug!(contact = %contact, "bootstrapped pairwise session as responder");
                Ok(plaintext)
            },
            (Some(existing), Some(ephemeral)) if existing.bootstrap_ephemeral() != Some(&ephemeral) => {
                self.rebootstrap(contact, &existing, &ephemeral, &envelope.message)
            },
            (Some(mut session), _) => self.decrypt_steady(contact, &mut session, &envelope.message),
        }
    }

    /// Forget the session with `contact`. The next encrypt bootstraps anew.
    pub async fn reset(&self, contact: &str) -> Result<(), DirectoryError> {
        let _guard = self.locks.lock(&contact.to_string()).await;
        self.storage.delete_session(contact)?;
        debug!(contact = %contact, "pairwise session reset");
        Ok(())
    }

    /// Whether a session with `contact` is stored.
    pub async fn has_session(&self, contact: &str) -> Result<bool, DirectoryError> {
        let _guard = self.locks.lock(&contact.to_string()).await;
        Ok(self.storage.load_session(contact)?.is_some())
    }

    pub(crate) fn storage(&self) -> &S {
        &self.storage
    }

    pub(crate) fn env(&self) -> &E {
        &self.env
    }

    pub(crate) fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub(crate) fn contacts(&self) -> &dyn ContactDirectory {
        self.contacts.as_ref()
    }

    pub(crate) fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn decrypt_steady(
        &self,
        contact: &str,
        session: &mut PairwiseSession,
        message: &EncryptedMessage,
    ) -> Result<Vec<u8>, DirectoryError> {
        let ratchet_before = session.local_ratchet_public().copied();
        let skipped_before = session.skipped_len();

        let plaintext = session.decrypt(message, self.env.random_array()).inspect_err(|err| {
            warn!(contact = %contact, error = %err, "pairwise decrypt rejected");
        })?;

        if session.local_ratchet_public().copied() != ratchet_before {
            debug!(contact = %contact, "DH ratchet step");
        }
        if session.skipped_len() > skipped_before {
            debug!(contact = %contact, cached = session.skipped_len(), "cached skipped message keys");
        }

        self.store(contact, session)?;
        Ok(plaintext)
    }

    fn rebootstrap(
        &self,
        contact: &str,
        existing: &PairwiseSession,
        ephemeral: &[u8; 32],
        message: &EncryptedMessage,
    ) -> Result<Vec<u8>, DirectoryError> {
        let (fresh, plaintext) = self.bootstrap_responder(ephemeral, message)?;

        if self.keeps_local_initiation(contact, existing) {
            debug!(contact = %contact, "simultaneous initiation; keeping local session");
            return Ok(plaintext);
        }

        self.store(contact, &fresh)?;
        warn!(contact = %contact, "peer re-bootstrapped pairwise session; replaced stored state");
        Ok(plaintext)
    }

    /// Tie-break for simultaneous initiation: an unanswered local bootstrap
    /// survives only if our agreement key sorts below the peer's.
    fn keeps_local_initiation(&self, contact: &str, existing: &PairwiseSession) -> bool {
        let unanswered =
            existing.bootstrap_ephemeral().is_none() && existing.receiving_index().is_none();

        unanswered
            && self
                .contacts
                .agreement_public_key(contact)
                .is_some_and(|theirs| self.identity.agreement_public_key() < theirs)
    }

    fn bootstrap_responder(
        &self,
        ephemeral: &[u8; 32],
        message: &EncryptedMessage,
    ) -> Result<(PairwiseSession, Vec<u8>), DirectoryError> {
        let mut session = self.new_session();
        let secret = self.identity.agreement_private_key();
        let plaintext = session.initialize_as_receiver(
            &secret,
            ephemeral,
            message,
            self.env.random_array(),
            &self.config.associated_data,
        )?;
        Ok((session, plaintext))
    }

    fn contact_key(&self, contact: &str) -> Result<[u8; 32], DirectoryError> {
        self.contacts
            .agreement_public_key(contact)
            .filter(|key| key != &[0u8; 32])
            .ok_or_else(|| DirectoryError::MissingContactKey { contact: contact.to_string() })
    }

    fn new_session(&self) -> PairwiseSession {
        PairwiseSession::new().with_skip_limits(self.config.skip_limits)
    }

    fn load(&self, contact: &str) -> Result<Option<PairwiseSession>, DirectoryError> {
        let Some(blob) = self.storage.load_session(contact)? else {
            return Ok(None);
        };
        let session = PairwiseSession::deserialize(&blob)?;
        Ok(Some(session.with_skip_limits(self.config.skip_limits)))
    }

    fn store(&self, contact: &str, session: &PairwiseSession) -> Result<(), DirectoryError> {
        self.storage.store_session(contact, &session.serialize()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contacts::MemoryContacts, env::testing::SeededEnv, identity::LocalIdentity,
        storage::MemoryStorage,
    };

    type Directory = SessionDirectory<MemoryStorage, SeededEnv>;

    struct Peers {
        alice: Directory,
        bob: Directory,
        alice_storage: MemoryStorage,
        bob_storage: MemoryStorage,
    }

    fn peers_with_secrets(alice_secret: [u8; 32], bob_secret: [u8; 32]) -> Peers {
        let alice_id = LocalIdentity::from_secrets("alice", alice_secret, [0xA2; 32]);
        let bob_id = LocalIdentity::from_secrets("bob", bob_secret, [0xB2; 32]);

        let contacts = MemoryContacts::new();
        contacts.insert_contact("alice", alice_id.agreement_public_key());
        contacts.insert_contact("bob", bob_id.agreement_public_key());

        let alice_storage = MemoryStorage::new();
        let bob_storage = MemoryStorage::new();

        Peers {
            alice: SessionDirectory::new(
                alice_storage.clone(),
                SeededEnv::new(1),
                Arc::new(alice_id),
                Arc::new(contacts.clone()),
                DirectoryConfig::default(),
            ),
            bob: SessionDirectory::new(
                bob_storage.clone(),
                SeededEnv::new(2),
                Arc::new(bob_id),
                Arc::new(contacts),
                DirectoryConfig::default(),
            ),
            alice_storage,
            bob_storage,
        }
    }

    fn peers() -> Peers {
        peers_with_secrets([0xA1; 32], [0xB1; 32])
    }

    #[tokio::test]
    async fn first_message_carries_ephemeral_key_once() {
        let peers = peers();

        let m0 = peers.alice.encrypt("bob", b"hi").await.unwrap();
        let m1 = peers.alice.encrypt("bob", b"how are you").await.unwrap();
        assert!(m0.is_bootstrap());
        assert!(!m1.is_bootstrap());

        assert_eq!(peers.bob.decrypt("alice", &m0).await.unwrap(), b"hi");
        assert_eq!(peers.bob.decrypt("alice", &m1).await.unwrap(), b"how are you");
    }

    #[tokio::test]
    async fn unknown_contact_is_precondition_failure() {
        let peers = peers();
        let result = peers.alice.encrypt("mallory", b"hi").await;
        assert_eq!(
            result.err(),
            Some(DirectoryError::MissingContactKey { contact: "mallory".to_string() })
        );
        assert!(!peers.alice.has_session("mallory").await.unwrap());
    }

    #[tokio::test]
    async fn all_zero_contact_key_is_treated_as_absent() {
        let contacts = MemoryContacts::new();
        contacts.insert_contact("ghost", [0u8; 32]);
        let directory = SessionDirectory::new(
            MemoryStorage::new(),
            SeededEnv::new(3),
            Arc::new(LocalIdentity::from_secrets("me", [1; 32], [2; 32])),
            Arc::new(contacts),
            DirectoryConfig::default(),
        );

        assert!(matches!(
            directory.encrypt("ghost", b"hi").await,
            Err(DirectoryError::MissingContactKey { .. })
        ));
    }

    #[tokio::test]
    async fn steady_message_without_session_needs_ephemeral_key() {
        let peers = peers();
        let _bootstrap = peers.alice.encrypt("bob", b"hi").await.unwrap();
        let m1 = peers.alice.encrypt("bob", b"second").await.unwrap();

        assert_eq!(
            peers.bob.decrypt("alice", &m1).await.err(),
            Some(DirectoryError::Ratchet(RatchetError::MissingEphemeralKey))
        );
    }

    #[tokio::test]
    async fn failed_decrypt_does_not_persist() {
        let peers = peers();
        let m0 = peers.alice.encrypt("bob", b"hi").await.unwrap();
        peers.bob.decrypt("alice", &m0).await.unwrap();

        let mut m1 = peers.alice.encrypt("bob", b"secret").await.unwrap();
        m1.message.ciphertext[0] ^= 1;

        let before = peers.bob_storage.load_session("alice").unwrap();
        assert_eq!(
            peers.bob.decrypt("alice", &m1).await.err(),
            Some(DirectoryError::Ratchet(RatchetError::DecryptionFailure))
        );
        assert_eq!(peers.bob_storage.load_session("alice").unwrap(), before);
    }

    #[tokio::test]
    async fn duplicate_bootstrap_is_stale() {
        let peers = peers();
        let m0 = peers.alice.encrypt("bob", b"hi").await.unwrap();

        peers.bob.decrypt("alice", &m0).await.unwrap();
        assert!(matches!(
            peers.bob.decrypt("alice", &m0).await,
            Err(DirectoryError::Ratchet(RatchetError::DuplicateOrStaleMessage { .. }))
        ));
    }

    #[tokio::test]
    async fn peer_rebootstrap_replaces_session() {
        let peers = peers();
        let m0 = peers.alice.encrypt("bob", b"hi").await.unwrap();
        peers.bob.decrypt("alice", &m0).await.unwrap();

        peers.alice.reset("bob").await.unwrap();
        let again = peers.alice.encrypt("bob", b"fresh start").await.unwrap();
        assert!(again.is_bootstrap());
        assert_eq!(peers.bob.decrypt("alice", &again).await.unwrap(), b"fresh start");

        let reply = peers.bob.encrypt("alice", b"welcome back").await.unwrap();
        assert_eq!(peers.alice.decrypt("bob", &reply).await.unwrap(), b"welcome back");
    }

    #[tokio::test]
    async fn forged_rebootstrap_keeps_existing_session() {
        let peers = peers();
        let m0 = peers.alice.encrypt("bob", b"hi").await.unwrap();
        peers.bob.decrypt("alice", &m0).await.unwrap();

        let mut forged = peers.alice.encrypt("bob", b"x").await.unwrap();
        forged.ephemeral_key = Some(keyloom_crypto::primitives::x25519_public(&[0x77; 32]));

        let before = peers.bob_storage.load_session("alice").unwrap();
        assert!(peers.bob.decrypt("alice", &forged).await.is_err());
        assert_eq!(peers.bob_storage.load_session("alice").unwrap(), before);
    }

    #[tokio::test]
    async fn simultaneous_initiation_converges() {
        // Alice's agreement key must sort below Bob's for the tie-break
        // assertions below; pick secrets until it does.
        let mut secret = 1u8;
        let peers = loop {
            let candidate = peers_with_secrets([secret; 32], [0xB1; 32]);
            let alice_pub = keyloom_crypto::primitives::x25519_public(&[secret; 32]);
            let bob_pub = keyloom_crypto::primitives::x25519_public(&[0xB1; 32]);
            if alice_pub < bob_pub {
                break candidate;
            }
            secret += 1;
        };

        let from_alice = peers.alice.encrypt("bob", b"hello bob").await.unwrap();
        let from_bob = peers.bob.encrypt("alice", b"hello alice").await.unwrap();

        assert_eq!(peers.alice.decrypt("bob", &from_bob).await.unwrap(), b"hello alice");
        assert_eq!(peers.bob.decrypt("alice", &from_alice).await.unwrap(), b"hello bob");

        let a = peers.alice.encrypt("bob", b"after").await.unwrap();
        assert_eq!(peers.bob.decrypt("alice", &a).await.unwrap(), b"after");
        let b = peers.bob.encrypt("alice", b"reply").await.unwrap();
        assert_eq!(peers.alice.decrypt("bob", &b).await.unwrap(), b"reply");
        assert_eq!(peers.alice_storage.session_count(), 1);
    }

    #[tokio::test]
    async fn reset_forgets_session() {
        let peers = peers();
        peers.alice.encrypt("bob", b"hi").await.unwrap();
        assert!(peers.alice.has_session("bob").await.unwrap());

        peers.alice.reset("bob").await.unwrap();
        assert!(!peers.alice.has_session("bob").await.unwrap());
    }
}
