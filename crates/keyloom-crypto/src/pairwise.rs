//! Pairwise double-ratchet session.
//!
//! One X25519 exchange (sender ephemeral × recipient long-term key) seeds a
//! Diffie-Hellman ratchet and two hash chains. Every message advances a chain;
//! every change of the peer's ratchet key triggers a DH ratchet step that
//! re-seeds both chains from the root key.
//!
//! ```text
//! ephemeral × long-term ──HKDF──► shared secret = initial root key
//!                                        │
//!          DH(local ratchet, remote ratchet) ──KDF_RK──► root', chain key
//!                                        │
//!                           chain key ──HKDF──► message key (+ nonce)
//!                                     └─HMAC──► next chain key
//! ```
//!
//! Decryption runs on a copy of the state and only commits on success, so a
//! tag mismatch never changes what the caller persists.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    chain::{KeyDomain, MessageKey, SymmetricRatchet},
    error::RatchetError,
    persist,
    primitives::{
        KEY_SIZE, aead_open, aead_seal, build_associated_data, derive_shared_secret,
        diffie_hellman, kdf_root, x25519_public,
    },
    skipped::{SkipLimits, SkippedKeys},
};

/// Cleartext header sent with every pairwise ciphertext.
///
/// Drives the receiver's ratchet and is authenticated as associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sender's current ratchet public key
    pub ratchet_public: [u8; KEY_SIZE],
    /// Messages the sender sent in its previous sending chain
    pub previous_chain_length: u32,
    /// Messages sent in the current chain, including this one
    pub chain_length: u32,
}

impl Header {
    /// Zero-based position of this message in its chain.
    pub fn message_number(&self) -> Result<u32, RatchetError> {
        self.chain_length.checked_sub(1).ok_or_else(|| {
            RatchetError::SerializationError("chain length must be non-zero".to_string())
        })
    }

    /// Associated data binding this header to `constant`.
    pub fn associated_data(&self, constant: &[u8]) -> Vec<u8> {
        build_associated_data(
            constant,
            &self.ratchet_public,
            self.previous_chain_length,
            self.chain_length,
        )
    }
}

/// A pairwise ciphertext with its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// Ratchet header
    pub header: Header,
    /// AEAD output including the tag
    pub ciphertext: Vec<u8>,
}

/// Output of [`PairwiseSession::initialize_as_sender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderBootstrap {
    /// Ephemeral public key the peer needs once to bootstrap its side
    pub ephemeral_public: [u8; KEY_SIZE],
    /// First message of the session
    pub message: EncryptedMessage,
}

/// Skipped-key id: (remote ratchet public key, message number).
type SkippedId = ([u8; KEY_SIZE], u32);

#[derive(Clone, Serialize, Deserialize)]
struct RatchetState {
    /// Bootstrap secret. Retained for compatibility checks only; never reused
    /// as key material after seeding the root key.
    shared_secret: [u8; KEY_SIZE],
    /// Peer ephemeral key this session was receiver-bootstrapped from.
    bootstrap_ephemeral: Option<[u8; KEY_SIZE]>,
    root_key: [u8; KEY_SIZE],
    sending: SymmetricRatchet,
    receiving: Option<SymmetricRatchet>,
    previous_sending_length: u32,
    local_ratchet_secret: [u8; KEY_SIZE],
    local_ratchet_public: [u8; KEY_SIZE],
    remote_ratchet_public: Option<[u8; KEY_SIZE]>,
    skipped: SkippedKeys<SkippedId>,
    #[serde(with = "serde_bytes")]
    associated_data: Vec<u8>,
}

impl RatchetState {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedMessage, RatchetError> {
        let message_key = self.sending.advance()?;

        let header = Header {
            ratchet_public: self.local_ratchet_public,
            previous_chain_length: self.previous_sending_length,
            chain_length: message_key.index() + 1,
        };

        let ad = header.associated_data(&self.associated_data);
        let ciphertext = aead_seal(message_key.key(), message_key.nonce(), plaintext, &ad);

        Ok(EncryptedMessage { header, ciphertext })
    }

    fn decrypt(
        &mut self,
        message: &EncryptedMessage,
        ratchet_seed: [u8; KEY_SIZE],
        limits: SkipLimits,
    ) -> Result<Vec<u8>, RatchetError> {
        let header = &message.header;
        let number = header.message_number()?;

        if let Some(message_key) = self.skipped.take(&(header.ratchet_public, number)) {
            return self.open(&message_key, message);
        }

        if self.remote_ratchet_public != Some(header.ratchet_public) {
            self.skip_previous_chain(header.previous_chain_length, limits)?;
            self.dh_ratchet(&header.ratchet_public, ratchet_seed)?;
        }

        let remote = header.ratchet_public;
        let receiving = self.receiving.as_mut().ok_or(RatchetError::SessionNotInitialized)?;
        for key in receiving.skip_to(number, limits.max_skip)? {
            self.skipped.insert((remote, key.index()), key);
        }
        let message_key = receiving.advance()?;
        self.skipped.prune(limits.max_retained);

        self.open(&message_key, message)
    }

    fn open(
        &self,
        message_key: &MessageKey,
        message: &EncryptedMessage,
    ) -> Result<Vec<u8>, RatchetError> {
        let ad = message.header.associated_data(&self.associated_data);
        aead_open(message_key.key(), message_key.nonce(), &message.ciphertext, &ad)
    }

    /// Cache the keys the peer sent on its previous chain that we never saw.
    fn skip_previous_chain(&mut self, until: u32, limits: SkipLimits) -> Result<(), RatchetError> {
        let (Some(receiving), Some(remote)) = (self.receiving.as_mut(), self.remote_ratchet_public)
        else {
            return Ok(());
        };

        if until <= receiving.index() {
            return Ok(());
        }

        for key in receiving.skip_to(until, limits.max_skip)? {
            self.skipped.insert((remote, key.index()), key);
        }

        Ok(())
    }

    fn dh_ratchet(
        &mut self,
        remote: &[u8; KEY_SIZE],
        ratchet_seed: [u8; KEY_SIZE],
    ) -> Result<(), RatchetError> {
        self.previous_sending_length = self.sending.index();
        self.remote_ratchet_public = Some(*remote);

        let dh = diffie_hellman(&self.local_ratchet_secret, remote)?;
        let (root_key, receiving_key) = kdf_root(&self.root_key, &dh);
        self.root_key = root_key;
        self.receiving = Some(SymmetricRatchet::new(receiving_key, KeyDomain::Pairwise));

        self.local_ratchet_secret.zeroize();
        self.local_ratchet_secret = ratchet_seed;
        self.local_ratchet_public = x25519_public(&ratchet_seed);

        let dh = diffie_hellman(&self.local_ratchet_secret, remote)?;
        let (root_key, sending_key) = kdf_root(&self.root_key, &dh);
        self.root_key = root_key;
        self.sending = SymmetricRatchet::new(sending_key, KeyDomain::Pairwise);

        Ok(())
    }
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.shared_secret.zeroize();
        self.root_key.zeroize();
        self.local_ratchet_secret.zeroize();
    }
}

/// Double-ratchet session with one contact.
///
/// # Invariants
///
/// - Once initialized, a session never returns to the uninitialized state. A
///   new object must be constructed to re-bootstrap.
/// - A failed decrypt leaves the session exactly as it was.
#[derive(Clone, Default)]
pub struct PairwiseSession {
    state: Option<RatchetState>,
    limits: SkipLimits,
}

impl PairwiseSession {
    /// Uninitialized session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override skip-ahead limits. Limits are configuration and are not
    /// persisted with the session.
    #[must_use]
    pub fn with_skip_limits(mut self, limits: SkipLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Whether the session has been bootstrapped.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Bootstrap as the initiating side and encrypt the first message.
    ///
    /// Performs a single DH between a fresh ephemeral key and the peer's
    /// long-term key. The peer's long-term key doubles as its initial ratchet
    /// key.
    pub fn initialize_as_sender(
        &mut self,
        their_long_term_public: &[u8; KEY_SIZE],
        ephemeral_seed: [u8; KEY_SIZE],
        ratchet_seed: [u8; KEY_SIZE],
        associated_data: &[u8],
        first_plaintext: &[u8],
    ) -> Result<SenderBootstrap, RatchetError> {
        if self.state.is_some() {
            return Err(RatchetError::AlreadyInitialized);
        }

        let dh = diffie_hellman(&ephemeral_seed, their_long_term_public)?;
        let shared_secret = derive_shared_secret(&dh);
        let ephemeral_public = x25519_public(&ephemeral_seed);

        let dh = diffie_hellman(&ratchet_seed, their_long_term_public)?;
        let (root_key, sending_key) = kdf_root(&shared_secret, &dh);

        let mut state = RatchetState {
            shared_secret,
            bootstrap_ephemeral: None,
            root_key,
            sending: SymmetricRatchet::new(sending_key, KeyDomain::Pairwise),
            receiving: None,
            previous_sending_length: 0,
            local_ratchet_secret: ratchet_seed,
            local_ratchet_public: x25519_public(&ratchet_seed),
            remote_ratchet_public: Some(*their_long_term_public),
            skipped: SkippedKeys::new(),
            associated_data: associated_data.to_vec(),
        };

        let message = state.encrypt(first_plaintext)?;
        self.state = Some(state);

        Ok(SenderBootstrap { ephemeral_public, message })
    }

    /// Bootstrap as the responding side and decrypt the first message.
    ///
    /// The session stays uninitialized if the first message does not decrypt.
    pub fn initialize_as_receiver(
        &mut self,
        our_long_term_secret: &[u8; KEY_SIZE],
        their_ephemeral_public: &[u8; KEY_SIZE],
        first_message: &EncryptedMessage,
        ratchet_seed: [u8; KEY_SIZE],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, RatchetError> {
        if self.state.is_some() {
            return Err(RatchetError::AlreadyInitialized);
        }

        let dh = diffie_hellman(our_long_term_secret, their_ephemeral_public)?;
        let shared_secret = derive_shared_secret(&dh);

        // The sending chain is a placeholder until the first DH ratchet step
        // replaces it, which decrypting the first message always performs.
        let mut state = RatchetState {
            shared_secret,
            bootstrap_ephemeral: Some(*their_ephemeral_public),
            root_key: shared_secret,
            sending: SymmetricRatchet::new([0u8; KEY_SIZE], KeyDomain::Pairwise),
            receiving: None,
            previous_sending_length: 0,
            local_ratchet_secret: *our_long_term_secret,
            local_ratchet_public: x25519_public(our_long_term_secret),
            remote_ratchet_public: None,
            skipped: SkippedKeys::new(),
            associated_data: associated_data.to_vec(),
        };

        let plaintext = state.decrypt(first_message, ratchet_seed, self.limits)?;
        self.state = Some(state);

        Ok(plaintext)
    }

    /// Encrypt through the sending chain.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedMessage, RatchetError> {
        let state = self.state.as_mut().ok_or(RatchetError::SessionNotInitialized)?;
        state.encrypt(plaintext)
    }

    /// Decrypt a steady-state message.
    ///
    /// `ratchet_seed` becomes the next local ratchet secret if the message
    /// carries a new peer ratchet key; it is unused otherwise.
    pub fn decrypt(
        &mut self,
        message: &EncryptedMessage,
        ratchet_seed: [u8; KEY_SIZE],
    ) -> Result<Vec<u8>, RatchetError> {
        let state = self.state.as_ref().ok_or(RatchetError::SessionNotInitialized)?;

        let mut next = state.clone();
        let plaintext = next.decrypt(message, ratchet_seed, self.limits)?;
        self.state = Some(next);

        Ok(plaintext)
    }

    /// Opaque versioned blob of the full session state.
    pub fn serialize(&self) -> Result<Vec<u8>, RatchetError> {
        persist::seal(&self.state)
    }

    /// Restore a session from [`serialize()`](Self::serialize) output.
    ///
    /// Blobs from another protocol version fail with `VersionMismatch`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, RatchetError> {
        let state: Option<RatchetState> = persist::open(bytes)?;
        Ok(Self { state, limits: SkipLimits::default() })
    }

    /// Peer ephemeral key this session was receiver-bootstrapped from.
    pub fn bootstrap_ephemeral(&self) -> Option<&[u8; KEY_SIZE]> {
        self.state.as_ref().and_then(|s| s.bootstrap_ephemeral.as_ref())
    }

    /// Current local ratchet public key.
    pub fn local_ratchet_public(&self) -> Option<&[u8; KEY_SIZE]> {
        self.state.as_ref().map(|s| &s.local_ratchet_public)
    }

    /// Next sending-chain index.
    pub fn sending_index(&self) -> Option<u32> {
        self.state.as_ref().map(|s| s.sending.index())
    }

    /// Next receiving-chain index, if a receiving chain exists.
    pub fn receiving_index(&self) -> Option<u32> {
        self.state.as_ref().and_then(|s| s.receiving.as_ref()).map(SymmetricRatchet::index)
    }

    /// Number of cached skipped message keys.
    pub fn skipped_len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.skipped.len())
    }
}

impl fmt::Debug for PairwiseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairwiseSession")
            .field("initialized", &self.is_initialized())
            .field("sending_index", &self.sending_index())
            .field("receiving_index", &self.receiving_index())
            .field("skipped", &self.skipped_len())
            .finish_non_exhaustive()
    }
}
