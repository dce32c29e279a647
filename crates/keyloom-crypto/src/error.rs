//! Error types for ratchet and sender-key operations.
//!
//! Every failure the encryption core can produce is a distinct variant so the
//! caller can pick the right reaction (request redistribution, reset the
//! session, drop the message). Display strings never carry key material or
//! chain positions; positions live in structured fields for logs only.

use thiserror::Error;

/// Errors returned by pairwise sessions, sender keys and receivers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatchetError {
    /// Encrypt or decrypt called before the session was bootstrapped
    #[error("session not initialized")]
    SessionNotInitialized,

    /// Bootstrap attempted on a session object that is already live
    #[error("session already initialized")]
    AlreadyInitialized,

    /// First message of a session arrived without the sender's ephemeral key
    #[error("first message requires the sender's ephemeral key")]
    MissingEphemeralKey,

    /// Group message signature did not verify (tamper or spoof)
    #[error("signature verification failed")]
    InvalidSignature,

    /// AEAD authentication failed
    #[error("decryption failed")]
    DecryptionFailure,

    /// Message is further ahead of the chain than the skip cap allows
    #[error("message is too far ahead of the chain")]
    SkipTooFar {
        /// Current chain position
        current: u32,
        /// Position the message claims
        requested: u32,
        /// Configured skip cap
        max_skip: u32,
    },

    /// Message position was already consumed and is not cached
    #[error("message already processed")]
    DuplicateOrStaleMessage {
        /// Position the message claims
        index: u32,
    },

    /// No sender key on file for this group and sender
    #[error("no sender key on file for this sender")]
    UnknownSender,

    /// Persisted or distributed data tagged with an unsupported version
    #[error("unsupported protocol version {actual} (expected {expected})")]
    VersionMismatch {
        /// Version this build understands
        expected: u8,
        /// Version found in the data
        actual: u8,
    },

    /// Malformed persisted or wire data
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Public key is malformed, all-zero, or of low order
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Chain index would overflow
    #[error("message chain exhausted")]
    ChainExhausted,
}

/// What a caller should do after a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Ask the sender to redistribute their sender key
    RequestRedistribution,
    /// Tear down and re-bootstrap the session or sender key
    ResetSession,
    /// Drop the message; retrying the same bytes cannot succeed
    Discard,
    /// Operation may succeed once a precondition is met
    Retry,
}

impl RatchetError {
    /// Recommended caller reaction for this error.
    ///
    /// `InvalidSignature` is never retryable: the same ciphertext will fail
    /// the same way and may be an active spoofing attempt.
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::UnknownSender => Recovery::RequestRedistribution,
            Self::SkipTooFar { .. } | Self::ChainExhausted | Self::VersionMismatch { .. } => {
                Recovery::ResetSession
            },
            Self::SessionNotInitialized | Self::MissingEphemeralKey => Recovery::Retry,
            Self::InvalidSignature
            | Self::DecryptionFailure
            | Self::DuplicateOrStaleMessage { .. }
            | Self::AlreadyInitialized
            | Self::SerializationError(_)
            | Self::InvalidPublicKey => Recovery::Discard,
        }
    }
}
