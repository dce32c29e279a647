//! Directory error types.
//!
//! Wraps the crypto, codec and storage layers so `?` carries a failure up
//! unchanged. Cryptographic failures are never collapsed: callers match on
//! the inner [`RatchetError`] to pick a reaction.

use keyloom_crypto::{RatchetError, Recovery};
use keyloom_proto::CodecError;
use thiserror::Error;

pub use crate::storage::StorageError;

/// Errors returned by the session and group directories.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Ratchet or sender-key operation failed
    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    /// Wire payload could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Storage backend failed
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Contact has no usable agreement key (absent or all-zero placeholder)
    #[error("no agreement key on file for contact {contact}")]
    MissingContactKey {
        /// Contact that was addressed
        contact: String,
    },

    /// Sender key arrived from a contact that does not own the named sender
    #[error("contact {contact} cannot install a sender key for another member")]
    SenderKeyMismatch {
        /// Contact the distribution came from
        contact: String,
    },
}

impl DirectoryError {
    /// Recommended caller reaction.
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Ratchet(err) => err.recovery(),
            Self::Codec(CodecError::UnsupportedVersion { .. }) => Recovery::ResetSession,
            Self::Codec(_) => Recovery::Discard,
            Self::Storage(err) if err.is_transient() => Recovery::Retry,
            Self::Storage(_) => Recovery::ResetSession,
            Self::MissingContactKey { .. } => Recovery::Retry,
            Self::SenderKeyMismatch { .. } => Recovery::Discard,
        }
    }

    /// The underlying ratchet error, if any.
    pub fn as_ratchet(&self) -> Option<&RatchetError> {
        match self {
            Self::Ratchet(err) => Some(err),
            _ => None,
        }
    }
}
