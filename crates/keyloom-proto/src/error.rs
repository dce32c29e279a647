//! Codec errors.
//!
//! Every failure here is a malformed-input parse error. Callers that sit on
//! the ratchet boundary convert into [`RatchetError`] with `?`.

use keyloom_crypto::{PROTOCOL_VERSION, RatchetError};
use thiserror::Error;

/// Errors produced while decoding or encoding wire messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input is not valid JSON, does not match the schema, or has unknown
    /// fields
    #[error("malformed message: {reason}")]
    Json {
        /// Parser diagnostic
        reason: String,
    },

    /// A byte field is not valid hex
    #[error("field {field} is not valid hex")]
    Hex {
        /// Wire name of the field
        field: &'static str,
    },

    /// A fixed-size byte field has the wrong length
    #[error("field {field} has length {actual}, expected {expected}")]
    Length {
        /// Wire name of the field
        field: &'static str,
        /// Required byte length
        expected: usize,
        /// Decoded byte length
        actual: usize,
    },

    /// Distributed key material tagged with a version this build rejects
    #[error("unsupported wire version {version}")]
    UnsupportedVersion {
        /// Version found in the message
        version: u8,
    },
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json { reason: err.to_string() }
    }
}

impl From<CodecError> for RatchetError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedVersion { version } => {
                Self::VersionMismatch { expected: PROTOCOL_VERSION, actual: version }
            },
            other => Self::SerializationError(other.to_string()),
        }
    }
}
