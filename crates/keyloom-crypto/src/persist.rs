//! Versioned CBOR envelopes for persisted state.
//!
//! Every blob handed to the storage collaborator is wrapped as
//! `{ version, body }`. The version is checked before the body is parsed, so
//! data written by a different protocol version fails closed.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::RatchetError;

/// Protocol version stamped on persisted blobs and distributed key material.
pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
}

/// Serialize `value` into a versioned blob.
pub(crate) fn seal<T: Serialize>(value: &T) -> Result<Vec<u8>, RatchetError> {
    let mut body = Vec::new();
    ciborium::into_writer(value, &mut body)
        .map_err(|e| RatchetError::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(body.len() + 8);
    ciborium::into_writer(&Envelope { version: PROTOCOL_VERSION, body }, &mut bytes)
        .map_err(|e| RatchetError::SerializationError(e.to_string()))?;

    Ok(bytes)
}

/// Parse a versioned blob produced by [`seal`].
pub(crate) fn open<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RatchetError> {
    let envelope: Envelope = ciborium::from_reader(bytes)
        .map_err(|e| RatchetError::SerializationError(e.to_string()))?;

    if envelope.version != PROTOCOL_VERSION {
        return Err(RatchetError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: envelope.version,
        });
    }

    ciborium::from_reader(envelope.body.as_slice())
        .map_err(|e| RatchetError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let bytes = seal(&(7u32, "state".to_string())).unwrap();
        let value: (u32, String) = open(&bytes).unwrap();
        assert_eq!(value, (7, "state".to_string()));
    }

    #[test]
    fn unknown_version_fails_closed() {
        let mut body = Vec::new();
        ciborium::into_writer(&7u32, &mut body).unwrap();
        let mut bytes = Vec::new();
        ciborium::into_writer(&Envelope { version: 2, body }, &mut bytes).unwrap();

        let result: Result<u32, _> = open(&bytes);
        assert_eq!(result, Err(RatchetError::VersionMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let result: Result<u32, _> = open(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(RatchetError::SerializationError(_))));
    }
}
