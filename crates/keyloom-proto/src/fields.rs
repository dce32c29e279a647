//! Hex encoding of byte fields.

use crate::error::CodecError;

/// Lowercase hex.
pub(crate) fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a variable-length byte field.
pub(crate) fn decode_vec(field: &'static str, text: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(text).map_err(|_| CodecError::Hex { field })
}

/// Decode a fixed-size byte field.
pub(crate) fn decode_array<const N: usize>(
    field: &'static str,
    text: &str,
) -> Result<[u8; N], CodecError> {
    let bytes = decode_vec(field, text)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| CodecError::Length {
        field,
        expected: N,
        actual: bytes.len(),
    })
}
