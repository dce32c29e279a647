//! Sender-key distribution payload.
//!
//! ```json
//! { "version": 1, "chainKey": "<hex>", "signaturePublic": "<hex>", "messageIndex": 0, "generation": 0 }
//! ```
//!
//! `generation` counts the sender's rotations and defaults to zero when
//! absent.
//!
//! This JSON is never sent in the clear: it is the plaintext of a pairwise
//! message to each group member. The version is checked before the rest of the
//! payload is parsed, so key material from an unknown version fails closed even
//! if its shape changed.

use keyloom_crypto::{PROTOCOL_VERSION, SenderKeyExport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::CodecError, fields};

#[derive(Deserialize)]
struct VersionProbe {
    version: u8,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSenderKey {
    version: u8,
    chain_key: String,
    signature_public: String,
    message_index: u32,
    #[serde(default)]
    generation: u32,
}

/// Encode exported sender-key material as JSON.
pub fn encode_sender_key(export: &SenderKeyExport) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&to_raw(export))?)
}

/// Decode sender-key material, rejecting unknown versions and fields.
pub fn decode_sender_key(text: &str) -> Result<SenderKeyExport, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    sender_key_from_value(value)
}

pub(crate) fn sender_key_to_value(export: &SenderKeyExport) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(to_raw(export))?)
}

pub(crate) fn sender_key_from_value(value: Value) -> Result<SenderKeyExport, CodecError> {
    let probe = VersionProbe::deserialize(&value)?;
    if probe.version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion { version: probe.version });
    }

    let raw = RawSenderKey::deserialize(value)?;
    Ok(SenderKeyExport {
        chain_key: fields::decode_array("chainKey", &raw.chain_key)?,
        signing_public: fields::decode_array("signaturePublic", &raw.signature_public)?,
        message_index: raw.message_index,
        generation: raw.generation,
    })
}

fn to_raw(export: &SenderKeyExport) -> RawSenderKey {
    RawSenderKey {
        version: PROTOCOL_VERSION,
        chain_key: fields::encode(&export.chain_key),
        signature_public: fields::encode(&export.signing_public),
        message_index: export.message_index,
        generation: export.generation,
    }
}
