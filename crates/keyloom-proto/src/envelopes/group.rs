//! Group message envelope.
//!
//! ```json
//! {
//!   "senderPublicKey": "<hex>",
//!   "ciphertext": "<hex>",
//!   "signature": "<hex>",
//!   "messageIndex": 0
//! }
//! ```

use keyloom_crypto::{EncryptedGroupMessage, KEY_SIZE};
use serde::{Deserialize, Serialize};

use crate::{error::CodecError, fields};

/// A group ciphertext broadcast to every member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEnvelope {
    /// Identity of the sending member; selects the receiver chain
    pub sender_public_key: [u8; KEY_SIZE],
    /// Signed ciphertext and chain index
    pub message: EncryptedGroupMessage,
}

impl GroupEnvelope {
    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&RawGroup::from_envelope(self))?)
    }

    /// Decode from JSON. Unknown fields are rejected.
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        let raw: RawGroup = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RawGroup {
    sender_public_key: String,
    ciphertext: String,
    signature: String,
    message_index: u32,
}

impl RawGroup {
    pub(crate) fn from_envelope(envelope: &GroupEnvelope) -> Self {
        Self {
            sender_public_key: fields::encode(&envelope.sender_public_key),
            ciphertext: fields::encode(&envelope.message.ciphertext),
            signature: fields::encode(&envelope.message.signature),
            message_index: envelope.message.message_index,
        }
    }
}

impl GroupEnvelope {
    pub(crate) fn from_raw(raw: RawGroup) -> Result<Self, CodecError> {
        Ok(Self {
            sender_public_key: fields::decode_array("senderPublicKey", &raw.sender_public_key)?,
            message: EncryptedGroupMessage {
                ciphertext: fields::decode_vec("ciphertext", &raw.ciphertext)?,
                signature: fields::decode_array("signature", &raw.signature)?,
                message_index: raw.message_index,
            },
        })
    }
}
