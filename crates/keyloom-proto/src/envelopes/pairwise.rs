//! Pairwise message envelope.
//!
//! ```json
//! {
//!   "header": { "ratchetPub": "<hex>", "prevChainLen": 0, "chainLen": 1 },
//!   "ciphertext": "<hex>",
//!   "ephemeralKey": "<hex>"
//! }
//! ```
//!
//! `ephemeralKey` is present only on the first message of a session.

use keyloom_crypto::{EncryptedMessage, Header, KEY_SIZE, SenderBootstrap};
use serde::{Deserialize, Serialize};

use crate::{error::CodecError, fields};

/// A pairwise ciphertext as it travels between two devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairwiseEnvelope {
    /// Header and ciphertext
    pub message: EncryptedMessage,
    /// Sender's bootstrap ephemeral key; set on the first message only
    pub ephemeral_key: Option<[u8; KEY_SIZE]>,
}

impl PairwiseEnvelope {
    /// Envelope for a steady-state message.
    pub fn steady(message: EncryptedMessage) -> Self {
        Self { message, ephemeral_key: None }
    }

    /// Whether this envelope bootstraps a session.
    pub fn is_bootstrap(&self) -> bool {
        self.ephemeral_key.is_some()
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&RawPairwise::from_envelope(self))?)
    }

    /// Decode from JSON. Unknown fields are rejected.
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        let raw: RawPairwise = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }
}

impl From<SenderBootstrap> for PairwiseEnvelope {
    fn from(bootstrap: SenderBootstrap) -> Self {
        Self { message: bootstrap.message, ephemeral_key: Some(bootstrap.ephemeral_public) }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawHeader {
    ratchet_pub: String,
    prev_chain_len: u32,
    chain_len: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RawPairwise {
    header: RawHeader,
    ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ephemeral_key: Option<String>,
}

impl RawPairwise {
    pub(crate) fn from_envelope(envelope: &PairwiseEnvelope) -> Self {
        let header = &envelope.message.header;
        Self {
            header: RawHeader {
                ratchet_pub: fields::encode(&header.ratchet_public),
                prev_chain_len: header.previous_chain_length,
                chain_len: header.chain_length,
            },
            ciphertext: fields::encode(&envelope.message.ciphertext),
            ephemeral_key: envelope.ephemeral_key.as_ref().map(|key| fields::encode(key)),
        }
    }
}

impl PairwiseEnvelope {
    pub(crate) fn from_raw(raw: RawPairwise) -> Result<Self, CodecError> {
        let header = Header {
            ratchet_public: fields::decode_array("ratchetPub", &raw.header.ratchet_pub)?,
            previous_chain_length: raw.header.prev_chain_len,
            chain_length: raw.header.chain_len,
        };
        let ciphertext = fields::decode_vec("ciphertext", &raw.ciphertext)?;
        let ephemeral_key = raw
            .ephemeral_key
            .as_deref()
            .map(|text| fields::decode_array("ephemeralKey", text))
            .transpose()?;

        Ok(Self { message: EncryptedMessage { header, ciphertext }, ephemeral_key })
    }
}
