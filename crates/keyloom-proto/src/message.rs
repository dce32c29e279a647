//! Tagged union over every message shape.
//!
//! ```json
//! { "kind": "pairwise", "body": { "header": { ... }, "ciphertext": "..." } }
//! ```
//!
//! Transports that multiplex all traffic over one channel decode through
//! [`WireMessage`]; the tag selects exactly one schema and anything else fails
//! to parse.
//!
//! # Invariants
//!
//! - Each variant maps to exactly one `kind` string
//! - Encoding then decoding yields an equal value

use keyloom_crypto::SenderKeyExport;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    envelopes::{
        GroupEnvelope, PairwiseEnvelope, group::RawGroup, pairwise::RawPairwise,
        sender_key::{sender_key_from_value, sender_key_to_value},
    },
    error::CodecError,
};

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Pairwise ciphertext, optionally carrying a bootstrap ephemeral key
    Pairwise(PairwiseEnvelope),
    /// Group ciphertext signed by a sender key
    Group(GroupEnvelope),
    /// Sender-key material; only ever the plaintext of a pairwise message
    SenderKey(SenderKeyExport),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "camelCase", deny_unknown_fields)]
enum RawWireMessage {
    Pairwise(RawPairwise),
    Group(RawGroup),
    SenderKey(Value),
}

impl WireMessage {
    /// Wire tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pairwise(_) => "pairwise",
            Self::Group(_) => "group",
            Self::SenderKey(_) => "senderKey",
        }
    }

    /// Encode as tagged JSON.
    pub fn encode(&self) -> Result<String, CodecError> {
        let raw = match self {
            Self::Pairwise(envelope) => RawWireMessage::Pairwise(RawPairwise::from_envelope(envelope)),
            Self::Group(envelope) => RawWireMessage::Group(RawGroup::from_envelope(envelope)),
            Self::SenderKey(export) => RawWireMessage::SenderKey(sender_key_to_value(export)?),
        };
        Ok(serde_json::to_string(&raw)?)
    }

    /// Decode tagged JSON.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let raw: RawWireMessage = serde_json::from_str(text)?;
        Ok(match raw {
            RawWireMessage::Pairwise(body) => Self::Pairwise(PairwiseEnvelope::from_raw(body)?),
            RawWireMessage::Group(body) => Self::Group(GroupEnvelope::from_raw(body)?),
            RawWireMessage::SenderKey(body) => Self::SenderKey(sender_key_from_value(body)?),
        })
    }
}

impl From<PairwiseEnvelope> for WireMessage {
    fn from(envelope: PairwiseEnvelope) -> Self {
        Self::Pairwise(envelope)
    }
}

impl From<GroupEnvelope> for WireMessage {
    fn from(envelope: GroupEnvelope) -> Self {
        Self::Group(envelope)
    }
}
