//! Keyloom wire codec.
//!
//! Stateless conversion between the typed structures of `keyloom-crypto` and
//! their JSON wire form. Byte fields are lowercase hex; field names are fixed
//! camelCase and are the compatibility-sensitive surface.
//!
//! Decoding is schema-driven: a missing field, an unknown field, a malformed
//! hex string or a wrong-sized key fails with [`CodecError`] rather than
//! defaulting. No business logic lives here.
//!
//! # Message shapes
//!
//! - [`PairwiseEnvelope`]: header, ciphertext, and the bootstrap ephemeral key
//!   on the first message of a session
//! - [`GroupEnvelope`]: sender identity, signed ciphertext, chain index
//! - Sender-key export: versioned chain key and signing key, carried as the
//!   plaintext of a pairwise message
//!
//! [`WireMessage`] unions the three for transports that multiplex them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod envelopes;
pub mod error;
mod fields;
pub mod message;

pub use envelopes::{GroupEnvelope, PairwiseEnvelope, decode_sender_key, encode_sender_key};
pub use error::CodecError;
pub use message::WireMessage;
