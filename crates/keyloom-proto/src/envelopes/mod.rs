//! Typed envelopes for each message shape.
//!
//! Each envelope parses through a private raw struct whose byte fields are
//! hex strings, then converts into key-sized arrays. Field names are the
//! compatibility surface and are fixed in camelCase.

pub mod group;
pub mod pairwise;
pub mod sender_key;

pub use group::GroupEnvelope;
pub use pairwise::PairwiseEnvelope;
pub use sender_key::{decode_sender_key, encode_sender_key};
