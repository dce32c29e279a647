//! Fuzz target for wire decoding
//!
//! Feeds arbitrary text to every decoder in `keyloom-proto`.
//!
//! # Invariants
//!
//! - Decoding never panics
//! - Anything that decodes re-encodes and decodes to the same value

#![no_main]

use libfuzzer_sys::fuzz_target;
use keyloom_proto::{GroupEnvelope, PairwiseEnvelope, WireMessage, decode_sender_key, encode_sender_key};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(message) = WireMessage::decode(text) {
        let encoded = message.encode().expect("decoded message must re-encode");
        let again = WireMessage::decode(&encoded).expect("re-encoded message must decode");
        assert_eq!(again, message);
    }

    if let Ok(envelope) = PairwiseEnvelope::from_json(text) {
        let encoded = envelope.to_json().expect("envelope must re-encode");
        assert_eq!(PairwiseEnvelope::from_json(&encoded).ok(), Some(envelope));
    }

    if let Ok(envelope) = GroupEnvelope::from_json(text) {
        let encoded = envelope.to_json().expect("envelope must re-encode");
        assert_eq!(GroupEnvelope::from_json(&encoded).ok(), Some(envelope));
    }

    if let Ok(export) = decode_sender_key(text) {
        let encoded = encode_sender_key(&export).expect("export must re-encode");
        assert_eq!(decode_sender_key(&encoded).ok(), Some(export));
    }
});
