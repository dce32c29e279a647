//! Fuzz target for persisted state blobs
//!
//! Storage is outside the trust boundary of the ratchet: a corrupted or
//! hostile blob must be rejected, never panic.
//!
//! # Invariants
//!
//! - `deserialize` never panics for any object type
//! - A blob that deserializes re-serializes to a blob that deserializes

#![no_main]

use libfuzzer_sys::fuzz_target;
use keyloom_crypto::{GroupSenderKey, GroupSenderKeyReceiver, PairwiseSession};

fuzz_target!(|data: &[u8]| {
    if let Ok(session) = PairwiseSession::deserialize(data) {
        let blob = session.serialize().expect("restored session must serialize");
        assert!(PairwiseSession::deserialize(&blob).is_ok());
    }

    if let Ok(sender) = GroupSenderKey::deserialize(data) {
        let blob = sender.serialize().expect("restored sender key must serialize");
        assert!(GroupSenderKey::deserialize(&blob).is_ok());
    }

    if let Ok(receiver) = GroupSenderKeyReceiver::deserialize(data) {
        let blob = receiver.serialize().expect("restored receiver must serialize");
        assert!(GroupSenderKeyReceiver::deserialize(&blob).is_ok());
    }
});
