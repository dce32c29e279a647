//! Fuzz target for pairwise sessions under hostile input
//!
//! Bootstraps a genuine session pair, then hands the receiving side
//! attacker-controlled headers and ciphertexts.
//!
//! # Invariants
//!
//! - A rejected message leaves the session byte-for-byte unchanged
//! - A genuine message sent after the hostile ones still decrypts
//! - No input panics

#![no_main]

use arbitrary::Arbitrary;
use keyloom_crypto::{EncryptedMessage, Header, PairwiseSession, primitives::x25519_public};
use libfuzzer_sys::fuzz_target;

const AD: &[u8] = b"fuzz";

#[derive(Debug, Arbitrary)]
struct Scenario {
    hostile: Vec<HostileMessage>,
    ratchet_seed: [u8; 32],
}

#[derive(Debug, Arbitrary)]
struct HostileMessage {
    ratchet_public: [u8; 32],
    previous_chain_length: u32,
    chain_length: u32,
    ciphertext: Vec<u8>,
}

fuzz_target!(|scenario: Scenario| {
    let bob_secret = [0x42; 32];
    let mut alice = PairwiseSession::new();
    let bootstrap = alice
        .initialize_as_sender(&x25519_public(&bob_secret), [1; 32], [2; 32], AD, b"hello")
        .expect("fixed keys are valid");

    let mut bob = PairwiseSession::new();
    bob.initialize_as_receiver(&bob_secret, &bootstrap.ephemeral_public, &bootstrap.message, [3; 32], AD)
        .expect("genuine bootstrap decrypts");

    for hostile in scenario.hostile.into_iter().take(32) {
        let message = EncryptedMessage {
            header: Header {
                ratchet_public: hostile.ratchet_public,
                previous_chain_length: hostile.previous_chain_length,
                chain_length: hostile.chain_length,
            },
            ciphertext: hostile.ciphertext,
        };
        let before = bob.serialize().expect("session serializes");
        if bob.decrypt(&message, scenario.ratchet_seed).is_err() {
            assert_eq!(bob.serialize().expect("session serializes"), before);
        }
    }

    let genuine = alice.encrypt(b"still works").expect("sender is initialized");
    assert_eq!(bob.decrypt(&genuine, scenario.ratchet_seed).ok(), Some(b"still works".to_vec()));
});
