//! Fuzz target for group receivers under adversarial delivery
//!
//! A sender produces a batch of genuine messages; the fuzzer then delivers,
//! replays, reorders and corrupts them against one receiver.
//!
//! # Invariants
//!
//! - A genuine message decrypts at most once, to its original plaintext
//! - Any flipped bit in ciphertext or signature fails decryption
//! - Forged indices never yield plaintext
//! - No operation panics

#![no_main]

use arbitrary::Arbitrary;
use keyloom_crypto::{GroupSenderKey, GroupSenderKeyReceiver, RatchetError, SkipLimits};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Scenario {
    chain_seed: [u8; 32],
    signing_seed: [u8; 32],
    max_skip: u8,
    messages: Vec<(Vec<u8>, [u8; 12])>,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    /// Deliver message `slot` as sent
    Deliver { slot: u8 },
    /// Deliver with one bit of ciphertext flipped
    FlipCiphertext { slot: u8, bit: u16 },
    /// Deliver with one bit of signature flipped
    FlipSignature { slot: u8, bit: u16 },
    /// Deliver with the index rewritten
    ForgeIndex { slot: u8, index: u32 },
    /// Round-trip the receiver through its persisted form
    Persist,
}

fuzz_target!(|scenario: Scenario| {
    let mut sender = GroupSenderKey::generate(scenario.chain_seed, scenario.signing_seed);
    let limits = SkipLimits { max_skip: u32::from(scenario.max_skip), ..SkipLimits::default() };
    let mut receiver = GroupSenderKeyReceiver::from_public_export(&sender.export_public())
        .expect("export of a fresh sender key is valid")
        .with_skip_limits(limits);

    let sent: Vec<_> = scenario
        .messages
        .iter()
        .take(64)
        .map(|(plaintext, nonce)| {
            let message = sender.encrypt(plaintext, *nonce).expect("chain cannot be exhausted");
            (plaintext.clone(), message)
        })
        .collect();
    if sent.is_empty() {
        return;
    }
    let mut consumed = vec![false; sent.len()];

    for operation in scenario.operations.into_iter().take(256) {
        match operation {
            Operation::Deliver { slot } => {
                let slot = usize::from(slot) % sent.len();
                let (plaintext, message) = &sent[slot];
                match receiver.decrypt(message) {
                    Ok(decrypted) => {
                        assert!(!consumed[slot], "message {slot} decrypted twice");
                        assert_eq!(&decrypted, plaintext);
                        consumed[slot] = true;
                    },
                    Err(RatchetError::DuplicateOrStaleMessage { .. } | RatchetError::SkipTooFar { .. }) => {},
                    Err(err) => panic!("genuine message rejected with {err:?}"),
                }
            },
            Operation::FlipCiphertext { slot, bit } => {
                let mut message = sent[usize::from(slot) % sent.len()].1.clone();
                let bit = usize::from(bit) % (message.ciphertext.len() * 8);
                message.ciphertext[bit / 8] ^= 1 << (bit % 8);
                assert!(receiver.decrypt(&message).is_err());
            },
            Operation::FlipSignature { slot, bit } => {
                let mut message = sent[usize::from(slot) % sent.len()].1.clone();
                let bit = usize::from(bit) % (message.signature.len() * 8);
                message.signature[bit / 8] ^= 1 << (bit % 8);
                assert_eq!(receiver.decrypt(&message), Err(RatchetError::InvalidSignature));
            },
            Operation::ForgeIndex { slot, index } => {
                let mut message = sent[usize::from(slot) % sent.len()].1.clone();
                if message.message_index == index {
                    continue;
                }
                message.message_index = index;
                assert!(receiver.decrypt(&message).is_err());
            },
            Operation::Persist => {
                let blob = receiver.serialize().expect("receiver serializes");
                receiver = GroupSenderKeyReceiver::deserialize(&blob)
                    .expect("receiver restores")
                    .with_skip_limits(limits);
            },
        }
    }
});
