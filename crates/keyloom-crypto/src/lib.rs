//! Keyloom Cryptographic Core
//!
//! Pairwise double ratchet and group Sender Keys. Pure, synchronous functions
//! with no internal randomness: callers provide every random seed and nonce,
//! which keeps tests deterministic and leaves entropy policy to the caller.
//!
//! # Key Lifecycle
//!
//! Pairwise sessions are bootstrapped by one X25519 exchange and then driven
//! by a DH ratchet over two hash chains. Group messages use a per-sender
//! symmetric chain whose seed is distributed to members over pairwise
//! sessions.
//!
//! ```text
//! Ephemeral × Long-term X25519          Random chain seed
//!        │                                     │
//!        ▼                                     ▼
//! HKDF → Root Key ◄── DH ratchet        Sender Key (per group, per sender)
//!        │                                     │
//!        ▼                                     ▼
//! Sending / Receiving chains            Symmetric Ratchet
//!        │                                     │
//!        ▼                                     ▼
//! ChaCha20-Poly1305 + header AD         ChaCha20-Poly1305 + Ed25519 signature
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain keys advance through a one-way HMAC and are zeroized when replaced
//! - Message keys are used once; skipped keys are consumed exactly once
//!
//! Break-in Recovery (pairwise):
//! - Every new peer ratchet key mixes a fresh DH output into the root key
//!
//! Authenticity:
//! - Pairwise headers are bound to the ciphertext as associated data
//! - Group ciphertexts are signed by the sender's per-group Ed25519 key and
//!   verified before any key derivation
//!
//! Bounded Work:
//! - Skip-ahead is capped (default 1000 keys) and the skipped-key cache is
//!   pruned to a retention window (default 100 keys)
//!
//! # Handshake
//!
//! Bootstrap uses a single DH between the initiator's ephemeral key and the
//! responder's long-term key. There are no signed pre-keys and no
//! identity-to-identity DH, so a leaked long-term key exposes every session
//! bootstrapped to it until the first DH ratchet step.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chain;
pub mod error;
pub mod pairwise;
mod persist;
pub mod primitives;
pub mod sender_keys;
pub mod skipped;

pub use chain::{KeyDomain, MessageKey, SymmetricRatchet};
pub use error::{RatchetError, Recovery};
pub use pairwise::{EncryptedMessage, Header, PairwiseSession, SenderBootstrap};
pub use persist::PROTOCOL_VERSION;
pub use primitives::{KEY_SIZE, NONCE_SIZE, SIGNATURE_SIZE};
pub use sender_keys::{
    EncryptedGroupMessage, GroupSenderKey, GroupSenderKeyReceiver, SenderKeyExport,
};
pub use skipped::{SkipLimits, SkippedKeys};
