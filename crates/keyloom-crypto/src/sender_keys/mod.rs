//! Sender Keys for group messaging.
//!
//! Each member encrypts group traffic once under its own symmetric ratchet and
//! signs the result with a per-group Ed25519 key. Other members hold a copy of
//! the chain (distributed pairwise) and verify, then decrypt.
//!
//! Forward secrecy is per sender: a captured chain key reveals that sender's
//! future messages but none of the earlier ones. Removing a member requires
//! every remaining sender to rotate, since the removed member still holds the
//! old chains.

mod receiver;
mod sender;

pub use receiver::GroupSenderKeyReceiver;
pub use sender::{EncryptedGroupMessage, GroupSenderKey, SenderKeyExport};
