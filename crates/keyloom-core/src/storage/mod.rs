//! Storage abstraction for ratchet state.
//!
//! Blobs are opaque: the crypto layer produces versioned bytes and the store
//! keeps them as-is. The trait is synchronous; directories call it while
//! holding the per-key lock, so a load-mutate-store cycle is never interleaved
//! with another for the same key.

mod error;
mod memory;
mod redb;

pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// Size of a group sender identity key.
pub const SENDER_KEY_SIZE: usize = 32;

/// Durable home for pairwise sessions, group receivers and local sender keys.
///
/// Must be Clone (shared by the session and group directories), Send + Sync,
/// and synchronous. Implementations share state via Arc, so clones see the
/// same data.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Pairwise session blob for a contact. `None` if no session exists.
    fn load_session(&self, contact: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a contact's session blob, replacing any existing one.
    fn store_session(&self, contact: &str, blob: &[u8]) -> Result<(), StorageError>;

    /// Remove a contact's session. Removing a missing session is not an
    /// error.
    fn delete_session(&self, contact: &str) -> Result<(), StorageError>;

    /// Receiver blob for one sender in one group.
    fn load_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
    ) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a receiver blob, replacing any existing one.
    fn store_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
        blob: &[u8],
    ) -> Result<(), StorageError>;

    /// Remove a receiver. Removing a missing receiver is not an error.
    fn delete_receiver(&self, group: &str, sender: &[u8; SENDER_KEY_SIZE])
    -> Result<(), StorageError>;

    /// Senders with a stored receiver in `group`, in ascending key order.
    fn list_receivers(&self, group: &str) -> Result<Vec<[u8; SENDER_KEY_SIZE]>, StorageError>;

    /// The local sender key for a group.
    fn load_sender_key(&self, group: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store the local sender key for a group, replacing any existing one.
    fn store_sender_key(&self, group: &str, blob: &[u8]) -> Result<(), StorageError>;

    /// Remove the local sender key for a group.
    fn delete_sender_key(&self, group: &str) -> Result<(), StorageError>;
}
