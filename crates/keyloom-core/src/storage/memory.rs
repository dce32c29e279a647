use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use super::{SENDER_KEY_SIZE, Storage, StorageError};

type ReceiverKey = (String, [u8; SENDER_KEY_SIZE]);

/// In-memory storage for tests and simulation.
///
/// All state sits behind one `Arc<Mutex<_>>`, so clones share it. Uses
/// `lock().expect()`, which panics if the mutex is poisoned; acceptable for
/// test code.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    sessions: HashMap<String, Vec<u8>>,
    /// Ordered so `list_receivers` is a range scan
    receivers: BTreeMap<ReceiverKey, Vec<u8>>,
    sender_keys: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pairwise sessions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn session_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").sessions.len()
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn load_session(&self, contact: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").sessions.get(contact).cloned())
    }

    #[allow(clippy::expect_used)]
    fn store_session(&self, contact: &str, blob: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.sessions.insert(contact.to_string(), blob.to_vec());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn delete_session(&self, contact: &str) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").sessions.remove(contact);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.receivers.get(&(group.to_string(), *sender)).cloned())
    }

    #[allow(clippy::expect_used)]
    fn store_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
        blob: &[u8],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.receivers.insert((group.to_string(), *sender), blob.to_vec());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn delete_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.receivers.remove(&(group.to_string(), *sender));
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn list_receivers(&self, group: &str) -> Result<Vec<[u8; SENDER_KEY_SIZE]>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        let start = (group.to_string(), [0u8; SENDER_KEY_SIZE]);
        let end = (group.to_string(), [0xFF; SENDER_KEY_SIZE]);
        Ok(inner.receivers.range(start..=end).map(|((_, sender), _)| *sender).collect())
    }

    #[allow(clippy::expect_used)]
    fn load_sender_key(&self, group: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").sender_keys.get(group).cloned())
    }

    #[allow(clippy::expect_used)]
    fn store_sender_key(&self, group: &str, blob: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.sender_keys.insert(group.to_string(), blob.to_vec());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn delete_sender_key(&self, group: &str) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").sender_keys.remove(group);
        Ok(())
    }
}
