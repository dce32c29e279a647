//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Every
//! store commits before returning, so ratchet state survives restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, TableDefinition};

use super::{SENDER_KEY_SIZE, Storage, StorageError};

/// Table: sessions
/// Key: contact id
/// Value: versioned pairwise session blob
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Table: receivers
/// Key: `[group_len: 4 bytes BE][group bytes][sender: 32 bytes]`
/// Value: versioned group receiver blob
const RECEIVERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("receivers");

/// Table: `sender_keys`
/// Key: group id
/// Value: versioned local sender key blob
const SENDER_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("sender_keys");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

fn io(err: impl ToString) -> StorageError {
    StorageError::Io(err.to_string())
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(SESSIONS).map_err(io)?;
            let _ = txn.open_table(RECEIVERS).map_err(io)?;
            let _ = txn.open_table(SENDER_KEYS).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put_str(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        blob: &[u8],
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(table).map_err(io)?;
            table.insert(key, blob).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    fn get_str(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(table).map_err(io)?;
        Ok(table.get(key).map_err(io)?.map(|value| value.value().to_vec()))
    }

    fn remove_str(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(table).map_err(io)?;
            table.remove(key).map_err(io)?;
        }
        txn.commit().map_err(io)
    }
}

impl Storage for RedbStorage {
    fn load_session(&self, contact: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.get_str(SESSIONS, contact)
    }

    fn store_session(&self, contact: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.put_str(SESSIONS, contact, blob)
    }

    fn delete_session(&self, contact: &str) -> Result<(), StorageError> {
        self.remove_str(SESSIONS, contact)
    }

    fn load_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(RECEIVERS).map_err(io)?;

        let key = encode_receiver_key(group, sender);
        Ok(table.get(key.as_slice()).map_err(io)?.map(|value| value.value().to_vec()))
    }

    fn store_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
        blob: &[u8],
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(RECEIVERS).map_err(io)?;
            let key = encode_receiver_key(group, sender);
            table.insert(key.as_slice(), blob).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    fn delete_receiver(
        &self,
        group: &str,
        sender: &[u8; SENDER_KEY_SIZE],
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(RECEIVERS).map_err(io)?;
            let key = encode_receiver_key(group, sender);
            table.remove(key.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    fn list_receivers(&self, group: &str) -> Result<Vec<[u8; SENDER_KEY_SIZE]>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(RECEIVERS).map_err(io)?;

        let start = encode_receiver_key(group, &[0u8; SENDER_KEY_SIZE]);
        let end = encode_receiver_key(group, &[0xFF; SENDER_KEY_SIZE]);

        let mut senders = Vec::new();
        for result in table.range(start.as_slice()..=end.as_slice()).map_err(io)? {
            let (key, _) = result.map_err(io)?;
            senders.push(decode_receiver_sender(key.value())?);
        }

        Ok(senders)
    }

    fn load_sender_key(&self, group: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.get_str(SENDER_KEYS, group)
    }

    fn store_sender_key(&self, group: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.put_str(SENDER_KEYS, group, blob)
    }

    fn delete_sender_key(&self, group: &str) -> Result<(), StorageError> {
        self.remove_str(SENDER_KEYS, group)
    }
}

/// Encode (group, sender) as a length-prefixed key.
///
/// Layout: `[group_len: 4 bytes BE][group bytes][sender: 32 bytes]`
/// The length prefix keeps one group's range from overlapping another whose
/// id shares a prefix.
fn encode_receiver_key(group: &str, sender: &[u8; SENDER_KEY_SIZE]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + group.len() + SENDER_KEY_SIZE);
    key.extend_from_slice(&(group.len() as u32).to_be_bytes());
    key.extend_from_slice(group.as_bytes());
    key.extend_from_slice(sender);
    key
}

/// Sender half of a receiver key.
fn decode_receiver_sender(key: &[u8]) -> Result<[u8; SENDER_KEY_SIZE], StorageError> {
    let tail = key
        .len()
        .checked_sub(SENDER_KEY_SIZE)
        .map(|start| &key[start..])
        .ok_or_else(|| StorageError::Serialization("receiver key too short".to_string()))?;

    let mut sender = [0u8; SENDER_KEY_SIZE];
    sender.copy_from_slice(tail);
    Ok(sender)
}
