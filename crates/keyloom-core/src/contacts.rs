//! Contact and membership lookup.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, RwLock},
};

/// Resolves contacts to long-term keys and groups to members.
pub trait ContactDirectory: Send + Sync {
    /// Long-term X25519 public key of `contact`, if known.
    ///
    /// Implementations may return an all-zero placeholder for contacts whose
    /// key has not been fetched yet; the directories treat it as absent.
    fn agreement_public_key(&self, contact: &str) -> Option<[u8; 32]>;

    /// Long-term Ed25519 public key of `contact`, if known.
    ///
    /// Group receivers are filed under this key, so it decides which
    /// sender a distributed key may be installed for. An all-zero value is
    /// treated as absent.
    fn signing_public_key(&self, contact: &str) -> Option<[u8; 32]>;

    /// Current members of `group`. May include the local user.
    fn group_members(&self, group: &str) -> Vec<String>;
}

/// In-memory contact book.
///
/// Clones share state. Uses `expect()` on the lock, which panics only if a
/// writer panicked while holding it.
#[derive(Clone, Default)]
pub struct MemoryContacts {
    inner: Arc<RwLock<ContactsInner>>,
}

#[derive(Default)]
struct ContactsInner {
    keys: HashMap<String, [u8; 32]>,
    signing_keys: HashMap<String, [u8; 32]>,
    groups: HashMap<String, BTreeSet<String>>,
}

impl MemoryContacts {
    /// Empty contact book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a contact's agreement key.
    #[allow(clippy::expect_used)]
    pub fn insert_contact(&self, contact: impl Into<String>, agreement_public_key: [u8; 32]) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.keys.insert(contact.into(), agreement_public_key);
    }

    /// Record a contact's signing key.
    #[allow(clippy::expect_used)]
    pub fn insert_signing_key(&self, contact: impl Into<String>, signing_public_key: [u8; 32]) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.signing_keys.insert(contact.into(), signing_public_key);
    }

    /// Add `contact` to `group`.
    #[allow(clippy::expect_used)]
    pub fn add_member(&self, group: impl Into<String>, contact: impl Into<String>) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.groups.entry(group.into()).or_default().insert(contact.into());
    }

    /// Remove `contact` from `group`.
    #[allow(clippy::expect_used)]
    pub fn remove_member(&self, group: &str, contact: &str) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        if let Some(members) = inner.groups.get_mut(group) {
            members.remove(contact);
        }
    }
}

impl ContactDirectory for MemoryContacts {
    #[allow(clippy::expect_used)]
    fn agreement_public_key(&self, contact: &str) -> Option<[u8; 32]> {
        self.inner.read().expect("RwLock poisoned").keys.get(contact).copied()
    }

    #[allow(clippy::expect_used)]
    fn signing_public_key(&self, contact: &str) -> Option<[u8; 32]> {
        self.inner.read().expect("RwLock poisoned").signing_keys.get(contact).copied()
    }

    #[allow(clippy::expect_used)]
    fn group_members(&self, group: &str) -> Vec<String> {
        let inner = self.inner.read().expect("RwLock poisoned");
        inner.groups.get(group).map(|members| members.iter().cloned().collect()).unwrap_or_default()
    }
}
