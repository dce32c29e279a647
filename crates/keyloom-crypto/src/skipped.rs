//! Bounded cache of message keys passed over during skip-ahead.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::chain::MessageKey;

/// Limits on skip-ahead work and on the skipped-key cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipLimits {
    /// Maximum number of keys derived to reach a single message
    pub max_skip: u32,
    /// Maximum number of skipped keys kept after pruning
    pub max_retained: usize,
}

impl SkipLimits {
    /// Default skip cap.
    pub const DEFAULT_MAX_SKIP: u32 = 1000;
    /// Default retention window.
    pub const DEFAULT_MAX_RETAINED: usize = 100;
}

impl Default for SkipLimits {
    fn default() -> Self {
        Self { max_skip: Self::DEFAULT_MAX_SKIP, max_retained: Self::DEFAULT_MAX_RETAINED }
    }
}

/// Skipped message keys in insertion order.
///
/// # Invariants
///
/// - Each id appears at most once
/// - A key is handed out by [`take()`](Self::take) at most once
/// - After [`prune()`](Self::prune) only the most recently inserted entries
///   remain
#[derive(Clone, Serialize, Deserialize)]
pub struct SkippedKeys<K> {
    entries: VecDeque<(K, MessageKey)>,
}

impl<K: PartialEq> SkippedKeys<K> {
    /// Empty cache.
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a key for `id` is cached.
    pub fn contains(&self, id: &K) -> bool {
        self.entries.iter().any(|(k, _)| k == id)
    }

    /// Cache a key. Ids come from a monotonically advancing chain, so they
    /// are never already present.
    pub fn insert(&mut self, id: K, key: MessageKey) {
        debug_assert!(!self.contains(&id));
        self.entries.push_back((id, key));
    }

    /// Remove and return the key for `id`.
    pub fn take(&mut self, id: &K) -> Option<MessageKey> {
        let position = self.entries.iter().position(|(k, _)| k == id)?;
        self.entries.remove(position).map(|(_, key)| key)
    }

    /// Drop the oldest entries until at most `max_retained` remain.
    pub fn prune(&mut self, max_retained: usize) {
        while self.entries.len() > max_retained {
            self.entries.pop_front();
        }
    }
}

impl<K: PartialEq> Default for SkippedKeys<K> {
    fn default() -> Self {
        Self::new()
    }
}
