//! Per-key async mutual exclusion.
//!
//! Operations on different contacts (or different group senders) run
//! concurrently; operations on the same key queue behind one another, so a
//! load-mutate-store cycle never races with another for that key.

use std::{collections::HashMap, hash::Hash, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

pub(crate) struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub(crate) fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    /// Wait for exclusive access to `key`.
    pub(crate) async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on are dropped so the map tracks
            // only live keys.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock(&"bob".to_string()).await;
                let before = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::task::yield_now().await;
                assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), before + 1);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _bob = locks.lock(&"bob".to_string()).await;

        let carol =
            tokio::time::timeout(Duration::from_millis(100), locks.lock(&"carol".to_string()))
                .await;
        assert!(carol.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.lock(&1u32).await;
        }
        let _b = locks.lock(&2u32).await;
        assert_eq!(locks.tracked().await, 1);
    }
}
