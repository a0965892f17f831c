//! Keyed async mutexes serialising create/join per user and per session.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Prune idle entries once the table grows past this many keys
const PRUNE_THRESHOLD: usize = 1024;

/// Thread-safe table of named locks using dashmap
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting for any current holder.
    pub async fn lock(&self, key: String) -> OwnedMutexGuard<()> {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune_idle();
        }

        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Lock held for the duration of a user's create or join.
    ///
    /// Callers that also need a session lock must take this one first.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.lock(format!("user:{}", user_id)).await
    }

    /// Lock held while a session's capacity is checked and consumed
    pub async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        self.lock(format!("session:{}", session_id)).await
    }

    /// Drop entries nobody holds or waits on
    pub fn prune_idle(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    /// Number of tracked keys (for monitoring)
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let table = Arc::new(LockTable::new());
        let guard = table.lock_user("alice").await;

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move {
                let _guard = table.lock_user("alice").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second holder should be waiting");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let table = LockTable::new();
        let _alice = table.lock_user("alice").await;
        let _session = table.lock_session("alice").await;
        let bob = tokio::time::timeout(Duration::from_millis(100), table.lock_user("bob")).await;
        assert!(bob.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let table = LockTable::new();
        let held = table.lock_user("alice").await;
        drop(table.lock_user("bob").await);
        assert_eq!(table.len(), 2);

        table.prune_idle();
        assert_eq!(table.len(), 1);

        drop(held);
        table.prune_idle();
        assert!(table.is_empty());
    }
}
