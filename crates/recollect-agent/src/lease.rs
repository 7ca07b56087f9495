// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! At-most-one extraction in flight per conversation and per transcript hash.
//!
//! A [`Lease`] holds two owned mutex guards: one keyed by conversation id and
//! one by first-message hash, always taken in that order. Dropping the lease
//! releases both, whatever path the holder took to get there.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

#[derive(Clone, Default)]
pub struct ExtractionLeases {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held while a transcript is being extracted and indexed.
pub struct Lease {
    keys: [String; 2],
    guards: Option<(OwnedMutexGuard<()>, OwnedMutexGuard<()>)>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

fn conversation_key(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

fn hash_key(first_message_hash: &str) -> String {
    format!("hash:{first_message_hash}")
}

impl ExtractionLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for both locks.
    pub async fn acquire(&self, conversation_id: &str, first_message_hash: &str) -> Lease {
        let keys = [conversation_key(conversation_id), hash_key(first_message_hash)];
        let conversation = self.lock_for(&keys[0]).lock_owned().await;
        let hash = self.lock_for(&keys[1]).lock_owned().await;
        trace!(conversation_id, first_message_hash, "extraction lease acquired");
        Lease {
            keys,
            guards: Some((conversation, hash)),
            locks: self.locks.clone(),
        }
    }

    /// Take both locks only if neither is held.
    pub fn try_acquire(&self, conversation_id: &str, first_message_hash: &str) -> Option<Lease> {
        let keys = [conversation_key(conversation_id), hash_key(first_message_hash)];
        let conversation = self.lock_for(&keys[0]).try_lock_owned().ok()?;
        let hash = self.lock_for(&keys[1]).try_lock_owned().ok()?;
        Some(Lease {
            keys,
            guards: Some((conversation, hash)),
            locks: self.locks.clone(),
        })
    }

    pub fn is_conversation_leased(&self, conversation_id: &str) -> bool {
        self.locks
            .get(&conversation_key(conversation_id))
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of lock entries currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        drop(self.guards.take());
        for key in &self.keys {
            // Only the map itself still references an idle lock.
            self.locks
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_conversation_is_exclusive() {
        let leases = ExtractionLeases::new();
        let lease = leases.acquire("c1", "h1").await;
        assert!(leases.is_conversation_leased("c1"));
        assert!(leases.try_acquire("c1", "h2").is_none());
        assert!(leases.try_acquire("c2", "h3").is_some());
        drop(lease);
        assert!(!leases.is_conversation_leased("c1"));
        assert!(leases.try_acquire("c1", "h2").is_some());
    }

    #[tokio::test]
    async fn same_hash_is_exclusive_across_conversations() {
        let leases = ExtractionLeases::new();
        let _lease = leases.acquire("c1", "shared").await;
        assert!(leases.try_acquire("c2", "shared").is_none());
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let leases = ExtractionLeases::new();
        let first = leases.acquire("c1", "h").await;

        let waiter = {
            let leases = leases.clone();
            tokio::spawn(async move {
                let _lease = leases.acquire("c1", "h").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn idle_locks_are_removed() {
        let leases = ExtractionLeases::new();
        drop(leases.acquire("c1", "h1").await);
        assert_eq!(leases.tracked(), 0);
    }
}
