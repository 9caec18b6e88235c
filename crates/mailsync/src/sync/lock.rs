//! Per-account sync lock with a TTL
//!
//! The lock is a conditional write against the store, so it excludes other
//! processes sharing the same database, not just other threads. A crashed
//! holder's lock simply expires.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::models::AccountId;
use crate::storage::MailStore;

/// Acquires and releases TTL sync locks through the store
pub struct SyncLockManager {
    store: Arc<dyn MailStore>,
    ttl: Duration,
}

impl SyncLockManager {
    pub fn new(store: Arc<dyn MailStore>, ttl_secs: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Try to take the lock. False means another sync holds it, which callers
    /// treat as a skip, not an error.
    pub fn acquire(&self, account_id: &AccountId) -> Result<bool> {
        self.store
            .try_acquire_sync_lock(account_id, Utc::now(), self.ttl)
    }

    pub fn release(&self, account_id: &AccountId) -> Result<()> {
        self.store.release_sync_lock(account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MailboxAccount;
    use crate::storage::InMemoryMailStore;

    fn setup() -> (Arc<InMemoryMailStore>, AccountId) {
        let store = Arc::new(InMemoryMailStore::new());
        store
            .upsert_account(MailboxAccount::new("acc-1", "user-1", "a@example.com"))
            .unwrap();
        (store, AccountId::new("acc-1"))
    }

    #[test]
    fn test_acquire_then_miss_then_release() {
        let (store, id) = setup();
        let locks = SyncLockManager::new(store, 300);

        assert!(locks.acquire(&id).unwrap());
        assert!(!locks.acquire(&id).unwrap());

        locks.release(&id).unwrap();
        assert!(locks.acquire(&id).unwrap());
    }

    #[test]
    fn test_expired_lock_is_reacquirable() {
        let (store, id) = setup();
        // Zero TTL: the lock expires immediately
        let locks = SyncLockManager::new(store, 0);

        assert!(locks.acquire(&id).unwrap());
        assert!(locks.acquire(&id).unwrap());
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let (store, id) = setup();
        let locks = Arc::new(SyncLockManager::new(store, 300));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            handles.push(std::thread::spawn(move || locks.acquire(&id).unwrap()));
        }

        let acquired: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(acquired, 1);
    }
}
