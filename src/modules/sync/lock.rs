use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per account uid. Holding the guard excludes every other sync
/// of the same account.
#[derive(Default, Clone)]
pub struct SyncLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SyncLocks {
    fn entry(&self, account_uid: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(account_uid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, account_uid: &str) -> OwnedMutexGuard<()> {
        self.entry(account_uid).lock_owned().await
    }

    /// `None` while another sync of the account holds the lock.
    pub fn try_acquire(&self, account_uid: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(account_uid).try_lock_owned().ok()
    }

    pub fn is_locked(&self, account_uid: &str) -> bool {
        self.locks
            .get(account_uid)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Drops the entry of a deleted account unless a sync still holds it.
    pub fn forget(&self, account_uid: &str) {
        self.locks
            .remove_if(account_uid, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub fn is_tracked(&self, account_uid: &str) -> bool {
        self.locks.contains_key(account_uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_account_is_exclusive() {
        let locks = SyncLocks::default();
        let guard = locks.acquire("a").await;
        assert!(locks.is_locked("a"));
        assert!(locks.try_acquire("a").is_none());
        assert!(locks.try_acquire("b").is_some());

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert!(!locks.is_locked("a"));

        let held = locks.acquire("a").await;
        locks.forget("a");
        assert!(locks.is_tracked("a"));
        drop(held);
        locks.forget("a");
        assert!(!locks.is_tracked("a"));
        assert!(!locks.is_locked("a"));
    }
}
