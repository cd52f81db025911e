//! Per-identity and per-key mutual exclusion.

use crate::error::{LicenseError, LicenseResult};
use keyward_types::{Identity, KeyId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// A lockable ledger resource. The derived ordering is the canonical
/// acquisition order: identities before keys, then by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum LockKey {
    Identity(Identity),
    Key(KeyId),
}

/// Held locks; dropping it releases all of them.
pub(crate) struct LockGuard {
    _held: Vec<OwnedMutexGuard<()>>,
}

pub(crate) struct LockTable {
    slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl LockTable {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn slot(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        // The map holds no invariant a panicking holder could break.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Acquires every lock in `keys` in canonical order, waiting at most the
    /// table's timeout for all of them together.
    pub(crate) async fn acquire(&self, mut keys: Vec<LockKey>) -> LicenseResult<LockGuard> {
        keys.sort();
        keys.dedup();
        let deadline = Instant::now() + self.timeout;

        let mut held = Vec::with_capacity(keys.len());
        for key in &keys {
            let slot = self.slot(key);
            match timeout_at(deadline, slot.lock_owned()).await {
                Ok(guard) => held.push(guard),
                Err(_) => {
                    debug!(?key, "timed out waiting for ledger lock");
                    return Err(LicenseError::Busy);
                }
            }
        }
        Ok(LockGuard { _held: held })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(s: &str) -> LockKey {
        LockKey::Identity(Identity::parse(s).unwrap())
    }

    fn key(s: &str) -> LockKey {
        LockKey::Key(KeyId::parse(s).unwrap())
    }

    #[test]
    fn identities_sort_before_keys() {
        let mut keys = vec![key("A"), identity("zed"), key("0"), identity("amy")];
        keys.sort();
        assert_eq!(
            keys,
            vec![identity("amy"), identity("zed"), key("0"), key("A")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn contended_lock_times_out_as_busy() {
        let table = LockTable::new(Duration::from_millis(50));
        let _held = table.acquire(vec![key("K1")]).await.unwrap();
        let err = table.acquire(vec![identity("bob"), key("K1")]).await;
        assert!(matches!(err, Err(LicenseError::Busy)));
    }

    #[tokio::test]
    async fn disjoint_locks_do_not_block() {
        let table = LockTable::new(Duration::from_millis(50));
        let _a = table.acquire(vec![identity("alice"), key("K1")]).await.unwrap();
        let _b = table.acquire(vec![identity("bob"), key("K2")]).await.unwrap();
    }

    #[tokio::test]
    async fn released_locks_can_be_reacquired_and_pruned() {
        let table = LockTable::new(Duration::from_millis(50));
        let guard = table.acquire(vec![key("K1"), key("K1")]).await.unwrap();
        drop(guard);
        let _again = table.acquire(vec![key("K2")]).await.unwrap();
        assert_eq!(table.len(), 1);
    }
}
