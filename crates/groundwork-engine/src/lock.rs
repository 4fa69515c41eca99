//! Keyed lock registry for concurrent-unsafe provider operations

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Explicit registry of per-key async locks.
///
/// Some provider updates are not atomically safe under concurrent callers
/// (a policy-document read-modify-write being the canonical case). A task
/// acquires the key's lock immediately before the read and holds it only
/// through the write, never across unrelated work.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.acquire("project/iam").await;

        let entered = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn({
            let locks = locks.clone();
            let entered = entered.clone();
            async move {
                let _guard = locks.acquire("project/iam").await;
                entered.store(true, Ordering::SeqCst);
            }
        });

        tokio::task::yield_now().await;
        assert!(!entered.load(Ordering::SeqCst));

        drop(guard);
        handle.await.unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_different_keys_independent() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("project/a").await;
        // Would deadlock if keys shared a lock
        let _b = locks.acquire("project/b").await;
    }
}
