//! Per-pass execution context shared with tasks

use std::any::Any;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use groundwork_core::{EngineError, Result};

use crate::deletion::Deletion;
use crate::lock::KeyedLocks;

/// State shared with every task during a convergence pass: the injected
/// provider client, the keyed lock registry, and the deletion collector.
pub struct Context {
    cloud: Option<Arc<dyn Any + Send + Sync>>,
    locks: KeyedLocks,
    deletions: Mutex<Vec<Arc<dyn Deletion>>>,
}

impl Context {
    /// Context for live-API passes, with the provider client injected
    pub fn new(cloud: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            cloud: Some(cloud),
            locks: KeyedLocks::new(),
            deletions: Mutex::new(Vec::new()),
        }
    }

    /// Context for text-emission passes, where no provider client exists
    pub fn offline() -> Self {
        Self {
            cloud: None,
            locks: KeyedLocks::new(),
            deletions: Mutex::new(Vec::new()),
        }
    }

    /// Typed access to the provider client, for `find`
    pub fn cloud<C: Any + Send + Sync>(&self) -> Result<Arc<C>> {
        let cloud = self
            .cloud
            .as_ref()
            .ok_or_else(|| EngineError::other("no provider client in this context"))?;
        cloud
            .clone()
            .downcast::<C>()
            .map_err(|_| EngineError::other("provider client has unexpected type"))
    }

    /// Acquire the keyed lock guarding a concurrent-unsafe provider
    /// operation; hold it only across the critical read-modify-write
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.locks.acquire(key).await
    }

    /// Record a cleanup action for the post-pass deletion run
    pub fn add_deletion(&self, deletion: Arc<dyn Deletion>) {
        self.deletions.lock().unwrap().push(deletion);
    }

    /// Drain all collected deletions
    pub(crate) fn take_deletions(&self) -> Vec<Arc<dyn Deletion>> {
        std::mem::take(&mut *self.deletions.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCloud {
        project: &'static str,
    }

    #[test]
    fn test_cloud_access() {
        let ctx = Context::new(Arc::new(FakeCloud { project: "k8s" }));
        assert_eq!(ctx.cloud::<FakeCloud>().unwrap().project, "k8s");
        assert!(ctx.cloud::<String>().is_err());
    }

    #[test]
    fn test_offline_context_has_no_cloud() {
        let ctx = Context::offline();
        assert!(ctx.cloud::<FakeCloud>().is_err());
    }
}
