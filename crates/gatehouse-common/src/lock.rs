//! Named-resource locks
//!
//! Serializes workflows touching the same `{namespace}/{model}` within one
//! process. Locks are sharded by name in a [`DashMap`] and the entry is
//! dropped once the last holder releases it, so the map only ever holds
//! names with in-flight workflows.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// In-memory lock table keyed by resource name. Clones share state.
#[derive(Clone, Default)]
pub struct ResourceLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one workflow; releases on drop.
pub struct ResourceGuard {
    key: String,
    table: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ResourceLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and acquire the lock for `namespace/name`
    pub async fn lock(&self, namespace: &str, name: &str) -> ResourceGuard {
        let key = format!("{namespace}/{name}");
        let mutex = self
            .inner
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        trace!(key = %key, "acquiring resource lock");
        let guard = mutex.lock_owned().await;
        ResourceGuard {
            key,
            table: self.inner.clone(),
            guard: Some(guard),
        }
    }

    /// Number of names with a live lock entry
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no lock entry is live
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        // Release the mutex before checking for other holders
        drop(self.guard.take());
        // Map entry plus nobody else waiting or holding
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entry_removed_after_release() {
        let locks = ResourceLocks::new();
        {
            let _guard = locks.lock("a", "iris").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_names_do_not_block() {
        let locks = ResourceLocks::new();
        let _a = locks.lock("a", "iris").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("a", "llama")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn same_name_is_serialized() {
        let locks = ResourceLocks::new();
        let in_section = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("a", "iris").await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
