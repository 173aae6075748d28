//! Generic per-key resource pool with lazy, race-safe construction
//!
//! Used by the APNs push client pool (C5) and the SCEP CA cache (C6): both
//! need a tenant-scoped singleton that is expensive to build, rare to
//! invalidate, and must not be built twice under concurrent first use.
//!
//! # Thread Safety
//! All internal state is protected by `Arc<RwLock<HashMap<..>>>`. Reads
//! (the common case — push, encrypt) take the read lock; construction and
//! invalidation take the write lock with double-checked locking so a
//! concurrent miss never constructs the resource twice.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::RwLock;

/// A cache of lazily-constructed, tenant-scoped (or any key-scoped)
/// resources.
///
/// `get_or_load` takes an async loader that is only invoked on a cache miss;
/// the loader's result is cached under a write lock, re-checking for a
/// concurrent winner before inserting.
pub struct ResourcePool<K, V> {
    entries: Arc<RwLock<HashMap<K, Arc<V>>>>,
}

impl<K, V> ResourcePool<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return the cached resource for `key`, or build it with `loader` and
    /// cache the result. If two callers race on the same missing key, both
    /// run the loader, but only one result is retained — the loser's result
    /// is dropped and the winner's is returned to every caller.
    pub async fn get_or_load<F, Fut, E>(&self, key: K, loader: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(existing) = self.entries.read().await.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let built = Arc::new(loader().await?);

        let mut guard = self.entries.write().await;
        if let Some(existing) = guard.get(&key) {
            return Ok(Arc::clone(existing));
        }
        guard.insert(key, Arc::clone(&built));
        Ok(built)
    }

    /// Invalidate a cached entry, forcing the next `get_or_load` to rebuild
    /// it. Used when a tenant's APNs credentials or CA material changes.
    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Number of resources currently cached. Test/diagnostic use only.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<K, V> Default for ResourcePool<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for ResourcePool<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn caches_after_first_load() {
        let pool: ResourcePool<String, u32> = ResourcePool::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let v1 = pool
            .get_or_load("t1".to_string(), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, String>(42)
            })
            .await
            .unwrap();
        assert_eq!(*v1, 42);

        let c = Arc::clone(&calls);
        let v2 = pool
            .get_or_load("t1".to_string(), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, String>(99)
            })
            .await
            .unwrap();

        assert_eq!(*v2, 42, "second load must reuse cached value");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let pool: ResourcePool<String, u32> = ResourcePool::new();
        pool.get_or_load("t1".to_string(), || async { Ok::<u32, String>(1) })
            .await
            .unwrap();
        pool.invalidate(&"t1".to_string()).await;
        let v = pool
            .get_or_load("t1".to_string(), || async { Ok::<u32, String>(2) })
            .await
            .unwrap();
        assert_eq!(*v, 2);
    }
}
