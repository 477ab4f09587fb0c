//! Per-asset serialization of scoring passes.
//!
//! Alert dedup reads the open alerts and then writes new ones. Two passes
//! for the same asset running at once could both see "no open alert" and
//! both insert, so every pass holds its asset's lock from history load to
//! commit. Different assets never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

// ---

#[derive(Debug, Clone, Default)]
pub struct AssetLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl AssetLocks {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `asset_id`. Released when the guard drops.
    pub async fn lock(&self, asset_id: i64) -> OwnedMutexGuard<()> {
        // ---
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(map.entry(asset_id).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of assets that have been locked at least once.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_asset_is_serialized() {
        // ---
        let locks = AssetLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _guard = locks.lock(42).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_assets_do_not_block() {
        // ---
        let locks = AssetLocks::new();
        tokio_test::block_on(async {
            let _a = locks.lock(1).await;
            // Would never return if asset 2 shared asset 1's lock
            let _b = locks.lock(2).await;
        });
        assert_eq!(locks.len(), 2);
    }
}
