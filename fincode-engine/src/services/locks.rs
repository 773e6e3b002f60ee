//! Per-extraction write serialization
//!
//! Fast Pass, Smart Pass and confirmations on the same extraction must
//! not interleave: a slow Smart Pass call could otherwise clobber a Fast
//! Pass result or vice versa. Each extraction id gets its own async
//! mutex; different extractions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Registry of per-extraction write locks
#[derive(Clone, Default)]
pub struct ExtractionLocks {
    locks: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ExtractionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for one extraction id
    ///
    /// The returned guard serializes all mutating passes for that id;
    /// hold it across the load-mutate-persist cycle. Entries nobody holds
    /// are swept on each acquisition so the registry does not grow with
    /// every id ever touched.
    pub async fn acquire(&self, extraction_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.write().await;
            // A guard (or a pending acquire) keeps a second Arc alive;
            // count 1 means only the map references the mutex.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(extraction_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
