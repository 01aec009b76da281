//! Per-conversation serialization
//!
//! Turns and archives on the same (subject, member) pair run one at a time in
//! arrival order (tokio mutexes are fair). Different pairs never contend
//! beyond the short map lookup.

use interviewer_sdk::types::ConversationKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created mutex per conversation key
#[derive(Debug, Default)]
pub struct PairLocks {
    locks: Mutex<HashMap<ConversationKey, Arc<Mutex<()>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    ///
    /// The returned guard releases the pair when dropped.
    pub async fn acquire(&self, key: ConversationKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on are only referenced by the map
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of pairs currently tracked
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
