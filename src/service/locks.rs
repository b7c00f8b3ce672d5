use crate::domain::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per user, created on first use.
///
/// Holding the guard serializes ledger mutations for that user inside this
/// process. Other users are never blocked. Entries nobody holds or waits on are
/// dropped whenever a new user is added, so the map tracks active users only.
#[derive(Debug, Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if !map.contains_key(user) {
                // Only the map owns an idle entry; guards and waiters hold clones.
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(user.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
