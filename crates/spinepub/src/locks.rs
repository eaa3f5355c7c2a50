use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, OwnedMutexGuard};

/// At most one publish or unpublish runs per repository. The catalog spans every
/// repository and has its own lock.
#[derive(Default)]
pub struct PublishLocks {
    repositories: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
    catalog: AsyncMutex<()>,
}

impl PublishLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other call holds `repository_id`.
    pub async fn repository(&self, repository_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut repositories = self.repositories.lock();
            // Entries only the table references have no holder and no waiter.
            repositories.retain(|id, lock| *id == repository_id || Arc::strong_count(lock) > 1);
            repositories.entry(repository_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.repositories.lock().len()
    }

    pub async fn catalog(&self) -> MutexGuard<'_, ()> {
        self.catalog.lock().await
    }
}
