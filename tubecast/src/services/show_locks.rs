//! Per-show mutual exclusion
//!
//! Every mutating operation read-modify-writes one show's snapshot, so at
//! most one may be in flight per show. Operations on different shows do not
//! contend.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one mutating show operation
pub type ShowGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct ShowLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ShowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `title`
    pub async fn lock(&self, title: &str) -> ShowGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(title.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_show_is_exclusive() {
        let locks = Arc::new(ShowLocks::new());
        let guard = locks.lock("Tech Talks").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("Tech Talks").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_shows_do_not_contend() {
        let locks = ShowLocks::new();
        let _a = locks.lock("Tech Talks").await;
        let b = tokio::time::timeout(Duration::from_millis(200), locks.lock("Cooking")).await;
        assert!(b.is_ok());
    }
}
