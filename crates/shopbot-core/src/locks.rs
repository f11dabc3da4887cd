use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per account id. Every mutating handler holds the lock of
/// each account it writes, so two commands can never interleave their
/// read-validate-write cycles on the same row.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one mutation.
#[derive(Debug)]
pub struct UserGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(id.to_string()).or_default().clone()
    }

    pub async fn lock(&self, id: &str) -> UserGuard {
        let guard = self.handle(id).lock_owned().await;
        UserGuard {
            _guards: vec![guard],
        }
    }

    /// Lock two accounts in sorted id order so opposite-direction transfers
    /// cannot deadlock. Locking the same id twice takes it once.
    pub async fn lock_pair(&self, a: &str, b: &str) -> UserGuard {
        if a == b {
            return self.lock(a).await;
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let g1 = self.handle(first).lock_owned().await;
        let g2 = self.handle(second).lock_owned().await;
        UserGuard {
            _guards: vec![g1, g2],
        }
    }
}
