//! Per-signature lock table.
//!
//! Builders with equal signatures serialize their find-or-create step on
//! the same async mutex. The table only grows; entries live as long as the
//! loader that owns it.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::signature::SignatureKey;

#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<SignatureKey, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex for `key`, created on first use.
    ///
    /// Get-or-insert happens under the map's shard lock, so concurrent
    /// callers with an unseen key all receive the same mutex.
    pub fn lock_for(&self, key: SignatureKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Signature;

    #[test]
    fn test_same_key_same_mutex() {
        let table = LockTable::new();
        let key = Signature::from_values(["X"]).key().unwrap();
        let a = table.lock_for(key);
        let b = table.lock_for(key);
        assert!(Arc::ptr_eq(&a, &b));

        let other = table.lock_for(Signature::from_values(["Y"]).key().unwrap());
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(table.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_insert_is_atomic() {
        let table = Arc::new(LockTable::new());
        let key = Signature::from_values(["contended"]).key().unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let table = table.clone();
            handles.push(tokio::spawn(async move { table.lock_for(key) }));
        }
        let mut mutexes = Vec::new();
        for handle in handles {
            mutexes.push(handle.await.unwrap());
        }

        assert_eq!(table.len(), 1);
        assert!(mutexes.iter().all(|m| Arc::ptr_eq(m, &mutexes[0])));
    }
}
