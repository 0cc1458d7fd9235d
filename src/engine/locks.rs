//! In-process lock per (wallet, token unit) pair.

use crate::domain::PositionKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map size above which idle locks are dropped on the next acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// Serializes reconciliations of the same pair; different pairs never wait
/// on each other.
#[derive(Debug, Default)]
pub struct PairLocks {
    locks: Mutex<HashMap<PositionKey, Arc<AsyncMutex<()>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn acquire(&self, key: &PositionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                // only the map holds a reference: nobody owns or awaits it
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of pairs with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TokenUnit, WalletAddress};
    use std::time::Duration;

    fn key(unit: &str) -> PositionKey {
        PositionKey::new(
            WalletAddress::new("addr1".to_string()),
            TokenUnit::new(unit.to_string()),
        )
    }

    #[tokio::test]
    async fn test_same_pair_is_exclusive() {
        let locks = Arc::new(PairLocks::new());
        let guard = locks.acquire(&key("lp01")).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&key("lp01")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_pairs_do_not_block() {
        let locks = PairLocks::new();
        let _a = locks.acquire(&key("lp01")).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&key("lp02"))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
