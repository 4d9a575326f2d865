use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per lead id, so two runs for the same lead never
/// interleave their writes inside this process.
#[derive(Default)]
pub struct LeadLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LeadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `lead_id`. Released when the guard drops.
    pub async fn acquire(&self, lead_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Entries nobody holds or waits on are dropped.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(lead_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of lead ids currently held or awaited.
    pub async fn active(&self) -> usize {
        self.inner
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_lead_is_serialised() {
        let locks = Arc::new(LeadLocks::new());
        let guard = locks.acquire("lead-1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("lead-1").await;
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
    async fn different_leads_do_not_block() {
        let locks = LeadLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.active().await, 2);
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = LeadLocks::new();
        drop(locks.acquire("a").await);
        let _b = locks.acquire("b").await;
        assert_eq!(locks.inner.lock().await.len(), 1);
    }
}
