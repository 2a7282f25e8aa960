//! Per-issue lock table
//!
//! One async mutex per issue id. Requests on different issues never contend;
//! requests on the same issue are serialised in the order the lock is granted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::state::IssueId;

/// Held for the duration of one transition
pub type IssueGuard = OwnedMutexGuard<()>;

/// Lock wait exceeded
#[derive(Debug, Clone, thiserror::Error)]
#[error("lock on {issue_id} not acquired within {waited:?}")]
pub struct LockTimeout {
    pub issue_id: IssueId,
    pub waited: Duration,
}

#[derive(Default)]
pub struct IssueLocks {
    slots: Mutex<HashMap<IssueId, Arc<AsyncMutex<()>>>>,
}

impl IssueLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, issue_id: &str) -> Arc<AsyncMutex<()>> {
        // A poisoned table only means another thread panicked mid-insert;
        // the map itself is still usable.
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(issue_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the lock for `issue_id`, waiting at most `wait`.
    pub async fn acquire(&self, issue_id: &str, wait: Duration) -> Result<IssueGuard, LockTimeout> {
        let slot = self.slot(issue_id);
        tokio::time::timeout(wait, slot.lock_owned())
            .await
            .map_err(|_| LockTimeout {
                issue_id: issue_id.to_string(),
                waited: wait,
            })
    }

    /// Drop slots nobody holds or waits on. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_issue_times_out() {
        let locks = IssueLocks::new();
        let _held = locks.acquire("i-1", Duration::from_millis(10)).await.unwrap();

        let err = locks
            .acquire("i-1", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.issue_id, "i-1");
        assert_eq!(err.waited, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_different_issues_do_not_contend() {
        let locks = IssueLocks::new();
        let _a = locks.acquire("i-1", Duration::from_millis(10)).await.unwrap();
        let _b = locks.acquire("i-2", Duration::from_millis(10)).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_slots() {
        let locks = IssueLocks::new();
        let held = locks.acquire("i-1", Duration::from_millis(10)).await.unwrap();
        drop(locks.acquire("i-2", Duration::from_millis(10)).await.unwrap());

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune_idle(), 1);
        assert!(locks.is_empty());
    }
}
