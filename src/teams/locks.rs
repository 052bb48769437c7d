//! Per-team serialization of balance read-modify-write sequences

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use crate::common::types::TeamId;

type TeamMutex = Arc<tokio::sync::Mutex<()>>;

/// One async mutex per team, created on first use and dropped once nobody holds or awaits it
#[derive(Debug, Default)]
pub struct TeamLocks {
    locks: Mutex<HashMap<TeamId, TeamMutex>>,
}

impl TeamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a team's balance and holdings
    pub async fn acquire(&self, team_id: TeamId) -> TeamGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(team_id).or_default())
        };
        // built before waiting so a cancelled acquire still releases
        let mut guard = TeamGuard {
            locks: self,
            guard: None,
        };
        guard.guard = Some(lock.lock_owned().await);
        guard
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Drop every lock that only the map still references
    fn prune(&self) {
        self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Exclusive access to one team, released on drop
#[derive(Debug)]
pub struct TeamGuard<'a> {
    locks: &'a TeamLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TeamGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_same_team_is_serialized() {
        let locks = TeamLocks::new();
        let guard = locks.acquire(1).await;

        let mut waiter = task::spawn(locks.acquire(1));
        assert_pending!(waiter.poll());

        drop(guard);
        assert!(waiter.is_woken());
        let _guard = assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_different_teams_do_not_block() {
        let locks = TeamLocks::new();
        let _first = locks.acquire(1).await;
        let _second = locks.acquire(2).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = TeamLocks::new();
        for team_id in 0..100 {
            let _guard = locks.acquire(team_id).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_with_waiter_survives_release() {
        let locks = TeamLocks::new();
        let guard = locks.acquire(7).await;
        let mut waiter = task::spawn(locks.acquire(7));
        assert_pending!(waiter.poll());

        drop(guard);
        assert_eq!(locks.len(), 1);

        let next = assert_ready!(waiter.poll());
        drop(next);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_acquire_leaves_no_lock_behind() {
        let locks = TeamLocks::new();
        let guard = locks.acquire(7).await;
        let mut waiter = task::spawn(locks.acquire(7));
        assert_pending!(waiter.poll());

        drop(waiter);
        drop(guard);

        assert!(locks.is_empty());
    }
}
