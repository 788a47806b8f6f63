// src/engine/locks.rs

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

/// One async mutex per quiz id.
///
/// Holding the guard is the unit of work of a state-machine operation:
/// load, validate, mutate and save happen while no other operation on the
/// same quiz can interleave. Different quizzes never contend.
///
/// Entries only live while someone holds or waits for them, so ids that
/// are touched once (or never existed) do not accumulate.
#[derive(Debug, Default)]
pub struct QuizLocks {
    locks: LockMap,
}

/// Exclusive access to one quiz. Dropping it releases the lock and removes
/// the entry when nobody else is queued on it.
#[derive(Debug)]
pub struct QuizGuard<'a> {
    locks: &'a LockMap,
    quiz_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for QuizGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the Arc, so a count of one means only the map is left.
        self.locks
            .remove_if(&self.quiz_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl QuizLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, quiz_id: i64) -> QuizGuard<'_> {
        let lock = Arc::clone(&*self.locks.entry(quiz_id).or_default());
        let guard = lock.lock_owned().await;
        QuizGuard {
            locks: &self.locks,
            quiz_id,
            guard: Some(guard),
        }
    }

    /// Number of quiz ids currently held or waited on.
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}
