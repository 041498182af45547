use sqlgate_types::TaskId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-task mutexes.
///
/// At most one guard per task id exists at a time. Entries nobody holds or
/// waits on are pruned on the next acquisition.
#[derive(Debug, Default)]
pub struct TaskLocks {
    locks: Mutex<HashMap<TaskId, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one task until dropped
#[derive(Debug)]
pub struct TaskGuard {
    task_id: TaskId,
    _guard: OwnedMutexGuard<()>,
}

impl TaskGuard {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, task_id: TaskId) -> Arc<AsyncMutex<()>> {
        // The map is only mutated under this lock, so a poisoned map is still consistent
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|id, lock| *id == task_id || Arc::strong_count(lock) > 1);
        locks.entry(task_id).or_default().clone()
    }

    /// Wait for exclusive access to a task
    pub async fn acquire(&self, task_id: TaskId) -> TaskGuard {
        let lock = self.handle(task_id);
        TaskGuard {
            task_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Acquire several tasks in ascending id order, so batches never deadlock each other
    pub async fn acquire_many(&self, task_ids: &[TaskId]) -> Vec<TaskGuard> {
        let mut ids = task_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await);
        }
        guards
    }

    /// Number of tracked task ids
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_task_is_exclusive() {
        let locks = Arc::new(TaskLocks::new());
        let guard = locks.acquire(TaskId(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(TaskId(1)).await.task_id() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        assert_eq!(contender.await.unwrap(), TaskId(1));
    }

    #[tokio::test]
    async fn test_distinct_tasks_are_independent() {
        let locks = TaskLocks::new();
        let _a = locks.acquire(TaskId(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(TaskId(2))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = TaskLocks::new();
        for id in 0..10 {
            let _guard = locks.acquire(TaskId(id)).await;
        }
        let _last = locks.acquire(TaskId(100)).await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_acquire_many_dedups() {
        let locks = TaskLocks::new();
        let guards = locks
            .acquire_many(&[TaskId(3), TaskId(1), TaskId(3)])
            .await;
        assert_eq!(
            guards.iter().map(TaskGuard::task_id).collect::<Vec<_>>(),
            vec![TaskId(1), TaskId(3)]
        );
    }
}
