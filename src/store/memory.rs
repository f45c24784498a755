//! In-process task store
//!
//! Keeps every task in a single [`TaskTree`] behind an async lock. Writes
//! validate the whole batch before applying any of it, which gives the same
//! all-or-nothing behavior a database transaction would.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{is_candidate, ScheduleStore, StoreError, TreeStore};
use crate::models::{TaskId, TaskNode, TaskStatus, UserId};
use crate::tree::TaskTree;

#[derive(Debug, Default)]
struct Faults {
    fail_next_write: AtomicBool,
    write_delay_ms: AtomicU64,
}

/// Task store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tree: Arc<RwLock<TaskTree>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = TaskNode>) -> Self {
        Self {
            tree: Arc::new(RwLock::new(TaskTree::from_tasks(tasks))),
            faults: Arc::default(),
        }
    }

    /// Inserts or replaces a task
    pub async fn insert(&self, task: TaskNode) {
        self.tree.write().await.insert(task);
    }

    pub async fn get(&self, id: TaskId) -> Option<TaskNode> {
        self.tree.read().await.get(id).cloned()
    }

    /// Returns a copy of everything currently stored
    pub async fn snapshot(&self) -> TaskTree {
        self.tree.read().await.clone()
    }

    /// Makes the next write (commit, re-parent or delete) fail without applying anything
    pub fn fail_next_write(&self) {
        self.faults.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Delays every write by `delay` before it touches the data
    pub fn set_write_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.faults.write_delay_ms.store(millis, Ordering::SeqCst);
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        let delay = self.faults.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.faults.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict("injected write failure".to_string()));
        }
        Ok(())
    }

    /// A small goal decomposition for user 1, used to demo the server
    pub fn example(now: DateTime<Utc>) -> Result<Self, crate::models::ValidationError> {
        let hours = chrono::Duration::hours;
        let minutes = chrono::Duration::minutes;

        let tasks = vec![
            TaskNode::builder(1, 1, "Learn to play guitar")
                .priority(0.7)
                .complexity(0.8)
                .tags(["music"])
                .build()?,
            TaskNode::builder(2, 1, "Practice chord changes")
                .parent(1)
                .level(1)
                .priority(0.7)
                .estimated_duration(minutes(25))
                .build()?,
            TaskNode::builder(3, 1, "Learn the C major scale")
                .parent(1)
                .level(1)
                .priority(0.6)
                .estimated_duration(minutes(40))
                .min_start_time(now + hours(2))
                .build()?,
            TaskNode::builder(4, 1, "Record a practice session")
                .parent(3)
                .level(2)
                .priority(0.4)
                .deadline(now + hours(1))
                .build()?,
            TaskNode::builder(5, 1, "Buy a tuner")
                .priority(0.9)
                .status(TaskStatus::Completed)
                .build()?,
            TaskNode::builder(6, 1, "Ship API endpoints")
                .priority(0.9)
                .complexity(0.9)
                .estimated_duration(hours(2))
                .status(TaskStatus::InProgress)
                .build()?,
        ];
        Ok(Self::from_tasks(tasks))
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn load_candidates(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
    ) -> Result<Vec<TaskNode>, StoreError> {
        let tree = self.tree.read().await;
        Ok(tree
            .user_tasks(user_id)
            .filter(|task| is_candidate(task, user_id, from))
            .cloned()
            .collect())
    }

    async fn commit(&self, assigned: &[TaskNode]) -> Result<(), StoreError> {
        self.before_write().await?;
        let mut tree = self.tree.write().await;

        // Check the whole batch before touching anything
        for task in assigned {
            let stored = tree
                .get(task.id())
                .ok_or(StoreError::NotFound(task.id()))?;
            if stored.user_id() != task.user_id() {
                return Err(StoreError::Conflict(format!(
                    "task {} belongs to user {}, not {}",
                    task.id(),
                    stored.user_id(),
                    task.user_id()
                )));
            }
            if task.planned_window().is_none() {
                return Err(StoreError::Conflict(format!(
                    "task {} has no planned window",
                    task.id()
                )));
            }
        }

        for task in assigned {
            if let (Some(stored), Some((start, end))) =
                (tree.get_mut(task.id()), task.planned_window())
            {
                stored.assign_window(start, end);
            }
        }
        tracing::debug!(count = assigned.len(), "Committed planned windows");
        Ok(())
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn load_task(&self, id: TaskId) -> Result<Option<TaskNode>, StoreError> {
        Ok(self.get(id).await)
    }

    async fn load_user_tasks(&self, user_id: UserId) -> Result<Vec<TaskNode>, StoreError> {
        let tree = self.tree.read().await;
        Ok(tree.user_tasks(user_id).cloned().collect())
    }

    async fn set_parent(&self, child: TaskId, parent: Option<TaskId>) -> Result<(), StoreError> {
        self.before_write().await?;
        let mut tree = self.tree.write().await;

        if let Some(parent) = parent {
            if !tree.contains(parent) {
                return Err(StoreError::NotFound(parent));
            }
        }
        let task = tree.get_mut(child).ok_or(StoreError::NotFound(child))?;
        task.set_parent(parent);
        Ok(())
    }

    async fn delete_all(&self, ids: &[TaskId]) -> Result<(), StoreError> {
        self.before_write().await?;
        let mut tree = self.tree.write().await;

        if let Some(missing) = ids.iter().find(|id| !tree.contains(**id)) {
            return Err(StoreError::NotFound(*missing));
        }
        tree.remove(ids);
        tracing::debug!(count = ids.len(), "Deleted tasks");
        Ok(())
    }
}
