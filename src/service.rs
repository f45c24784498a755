//! Service layer
//!
//! Runs the load → compute → commit cycle around the rescheduling engine and
//! the snapshot → validate → persist cycle around tree mutations. Cycles for
//! the same user are serialized; different users proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{TaskId, TaskNode, TaskWithSubtasks, UserId, ValidationError};
use crate::policy::SchedulingPolicy;
use crate::scheduler::{ReschedulingEngine, ScheduleError};
use crate::store::{StoreError, TaskStore};
use crate::tree::{TaskTree, TreeError};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Service configuration
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Upper bound for a store write; a timed-out write fails the whole cycle
    pub commit_timeout: Duration,
    pub policy: SchedulingPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            commit_timeout: Duration::from_secs(30),
            policy: SchedulingPolicy::default(),
        }
    }
}

/// Errors surfaced by the service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Request to reschedule one user's tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub user_id: UserId,
    /// Defaults to the current time
    #[serde(default)]
    pub anchor: Option<DateTime<Utc>>,
}

/// Result of a reschedule request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleResponse {
    pub scheduled: Vec<TaskNode>,
    pub overdue_ids: Vec<TaskId>,
}

type UserLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone)]
pub struct Service {
    store: Arc<dyn TaskStore>,
    engine: ReschedulingEngine,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    user_locks: Arc<Mutex<HashMap<UserId, UserLock>>>,
}

impl Service {
    pub fn new(store: Arc<dyn TaskStore>, config: ServiceConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn TaskStore>,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine: ReschedulingEngine::new(config.policy),
            clock,
            config,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the lock serializing cycles for `user_id`
    fn user_lock(&self, user_id: UserId) -> UserLock {
        let mut locks = match self.user_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(user_id).or_default().clone()
    }

    /// Runs a store write under the configured timeout
    async fn write<F>(&self, operation: F) -> Result<(), StoreError>
    where
        F: std::future::Future<Output = Result<(), StoreError>>,
    {
        match tokio::time::timeout(self.config.commit_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.config.commit_timeout, "Store write timed out");
                Err(StoreError::Timeout(self.config.commit_timeout))
            }
        }
    }

    /// Loads, packs and commits every eligible task of the user.
    ///
    /// On any store failure nothing from this call is persisted and the whole
    /// request can be retried.
    pub async fn reschedule(
        &self,
        request: RescheduleRequest,
    ) -> Result<RescheduleResponse, ServiceError> {
        let lock = self.user_lock(request.user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let anchor = request.anchor.unwrap_or(now);
        let candidates = self.store.load_candidates(request.user_id, anchor).await?;
        let schedule = self.engine.reschedule(candidates, anchor, now)?;

        if !schedule.scheduled.is_empty() {
            self.write(self.store.commit(&schedule.scheduled)).await?;
        }

        Ok(RescheduleResponse {
            overdue_ids: schedule.overdue_ids(),
            scheduled: schedule.scheduled,
        })
    }

    async fn require_task(&self, id: TaskId) -> Result<TaskNode, ServiceError> {
        self.store
            .load_task(id)
            .await?
            .ok_or(ServiceError::Tree(TreeError::NotFound(id)))
    }

    async fn snapshot(&self, user_id: UserId) -> Result<TaskTree, ServiceError> {
        Ok(TaskTree::from_tasks(
            self.store.load_user_tasks(user_id).await?,
        ))
    }

    /// Makes `child_id` a subtask of `parent_id`, returning the updated child
    pub async fn attach(
        &self,
        parent_id: TaskId,
        child_id: TaskId,
    ) -> Result<TaskNode, ServiceError> {
        let child = self.require_task(child_id).await?;
        let lock = self.user_lock(child.user_id());
        let _guard = lock.lock().await;

        let mut tree = self.snapshot(child.user_id()).await?;
        if !tree.contains(parent_id) {
            // Possibly another user's task; the tree reports that as CrossUser
            tree.insert(self.require_task(parent_id).await?);
        }
        tree.attach(parent_id, child_id)?;
        let attached = tree
            .get(child_id)
            .cloned()
            .ok_or(TreeError::NotFound(child_id))?;

        self.write(self.store.set_parent(child_id, Some(parent_id)))
            .await?;
        tracing::info!(parent = parent_id, child = child_id, "Attached task");
        Ok(attached)
    }

    /// Turns `child_id` into a root task if it is a child of `parent_id`
    pub async fn detach(&self, parent_id: TaskId, child_id: TaskId) -> Result<bool, ServiceError> {
        let Some(child) = self.store.load_task(child_id).await? else {
            return Ok(false);
        };
        let lock = self.user_lock(child.user_id());
        let _guard = lock.lock().await;

        let mut tree = self.snapshot(child.user_id()).await?;
        if !tree.detach(parent_id, child_id) {
            return Ok(false);
        }

        self.write(self.store.set_parent(child_id, None)).await?;
        tracing::info!(parent = parent_id, child = child_id, "Detached task");
        Ok(true)
    }

    /// Deletes `id` and its whole subtree, returning the deleted ids deepest first
    pub async fn delete(&self, id: TaskId) -> Result<Vec<TaskId>, ServiceError> {
        let node = self.require_task(id).await?;
        let lock = self.user_lock(node.user_id());
        let _guard = lock.lock().await;

        let plan = self.snapshot(node.user_id()).await?.cascade_delete(id)?;
        self.write(self.store.delete_all(&plan)).await?;

        tracing::info!(task = id, deleted = plan.len(), "Deleted task subtree");
        Ok(plan)
    }

    /// Returns `id` with its whole subtree
    pub async fn subtree(&self, id: TaskId) -> Result<TaskWithSubtasks, ServiceError> {
        let node = self.require_task(id).await?;
        let lock = self.user_lock(node.user_id());
        let _guard = lock.lock().await;

        Ok(self.snapshot(node.user_id()).await?.subtree(id)?)
    }
}
