//! Store module
//!
//! Persistence contracts consumed by the service layer, plus the two
//! implementations: an in-process store and an HTTP client for the
//! data-access service.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{TaskId, TaskNode, UserId};

pub use http::{HttpStore, StoreConfig};
pub use memory::MemoryStore;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store responded with {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid task record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("commit rejected: {0}")]
    Conflict(String),
}

/// What the rescheduling cycle needs from storage
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Loads the user's tasks that are not terminal and whose deadline is
    /// absent or after `from`
    async fn load_candidates(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
    ) -> Result<Vec<TaskNode>, StoreError>;

    /// Persists the planned windows of `assigned` as one all-or-nothing unit
    async fn commit(&self, assigned: &[TaskNode]) -> Result<(), StoreError>;
}

/// What tree mutations need from storage
#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn load_task(&self, id: TaskId) -> Result<Option<TaskNode>, StoreError>;

    async fn load_user_tasks(&self, user_id: UserId) -> Result<Vec<TaskNode>, StoreError>;

    async fn set_parent(&self, child: TaskId, parent: Option<TaskId>) -> Result<(), StoreError>;

    /// Deletes every id in `ids` as one all-or-nothing unit
    async fn delete_all(&self, ids: &[TaskId]) -> Result<(), StoreError>;
}

/// A store usable for both scheduling and tree mutation
pub trait TaskStore: ScheduleStore + TreeStore {}

impl<T: ScheduleStore + TreeStore> TaskStore for T {}

/// Candidate filter shared by the store implementations
pub(crate) fn is_candidate(task: &TaskNode, user_id: UserId, from: DateTime<Utc>) -> bool {
    task.user_id() == user_id && task.is_schedulable(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_is_candidate() {
        let from = Utc.with_ymd_and_hms(2025, 6, 23, 9, 0, 0).unwrap();
        let open = TaskNode::builder(1, 1, "open").build().unwrap();
        let future = TaskNode::builder(2, 1, "future")
            .deadline(from + Duration::hours(1))
            .build()
            .unwrap();
        let expired = TaskNode::builder(3, 1, "expired")
            .deadline(from)
            .build()
            .unwrap();
        let done = TaskNode::builder(4, 1, "done")
            .status(TaskStatus::Completed)
            .build()
            .unwrap();

        assert!(is_candidate(&open, 1, from));
        assert!(!is_candidate(&open, 2, from));
        assert!(is_candidate(&future, 1, from));
        assert!(!is_candidate(&expired, 1, from));
        assert!(!is_candidate(&done, 1, from));
    }
}
