//! Rescheduling engine
//!
//! Deterministic greedy interval packing: one user's eligible tasks are sorted
//! by priority and laid end to end from an anchor, each one pushed back to its
//! minimum start time when needed. The engine is a pure computation with no
//! I/O; loading tasks and committing the result is the caller's job.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{TaskId, TaskNode, UserId};
use crate::policy::SchedulingPolicy;

/// Reasons the engine cannot compute a schedule
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("task {task} belongs to user {found}, expected user {expected}")]
    CrossUser {
        task: TaskId,
        expected: UserId,
        found: UserId,
    },

    #[error("planned window of task {0} overflows the representable time range")]
    WindowOverflow(TaskId),
}

/// Output of a rescheduling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Packed tasks, in packing order, with their windows assigned
    pub scheduled: Vec<TaskNode>,
    /// Terminal tasks, returned exactly as received
    pub untouched: Vec<TaskNode>,
    /// Scheduled tasks whose planned end falls after their deadline
    pub overdue: BTreeSet<TaskId>,
    pub anchor: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

impl Schedule {
    fn empty(anchor: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            scheduled: Vec::new(),
            untouched: Vec::new(),
            overdue: BTreeSet::new(),
            anchor,
            generated_at: now,
        }
    }

    pub fn is_overdue(&self, id: TaskId) -> bool {
        self.overdue.contains(&id)
    }

    /// Overdue ids in ascending order
    pub fn overdue_ids(&self) -> Vec<TaskId> {
        self.overdue.iter().copied().collect()
    }
}

/// Assigns non-overlapping execution windows to a user's tasks
#[derive(Debug, Clone, Copy, Default)]
pub struct ReschedulingEngine {
    policy: SchedulingPolicy,
}

impl ReschedulingEngine {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    /// Packs `candidates` into consecutive windows starting at `anchor`.
    ///
    /// All candidates must belong to the same user. Terminal tasks are
    /// returned untouched in [`Schedule::untouched`]. Missing a deadline is
    /// not an error; such tasks are listed in [`Schedule::overdue`].
    pub fn reschedule(
        &self,
        candidates: Vec<TaskNode>,
        anchor: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Schedule, ScheduleError> {
        let Some(user_id) = candidates.first().map(TaskNode::user_id) else {
            tracing::debug!("No tasks to reschedule");
            return Ok(Schedule::empty(anchor, now));
        };
        if let Some(stray) = candidates.iter().find(|task| task.user_id() != user_id) {
            return Err(ScheduleError::CrossUser {
                task: stray.id(),
                expected: user_id,
                found: stray.user_id(),
            });
        }

        let (untouched, mut scheduled): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(TaskNode::is_terminal);

        // `sort_by` is stable, so full ties keep their input order
        scheduled.sort_by(packing_order);

        let mut cursor = anchor;
        for task in &mut scheduled {
            let start = cursor.max(self.policy.earliest_start_for(task, anchor));
            let end = start
                .checked_add_signed(self.policy.duration_for(task))
                .ok_or(ScheduleError::WindowOverflow(task.id()))?;

            tracing::debug!(task = task.id(), %start, %end, "Assigned window");
            task.assign_window(start, end);
            cursor = end;
        }

        let overdue: BTreeSet<TaskId> = scheduled
            .iter()
            .filter(|task| task.is_overdue())
            .map(TaskNode::id)
            .collect();
        for id in &overdue {
            tracing::warn!(user = user_id, task = id, "Task is planned past its deadline");
        }

        tracing::info!(
            user = user_id,
            scheduled = scheduled.len(),
            untouched = untouched.len(),
            overdue = overdue.len(),
            %anchor,
            "Rescheduled tasks"
        );

        Ok(Schedule {
            scheduled,
            untouched,
            overdue,
            anchor,
            generated_at: now,
        })
    }
}

/// Descending priority, then ascending minimum start with unconstrained tasks first
fn packing_order(a: &TaskNode, b: &TaskNode) -> Ordering {
    // Priorities are validated, so they are never NaN
    b.priority()
        .partial_cmp(&a.priority())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.min_start_time().cmp(&b.min_start_time()))
}
