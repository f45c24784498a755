//! Default policy for fields a task may leave unset
//!
//! Every "missing field" decision the engine makes lives here:
//!
//! | field                | when absent                        |
//! |----------------------|------------------------------------|
//! | `estimated_duration` | `default_duration` (3600 seconds)  |
//! | `min_start_time`     | the scheduling anchor              |
//!
//! Only absent fields are defaulted. Invalid values are rejected when the task
//! is built and never reach the policy.

use chrono::{DateTime, Duration, Utc};

use crate::models::{TaskNode, ValidationError};

/// Duration assumed for a task without an estimate
pub const DEFAULT_DURATION_SECS: i64 = 3600;

/// Defaults applied by the rescheduling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingPolicy {
    default_duration: Duration,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            default_duration: Duration::seconds(DEFAULT_DURATION_SECS),
        }
    }
}

impl SchedulingPolicy {
    /// Creates a policy with a custom default duration, which must be positive
    pub fn with_default_duration_secs(seconds: i64) -> Result<Self, ValidationError> {
        if seconds <= 0 {
            return Err(ValidationError::NonPositiveDuration { seconds });
        }
        Ok(Self {
            default_duration: Duration::seconds(seconds),
        })
    }

    /// Gets the duration used for tasks without an estimate
    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Returns how long `task` occupies the schedule
    pub fn duration_for(&self, task: &TaskNode) -> Duration {
        task.duration_or(self.default_duration)
    }

    /// Returns the earliest moment `task` may start in a run anchored at `anchor`
    pub fn earliest_start_for(&self, task: &TaskNode, anchor: DateTime<Utc>) -> DateTime<Utc> {
        task.min_start_time().unwrap_or(anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_policy() {
        let policy = SchedulingPolicy::default();
        assert_eq!(policy.default_duration(), Duration::seconds(3600));
    }

    #[test]
    fn test_custom_default_duration() {
        let policy = SchedulingPolicy::with_default_duration_secs(900).unwrap();
        let task = TaskNode::builder(1, 1, "t").build().unwrap();

        assert_eq!(policy.duration_for(&task), Duration::minutes(15));
        assert!(SchedulingPolicy::with_default_duration_secs(0).is_err());
    }

    #[test]
    fn test_earliest_start_falls_back_to_anchor() {
        let policy = SchedulingPolicy::default();
        let anchor = Utc.with_ymd_and_hms(2025, 6, 23, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 6, 23, 19, 0, 0).unwrap();

        let free = TaskNode::builder(1, 1, "t").build().unwrap();
        let pinned = TaskNode::builder(2, 1, "t")
            .min_start_time(later)
            .build()
            .unwrap();

        assert_eq!(policy.earliest_start_for(&free, anchor), anchor);
        assert_eq!(policy.earliest_start_for(&pinned, anchor), later);
    }
}
