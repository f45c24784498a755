//! Core models for the tasker library
//!
//! This module contains the task entity shared by the tree validator and the
//! rescheduling engine. It knows nothing about how tasks are stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::policy;

/// The deepest nesting level a task may carry.
pub const MAX_LEVEL: u32 = 25;

/// Identifier assigned to a task by the store
pub type TaskId = i64;

/// Identifier of the user owning a task
pub type UserId = i64;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal tasks are never (re)scheduled
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field value rejected before it reaches the engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("level {level} is outside [0, {max}]", max = MAX_LEVEL)]
    LevelOutOfRange { level: i64 },

    #[error("{field} {value} is outside [0.0, 1.0]")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("estimated duration must be positive, got {seconds}s")]
    NonPositiveDuration { seconds: i64 },
}

/// A task record as read from the wire, before validation.
///
/// Only `id` and `user_id` are mandatory; everything else falls back to the
/// same defaults the data-access service uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub user_id: UserId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub complexity: f64,
    #[serde(default)]
    pub priority: f64,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    /// Seconds; ISO 8601 durations such as `PT1H30M` are accepted too
    #[serde(default, deserialize_with = "wire::duration_secs")]
    pub estimated_duration: Option<i64>,
    #[serde(
        default,
        alias = "start_time_execution",
        deserialize_with = "wire::timestamp"
    )]
    pub min_start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub planned_start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub planned_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TaskStatus,
}

/// A task and its place in a user's task tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord")]
pub struct TaskNode {
    id: TaskId,
    user_id: UserId,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    tags: Vec<String>,
    level: u32,
    complexity: f64,
    priority: f64,
    parent_id: Option<TaskId>,
    estimated_duration: Option<i64>,
    min_start_time: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    planned_start: Option<DateTime<Utc>>,
    planned_end: Option<DateTime<Utc>>,
    status: TaskStatus,
}

impl TryFrom<TaskRecord> for TaskNode {
    type Error = ValidationError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let level = u32::try_from(record.level)
            .ok()
            .filter(|level| *level <= MAX_LEVEL)
            .ok_or(ValidationError::LevelOutOfRange {
                level: record.level,
            })?;
        check_unit_range("complexity", record.complexity)?;
        check_unit_range("priority", record.priority)?;
        if let Some(seconds) = record.estimated_duration {
            if seconds <= 0 {
                return Err(ValidationError::NonPositiveDuration { seconds });
            }
        }

        Ok(Self {
            id: record.id,
            user_id: record.user_id,
            title: record.title,
            description: record.description,
            tags: record.tags,
            level,
            complexity: record.complexity,
            priority: record.priority,
            parent_id: record.parent_id,
            estimated_duration: record.estimated_duration,
            min_start_time: record.min_start_time,
            deadline: record.deadline,
            planned_start: record.planned_start,
            planned_end: record.planned_end,
            status: record.status,
        })
    }
}

/// Lenient readers for the field encodings the data-access service emits
mod wire {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Whole(i64),
        Fractional(f64),
        Iso(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Zoned(DateTime<Utc>),
        /// No offset on the wire means UTC
        Naive(NaiveDateTime),
    }

    pub(super) fn duration_secs<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Seconds>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Seconds::Whole(seconds)) => Ok(Some(seconds)),
            Some(Seconds::Fractional(seconds)) => Ok(Some(seconds.round() as i64)),
            Some(Seconds::Iso(text)) => parse_iso_duration(&text).map(Some).ok_or_else(|| {
                de::Error::custom(format!("invalid ISO 8601 duration {:?}", text))
            }),
        }
    }

    pub(super) fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(
            Option::<Timestamp>::deserialize(deserializer)?.map(|at| match at {
                Timestamp::Zoned(at) => at,
                Timestamp::Naive(at) => at.and_utc(),
            }),
        )
    }

    /// Parses `[-]P[nW][nD][T[nH][nM][n[.f]S]]` into whole seconds.
    ///
    /// Years and months have no fixed length and are rejected.
    pub(super) fn parse_iso_duration(text: &str) -> Option<i64> {
        let (sign, rest) = match text.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, text),
        };
        let rest = rest.strip_prefix('P')?;
        let (date, time) = match rest.split_once('T') {
            Some((date, time)) if !time.is_empty() => (date, Some(time)),
            Some(_) => return None,
            None if rest.is_empty() => return None,
            None => (rest, None),
        };

        let mut total = components(date, &[('W', 604_800.0), ('D', 86_400.0)])?;
        if let Some(time) = time {
            total += components(time, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])?;
        }
        Some((sign * total).round() as i64)
    }

    /// Sums `<number><unit>` pairs; units must appear in the given order
    fn components(mut text: &str, units: &[(char, f64)]) -> Option<f64> {
        let mut units = units.iter();
        let mut total = 0.0;
        while !text.is_empty() {
            let end = text.find(|c: char| c.is_ascii_alphabetic())?;
            let value: f64 = text[..end].parse().ok()?;
            let unit = text[end..].chars().next()?;
            let (_, scale) = units.find(|(candidate, _)| *candidate == unit)?;
            total += value * scale;
            text = &text[end + unit.len_utf8()..];
        }
        Some(total)
    }
}

fn check_unit_range(field: &'static str, value: f64) -> Result<(), ValidationError> {
    // NaN fails `contains` as well
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfUnitRange { field, value })
    }
}

impl TaskNode {
    /// Starts building a pending root task with the given identity
    pub fn builder(id: TaskId, user_id: UserId, title: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            record: TaskRecord {
                id,
                user_id,
                title: title.into(),
                ..TaskRecord::default()
            },
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn complexity(&self) -> f64 {
        self.complexity
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    /// Returns the estimate if one was recorded
    pub fn estimated_duration(&self) -> Option<Duration> {
        self.estimated_duration.map(Duration::seconds)
    }

    pub fn min_start_time(&self) -> Option<DateTime<Utc>> {
        self.min_start_time
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn planned_start(&self) -> Option<DateTime<Utc>> {
        self.planned_start
    }

    pub fn planned_end(&self) -> Option<DateTime<Utc>> {
        self.planned_end
    }

    /// Returns the planned `[start, end)` window once the engine has assigned one
    pub fn planned_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.planned_start.zip(self.planned_end)
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// A root task has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Open and with a deadline absent or after `from`
    pub fn is_schedulable(&self, from: DateTime<Utc>) -> bool {
        !self.is_terminal() && self.deadline.map_or(true, |deadline| deadline > from)
    }

    /// Duration used for scheduling under the default policy
    pub fn duration_or_default(&self) -> Duration {
        self.duration_or(Duration::seconds(policy::DEFAULT_DURATION_SECS))
    }

    /// Duration used for scheduling, falling back to `default` when unset
    pub fn duration_or(&self, default: Duration) -> Duration {
        self.estimated_duration().unwrap_or(default)
    }

    /// True when the task misses its deadline with the current plan
    pub fn is_overdue(&self) -> bool {
        match (self.planned_end, self.deadline) {
            (Some(end), Some(deadline)) => end > deadline,
            _ => false,
        }
    }

    pub(crate) fn assign_window(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.planned_start = Some(start);
        self.planned_end = Some(end);
    }

    pub(crate) fn set_parent(&mut self, parent_id: Option<TaskId>) {
        self.parent_id = parent_id;
    }
}

/// Builder for [`TaskNode`]; `build` runs the same checks as deserialization
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    record: TaskRecord,
}

impl TaskBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn level(mut self, level: i64) -> Self {
        self.record.level = level;
        self
    }

    pub fn complexity(mut self, complexity: f64) -> Self {
        self.record.complexity = complexity;
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.record.priority = priority;
        self
    }

    pub fn parent(mut self, parent_id: TaskId) -> Self {
        self.record.parent_id = Some(parent_id);
        self
    }

    /// Sub-second precision is dropped
    pub fn estimated_duration(mut self, duration: Duration) -> Self {
        self.record.estimated_duration = Some(duration.num_seconds());
        self
    }

    pub fn min_start_time(mut self, at: DateTime<Utc>) -> Self {
        self.record.min_start_time = Some(at);
        self
    }

    pub fn deadline(mut self, at: DateTime<Utc>) -> Self {
        self.record.deadline = Some(at);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn build(self) -> Result<TaskNode, ValidationError> {
        TaskNode::try_from(self.record)
    }
}

/// A task together with its entire subtree of subtasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWithSubtasks {
    #[serde(flatten)]
    pub task: TaskNode,
    pub subtasks: Vec<TaskWithSubtasks>,
}

impl TaskWithSubtasks {
    /// Number of tasks in this subtree, including the root
    pub fn len(&self) -> usize {
        1 + self.subtasks.iter().map(TaskWithSubtasks::len).sum::<usize>()
    }

    /// Never true; a subtree always holds its root
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 23, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let task = TaskNode::builder(1, 7, "Write report").build().unwrap();

        assert_eq!(task.id(), 1);
        assert_eq!(task.user_id(), 7);
        assert_eq!(task.level(), 0);
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(task.is_root());
        assert!(!task.is_terminal());
        assert_eq!(task.planned_window(), None);
        assert_eq!(task.duration_or_default(), Duration::seconds(3600));
    }

    #[test]
    fn test_level_bounds() {
        assert!(TaskNode::builder(1, 1, "t").level(25).build().is_ok());
        assert_eq!(
            TaskNode::builder(1, 1, "t").level(26).build(),
            Err(ValidationError::LevelOutOfRange { level: 26 })
        );
        assert_eq!(
            TaskNode::builder(1, 1, "t").level(-1).build(),
            Err(ValidationError::LevelOutOfRange { level: -1 })
        );
    }

    #[test]
    fn test_unit_range_fields() {
        assert!(TaskNode::builder(1, 1, "t")
            .priority(1.0)
            .complexity(0.0)
            .build()
            .is_ok());

        let err = TaskNode::builder(1, 1, "t").priority(1.1).build().unwrap_err();
        assert!(err.to_string().contains("priority"));

        let err = TaskNode::builder(1, 1, "t")
            .complexity(-0.1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("complexity"));

        assert!(TaskNode::builder(1, 1, "t")
            .priority(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        assert_eq!(
            TaskNode::builder(1, 1, "t")
                .estimated_duration(Duration::zero())
                .build(),
            Err(ValidationError::NonPositiveDuration { seconds: 0 })
        );
        assert!(TaskNode::builder(1, 1, "t")
            .estimated_duration(Duration::seconds(-30))
            .build()
            .is_err());
    }

    #[test]
    fn test_duration_prefers_estimate() {
        let task = TaskNode::builder(1, 1, "t")
            .estimated_duration(Duration::minutes(30))
            .build()
            .unwrap();

        assert_eq!(task.duration_or_default(), Duration::minutes(30));
        assert_eq!(task.duration_or(Duration::hours(5)), Duration::minutes(30));
    }

    #[test]
    fn test_status_display_matches_wire_name() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, serde_json::Value::String(status.to_string()));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_overdue_flag() {
        let mut task = TaskNode::builder(1, 1, "t").deadline(at(10)).build().unwrap();
        assert!(!task.is_overdue());

        task.assign_window(at(9), at(10));
        assert!(!task.is_overdue());

        task.assign_window(at(10), at(11));
        assert!(task.is_overdue());
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let task: TaskNode = serde_json::from_str(
            r#"{"id": 4, "user_id": 2, "status": "in_progress", "priority": 0.5}"#,
        )
        .unwrap();

        assert_eq!(task.id(), 4);
        assert_eq!(task.status(), TaskStatus::InProgress);
        assert_eq!(task.priority(), 0.5);
        assert_eq!(task.estimated_duration(), None);
    }

    #[test]
    fn test_deserialize_accepts_start_time_execution_alias() {
        let task: TaskNode = serde_json::from_str(
            r#"{"id": 4, "user_id": 2, "start_time_execution": "2025-06-23T19:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(task.min_start_time(), Some(at(19)));
    }

    #[test]
    fn test_deserialize_iso_duration_and_naive_timestamps() {
        let task: TaskNode = serde_json::from_str(
            r#"{"id": 1, "user_id": 1, "title": "abc", "estimated_duration": "PT1H",
                "deadline": "2025-06-24T10:00:00",
                "start_time_execution": "2025-06-23T19:00:00.000000"}"#,
        )
        .unwrap();

        assert_eq!(task.estimated_duration(), Some(Duration::hours(1)));
        assert_eq!(
            task.deadline(),
            Some(Utc.with_ymd_and_hms(2025, 6, 24, 10, 0, 0).unwrap())
        );
        assert_eq!(task.min_start_time(), Some(at(19)));

        // Offsets are still honored
        let task: TaskNode = serde_json::from_str(
            r#"{"id": 1, "user_id": 1, "deadline": "2025-06-24T12:00:00+02:00",
                "estimated_duration": 90.4}"#,
        )
        .unwrap();
        assert_eq!(
            task.deadline(),
            Some(Utc.with_ymd_and_hms(2025, 6, 24, 10, 0, 0).unwrap())
        );
        assert_eq!(task.estimated_duration(), Some(Duration::seconds(90)));
    }

    #[test]
    fn test_parse_iso_duration() {
        use super::wire::parse_iso_duration;

        assert_eq!(parse_iso_duration("PT1H"), Some(3600));
        assert_eq!(parse_iso_duration("PT1H30M"), Some(5400));
        assert_eq!(parse_iso_duration("P1DT2H"), Some(93_600));
        assert_eq!(parse_iso_duration("P2W"), Some(1_209_600));
        assert_eq!(parse_iso_duration("PT0.5S"), Some(1));
        assert_eq!(parse_iso_duration("PT25M12.4S"), Some(1512));
        assert_eq!(parse_iso_duration("-PT10M"), Some(-600));

        assert_eq!(parse_iso_duration(""), None);
        assert_eq!(parse_iso_duration("P"), None);
        assert_eq!(parse_iso_duration("P1DT"), None);
        assert_eq!(parse_iso_duration("P1M"), None);
        assert_eq!(parse_iso_duration("PT1M1H"), None);
        assert_eq!(parse_iso_duration("3600"), None);
    }

    #[test]
    fn test_negative_iso_duration_is_rejected() {
        let result: Result<TaskNode, _> = serde_json::from_str(
            r#"{"id": 1, "user_id": 1, "estimated_duration": "-PT1H"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let result: Result<TaskNode, _> =
            serde_json::from_str(r#"{"id": 4, "user_id": 2, "level": 40}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_round_trips_through_validation() {
        let task = TaskNode::builder(3, 9, "Practice scales")
            .description("1. Warm-up [10 min]")
            .tags(["music"])
            .level(2)
            .priority(0.7)
            .complexity(0.8)
            .parent(1)
            .estimated_duration(Duration::minutes(25))
            .min_start_time(at(19))
            .deadline(at(22))
            .build()
            .unwrap();

        let json = serde_json::to_string(&task).unwrap();
        let back: TaskNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_subtree_len() {
        let leaf = |id| TaskWithSubtasks {
            task: TaskNode::builder(id, 1, "leaf").parent(1).build().unwrap(),
            subtasks: Vec::new(),
        };
        let tree = TaskWithSubtasks {
            task: TaskNode::builder(1, 1, "root").build().unwrap(),
            subtasks: vec![leaf(2), leaf(3)],
        };

        assert_eq!(tree.len(), 3);
        assert!(!tree.is_empty());
    }
}
