use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use tasker::models::{TaskId, TaskNode, TaskStatus};
use tasker::policy::SchedulingPolicy;
use tasker::scheduler::ReschedulingEngine;

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 23, 9, 0, 0).unwrap()
}

/// A mixed bag of tasks: varying priorities, estimates, start constraints,
/// deadlines and statuses
fn workload() -> Vec<TaskNode> {
    let t = anchor();
    let statuses = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Pending,
        TaskStatus::Completed,
        TaskStatus::Pending,
        TaskStatus::Cancelled,
        TaskStatus::Failed,
    ];

    (1..=40)
        .map(|id: TaskId| {
            let mut builder = TaskNode::builder(id, 7, format!("task {id}"))
                .priority(((id * 37) % 11) as f64 / 10.0)
                .status(statuses[(id as usize) % statuses.len()]);
            if id % 3 != 0 {
                builder = builder.estimated_duration(Duration::minutes(5 * (id % 9 + 1)));
            }
            if id % 4 == 0 {
                builder = builder.min_start_time(t + Duration::minutes(17 * id));
            }
            if id % 5 == 0 {
                builder = builder.min_start_time(t - Duration::hours(2));
            }
            if id % 6 == 0 {
                builder = builder.deadline(t + Duration::hours(id));
            }
            builder.build().unwrap()
        })
        .collect()
}

#[test]
fn test_windows_never_overlap() {
    let schedule = ReschedulingEngine::default()
        .reschedule(workload(), anchor(), anchor())
        .unwrap();

    for pair in schedule.scheduled.windows(2) {
        let (_, prev_end) = pair[0].planned_window().unwrap();
        let (next_start, _) = pair[1].planned_window().unwrap();
        assert!(
            prev_end <= next_start,
            "task {} ends after task {} starts",
            pair[0].id(),
            pair[1].id()
        );
    }
}

#[test]
fn test_windows_respect_anchor_min_start_and_duration() {
    let policy = SchedulingPolicy::with_default_duration_secs(1200).unwrap();
    let schedule = ReschedulingEngine::new(policy)
        .reschedule(workload(), anchor(), anchor())
        .unwrap();

    assert!(!schedule.scheduled.is_empty());
    for task in &schedule.scheduled {
        let (start, end) = task.planned_window().unwrap();
        assert!(start >= anchor());
        if let Some(min_start) = task.min_start_time() {
            assert!(start >= min_start);
        }
        let expected = task.estimated_duration().unwrap_or(Duration::seconds(1200));
        assert_eq!(end - start, expected);
    }
}

#[test]
fn test_priority_never_increases_along_the_schedule() {
    let schedule = ReschedulingEngine::default()
        .reschedule(workload(), anchor(), anchor())
        .unwrap();

    for pair in schedule.scheduled.windows(2) {
        assert!(pair[0].priority() >= pair[1].priority());
    }
}

#[test]
fn test_terminal_tasks_are_returned_unchanged() {
    let input = workload();
    let terminal: Vec<TaskNode> = input.iter().filter(|t| t.is_terminal()).cloned().collect();

    let schedule = ReschedulingEngine::default()
        .reschedule(input, anchor(), anchor())
        .unwrap();

    assert_eq!(schedule.untouched, terminal);
    assert!(schedule.scheduled.iter().all(|task| !task.is_terminal()));
}

#[test]
fn test_rescheduling_is_deterministic() {
    let engine = ReschedulingEngine::default();
    let first = engine.reschedule(workload(), anchor(), anchor()).unwrap();
    let second = engine.reschedule(workload(), anchor(), anchor()).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_rescheduling_own_output_is_stable() {
    let engine = ReschedulingEngine::default();
    let first = engine.reschedule(workload(), anchor(), anchor()).unwrap();

    let mut again = first.scheduled.clone();
    again.extend(first.untouched.clone());
    let second = engine.reschedule(again, anchor(), anchor()).unwrap();

    assert_eq!(first.scheduled, second.scheduled);
    assert_eq!(first.overdue, second.overdue);
}

#[test]
fn test_overdue_matches_deadlines() {
    let schedule = ReschedulingEngine::default()
        .reschedule(workload(), anchor(), anchor())
        .unwrap();

    for task in &schedule.scheduled {
        let late = match (task.planned_end(), task.deadline()) {
            (Some(end), Some(deadline)) => end > deadline,
            _ => false,
        };
        assert_eq!(schedule.is_overdue(task.id()), late, "task {}", task.id());
    }
}

#[test]
fn test_moving_the_anchor_shifts_unconstrained_tasks() {
    let tasks: Vec<TaskNode> = (1..=5)
        .map(|id| {
            TaskNode::builder(id, 1, format!("task {id}"))
                .estimated_duration(Duration::minutes(30))
                .build()
                .unwrap()
        })
        .collect();
    let engine = ReschedulingEngine::default();
    let later = anchor() + Duration::days(2);

    let a = engine.reschedule(tasks.clone(), anchor(), anchor()).unwrap();
    let b = engine.reschedule(tasks, later, anchor()).unwrap();

    for (x, y) in a.scheduled.iter().zip(&b.scheduled) {
        assert_eq!(x.id(), y.id());
        assert_eq!(
            y.planned_start().unwrap() - x.planned_start().unwrap(),
            Duration::days(2)
        );
    }
}
