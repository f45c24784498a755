//! Tasker library crate
//!
//! Models a user's goals as a forest of tasks and packs the open ones into a
//! sequential, non-overlapping timeline.
//!
//! - [`models`]: the task record and its validation
//! - [`tree`]: parent/child structure with cycle and depth checks
//! - [`scheduler`]: the rescheduling engine
//! - [`store`]: persistence contracts plus in-memory and HTTP stores
//! - [`service`]: load, compute and commit cycles serialized per user
//! - [`api`]: HTTP server and client

pub mod api;
pub mod cli;
pub mod models;
pub mod policy;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod tree;

pub use api::client::{Client, ClientConfig, ClientError};
pub use models::{TaskId, TaskNode, TaskStatus, TaskWithSubtasks, UserId, ValidationError, MAX_LEVEL};
pub use policy::SchedulingPolicy;
pub use scheduler::{ReschedulingEngine, Schedule, ScheduleError};
pub use service::{Service, ServiceConfig, ServiceError};
pub use store::{HttpStore, MemoryStore, ScheduleStore, StoreError, TaskStore, TreeStore};
pub use tree::{TaskTree, TreeError};
