//! HTTP client for the data-access service
//!
//! Task records live in a separate CRUD service. Reads and re-parenting use
//! its per-task endpoints (`GET /tasks/`, `GET /tasks/{id}`,
//! `PATCH /tasks/{id}`). Its stock routes only write one task per request, so
//! they cannot make a commit or a cascading delete all-or-nothing. Those two
//! writes therefore go to batch routes the service must add, each applied in
//! one transaction:
//!
//! | Route | Body |
//! |---|---|
//! | `POST /tasks/schedule` | `{"windows": [{"id", "planned_start", "planned_end"}]}` |
//! | `POST /tasks/delete` | `{"ids": [..]}` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{is_candidate, ScheduleStore, StoreError, TreeStore};
use crate::models::{TaskId, TaskNode, UserId};

/// Data-access service configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    /// Upper bound for any single request
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Error body returned by the data-access service
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct PlannedWindow {
    id: TaskId,
    planned_start: DateTime<Utc>,
    planned_end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ScheduleBatch {
    windows: Vec<PlannedWindow>,
}

#[derive(Debug, Serialize)]
struct DeleteBatch<'a> {
    ids: &'a [TaskId],
}

#[derive(Debug, Serialize)]
struct ParentUpdate {
    parent_id: Option<TaskId>,
}

/// Task store backed by the data-access HTTP service
#[derive(Debug, Clone)]
pub struct HttpStore {
    http_client: Arc<ReqwestClient>,
    config: StoreConfig,
}

impl HttpStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let http_client = ReqwestClient::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http_client: Arc::new(http_client),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Turns a non-2xx response into `StoreError::Status`
async fn expect_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body,
    };
    tracing::warn!(status = status.as_u16(), %message, "Data-access service request failed");
    Err(StoreError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Decodes a successful response body, validating task records on the way
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let bytes = expect_success(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl ScheduleStore for HttpStore {
    async fn load_candidates(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
    ) -> Result<Vec<TaskNode>, StoreError> {
        // `/tasks/unscheduled/` drops deadlines against the service's own clock,
        // which loses tasks due in `(from, now]` when `from` is in the past
        let tasks = self.load_user_tasks(user_id).await?;
        Ok(tasks
            .into_iter()
            .filter(|task| is_candidate(task, user_id, from))
            .collect())
    }

    async fn commit(&self, assigned: &[TaskNode]) -> Result<(), StoreError> {
        let windows = assigned
            .iter()
            .map(|task| {
                let (planned_start, planned_end) = task.planned_window().ok_or_else(|| {
                    StoreError::Conflict(format!("task {} has no planned window", task.id()))
                })?;
                Ok(PlannedWindow {
                    id: task.id(),
                    planned_start,
                    planned_end,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .http_client
            .post(self.url("/tasks/schedule"))
            .json(&ScheduleBatch { windows })
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl TreeStore for HttpStore {
    async fn load_task(&self, id: TaskId) -> Result<Option<TaskNode>, StoreError> {
        let response = self
            .http_client
            .get(self.url(&format!("/tasks/{}", id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    async fn load_user_tasks(&self, user_id: UserId) -> Result<Vec<TaskNode>, StoreError> {
        let response = self
            .http_client
            .get(self.url("/tasks/"))
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let tasks: Vec<TaskNode> = decode(response).await?;
        Ok(tasks
            .into_iter()
            .filter(|task| task.user_id() == user_id)
            .collect())
    }

    async fn set_parent(&self, child: TaskId, parent: Option<TaskId>) -> Result<(), StoreError> {
        let response = self
            .http_client
            .patch(self.url(&format!("/tasks/{}", child)))
            .json(&ParentUpdate { parent_id: parent })
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(child));
        }
        expect_success(response).await?;
        Ok(())
    }

    async fn delete_all(&self, ids: &[TaskId]) -> Result<(), StoreError> {
        let response = self
            .http_client
            .post(self.url("/tasks/delete"))
            .json(&DeleteBatch { ids })
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }
}
