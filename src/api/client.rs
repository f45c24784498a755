//! API client module
//!
//! This module provides HTTP client functionality to interact with the tasker API server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{Client as ReqwestClient, Error as ReqwestError, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::server::TreeEdgeRequest;
use crate::models::{TaskId, TaskNode, TaskWithSubtasks, UserId};
use crate::service::{RescheduleRequest, RescheduleResponse};

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("Missing data in response")]
    MissingData,
}

/// API client for the tasker service
#[derive(Debug, Clone)]
pub struct Client {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Client {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Sends the request and unwraps the `ApiResponse` envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let api_response: ApiResponse<T> = response.json().await?;

        if api_response.success {
            api_response.data.ok_or(ClientError::MissingData)
        } else {
            Err(ClientError::Api(api_response.error.unwrap_or_else(|| {
                format!("Unknown API error ({})", status)
            })))
        }
    }

    /// Reschedule all eligible tasks of a user, starting at `anchor` or now
    pub async fn reschedule(
        &self,
        user_id: UserId,
        anchor: Option<DateTime<Utc>>,
    ) -> Result<RescheduleResponse, ClientError> {
        let request = RescheduleRequest { user_id, anchor };
        self.send(
            self.http_client
                .post(self.url("/api/reschedule"))
                .json(&request),
        )
        .await
    }

    /// Make `child_id` a subtask of `parent_id`
    pub async fn attach(&self, parent_id: TaskId, child_id: TaskId) -> Result<TaskNode, ClientError> {
        let request = TreeEdgeRequest {
            parent_id,
            child_id,
        };
        self.send(
            self.http_client
                .post(self.url("/api/tree/attach"))
                .json(&request),
        )
        .await
    }

    /// Detach `child_id` from `parent_id`; false if it was not attached there
    pub async fn detach(&self, parent_id: TaskId, child_id: TaskId) -> Result<bool, ClientError> {
        let request = TreeEdgeRequest {
            parent_id,
            child_id,
        };
        self.send(
            self.http_client
                .post(self.url("/api/tree/detach"))
                .json(&request),
        )
        .await
    }

    /// Delete a task and its whole subtree
    pub async fn delete_task(&self, id: TaskId) -> Result<Vec<TaskId>, ClientError> {
        self.send(self.http_client.delete(self.url(&format!("/api/tasks/{}", id))))
            .await
    }

    /// Get a task with its whole subtree
    pub async fn subtree(&self, id: TaskId) -> Result<TaskWithSubtasks, ClientError> {
        self.send(
            self.http_client
                .get(self.url(&format!("/api/tasks/{}/tree", id))),
        )
        .await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
