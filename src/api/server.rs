//! API Server module
//!
//! This module exposes the rescheduling engine and the tree mutations over HTTP.

use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::TaskId;
use crate::scheduler::ScheduleError;
use crate::service::{RescheduleRequest, Service, ServiceError};
use crate::store::StoreError;
use crate::tree::TreeError;

/// Request naming a parent/child pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEdgeRequest {
    pub parent_id: TaskId,
    pub child_id: TaskId,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// HTTP status for each kind of service failure
fn error_status(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Tree(TreeError::NotFound(_))
        | ServiceError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        ServiceError::Tree(_) => StatusCode::CONFLICT,
        ServiceError::Schedule(ScheduleError::CrossUser { .. }) => StatusCode::CONFLICT,
        ServiceError::Schedule(ScheduleError::WindowOverflow(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Store(StoreError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::Store(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Helper function to map service results to Axum responses
fn map_service_result<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                tracing::error!("Request failed: {}", e);
            } else {
                tracing::debug!("Request rejected: {}", e);
            }
            (status, Json(ApiResponse::<T>::error(e.to_string()))).into_response()
        }
    }
}

/// Builds the application router
pub fn router(service: Service) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/reschedule", post(reschedule))
        .route("/api/tree/attach", post(attach))
        .route("/api/tree/detach", post(detach))
        .route("/api/tasks/:id", delete(delete_task))
        .route("/api/tasks/:id/tree", get(get_subtree))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

/// Starts the API server
pub async fn serve(service: Service, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(service);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn reschedule(
    State(service): State<Service>,
    Json(payload): Json<RescheduleRequest>,
) -> impl IntoResponse {
    map_service_result(service.reschedule(payload).await)
}

async fn attach(
    State(service): State<Service>,
    Json(payload): Json<TreeEdgeRequest>,
) -> impl IntoResponse {
    map_service_result(service.attach(payload.parent_id, payload.child_id).await)
}

async fn detach(
    State(service): State<Service>,
    Json(payload): Json<TreeEdgeRequest>,
) -> impl IntoResponse {
    map_service_result(service.detach(payload.parent_id, payload.child_id).await)
}

async fn delete_task(State(service): State<Service>, Path(id): Path<TaskId>) -> impl IntoResponse {
    map_service_result(service.delete(id).await)
}

async fn get_subtree(State(service): State<Service>, Path(id): Path<TaskId>) -> impl IntoResponse {
    map_service_result(service.subtree(id).await)
}
