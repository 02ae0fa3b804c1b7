//! HTTP transport adapter
//!
//! Two routers over one `CoordinationContext`: the rendezvous router served
//! at the well-known address, and the coordinator router served at the
//! coordinator's derived address.

use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use crate::cluster::Abandoned;
use crate::coordinator::{CoordinationContext, ExamCreated, WriteOutcome};
use crate::error::{CoordError, Result};
use crate::types::{ExamDraft, LeaderInfo, NodeSnapshot, ScheduledExam};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }

    /// Unwrap on the client side
    pub fn into_result(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(CoordError::system(
                self.error.unwrap_or_else(|| "empty response".to_string()),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Generated by the coordinator when absent
    #[serde(default)]
    pub session_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReply {
    pub session_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub exam_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReply {
    pub message: String,
    pub outcome: WriteOutcome,
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn status_for(err: &CoordError) -> StatusCode {
    match err {
        CoordError::UnknownSession(_) | CoordError::RecordNotFound(_) | CoordError::UnknownNode(_) => {
            StatusCode::NOT_FOUND
        }
        CoordError::ConflictingRequest { .. } | CoordError::DuplicateRecord(_) => StatusCode::CONFLICT,
        CoordError::NoNodesAvailable | CoordError::UnknownCoordinator(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoordError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T>(result: Result<T>, success: StatusCode) -> ApiResult<T> {
    match result {
        Ok(data) => (success, Json(ApiResponse::ok(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!("Request failed: {}", e);
            }
            (status, Json(ApiResponse::failed(e.to_string())))
        }
    }
}

pub fn rendezvous_router(ctx: Arc<CoordinationContext>) -> Router {
    Router::new()
        .route("/leader", get(leader))
        .with_state(ctx)
}

pub fn coordinator_router(ctx: Arc<CoordinationContext>) -> Router {
    Router::new()
        .route("/sessions", post(initialize_session))
        .route("/sessions/{code}/schedule", get(schedule))
        .route("/sessions/{code}/register", post(register))
        .route("/sessions/{code}/register/{exam_id}", delete(abandon))
        .route("/exams", post(create_exam))
        .route("/cluster", get(cluster))
        .with_state(ctx)
}

async fn leader(State(ctx): State<Arc<CoordinationContext>>) -> ApiResult<LeaderInfo> {
    respond(ctx.resolve_coordinator(), StatusCode::OK)
}

async fn initialize_session(
    State(ctx): State<Arc<CoordinationContext>>,
    Json(request): Json<SessionRequest>,
) -> ApiResult<SessionReply> {
    let code = request
        .session_code
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let result = ctx
        .initialize_session(&code)
        .map(|session_code| SessionReply { session_code });
    respond(result, StatusCode::OK)
}

async fn schedule(
    State(ctx): State<Arc<CoordinationContext>>,
    Path(code): Path<String>,
) -> ApiResult<Vec<ScheduledExam>> {
    respond(ctx.read_schedule(&code), StatusCode::OK)
}

async fn register(
    State(ctx): State<Arc<CoordinationContext>>,
    Path(code): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<RegisterReply> {
    let result = ctx.perform_guarded_write(&code, &request.exam_id);
    let status = match &result {
        Ok(WriteOutcome::Deferred { .. }) => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    let result = result.map(|outcome| RegisterReply {
        message: outcome.message().to_string(),
        outcome,
    });
    respond(result, status)
}

async fn abandon(
    State(ctx): State<Arc<CoordinationContext>>,
    Path((code, exam_id)): Path<(String, String)>,
) -> ApiResult<Abandoned> {
    respond(ctx.abandon_guarded_write(&code, &exam_id), StatusCode::OK)
}

async fn create_exam(
    State(ctx): State<Arc<CoordinationContext>>,
    Json(draft): Json<ExamDraft>,
) -> ApiResult<ExamCreated> {
    respond(ctx.create_exam(draft), StatusCode::CREATED)
}

async fn cluster(State(ctx): State<Arc<CoordinationContext>>) -> ApiResult<Vec<NodeSnapshot>> {
    respond(Ok(ctx.cluster_status()), StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_into_result() {
        assert_eq!(ApiResponse::ok(5).into_result().unwrap(), 5);
        let failed: ApiResponse<u8> = ApiResponse::failed("boom");
        assert_eq!(failed.into_result().unwrap_err(), CoordError::System("boom".to_string()));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&CoordError::UnknownSession("s".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&CoordError::DuplicateRecord("e".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&CoordError::NoNodesAvailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&CoordError::Io("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
