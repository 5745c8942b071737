//! Error types for the mutation API.
//!
//! Recoverable conditions (cycles, execution errors) surface as cell state,
//! not request failures; this enum covers the request-failure side of the
//! taxonomy plus the cycle report that rides on a committed mutation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use ripple_core::notebook::CellId;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Caller could not be identified.
    #[error("unauthorized")]
    Unauthorized,

    /// Caller is not the owner of the addressed notebook.
    #[error("forbidden")]
    Forbidden,

    /// Addressed entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic lock failure; carries the current revision.
    #[error("revision conflict: current revision is {current_revision}")]
    Conflict { current_revision: u64 },

    /// The mutation committed, but the cell is blocked on a cycle.
    #[error("cycle: {error}")]
    Cycle { cell_id: CellId, error: String },

    /// Another synchronous operation is in flight for the same key.
    #[error("operation already in flight for {0}")]
    OperationInFlight(String),

    /// The addressed cell is blocked and cannot run.
    #[error("cell {0} is blocked by a dependency cycle")]
    CellBlocked(CellId),

    /// A synchronous kernel round-trip exceeded its budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The kernel process died.
    #[error("kernel died: {0}")]
    KernelDied(String),

    /// The coordinator is shutting down.
    #[error("shutting down")]
    ShuttingDown,

    /// Malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Storage collaborator failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Core engine failure.
    #[error("core error: {0}")]
    Core(#[from] ripple_core::Error),
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } | ApiError::OperationInFlight(_) => StatusCode::CONFLICT,
            ApiError::Cycle { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::CellBlocked(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::KernelDied(_) => StatusCode::BAD_GATEWAY,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict { .. } => "conflict",
            ApiError::OperationInFlight(_) => "operation_in_flight",
            ApiError::Cycle { .. } => "cycle",
            ApiError::CellBlocked(_) => "cell_blocked",
            ApiError::Timeout(_) => "timeout",
            ApiError::KernelDied(_) => "kernel_died",
            ApiError::ShuttingDown => "shutting_down",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Storage(_) => "storage_error",
            ApiError::Core(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        match &self {
            ApiError::Conflict { current_revision } => {
                body["current_revision"] = serde_json::json!(current_revision);
            }
            ApiError::Cycle { cell_id, .. } => {
                body["cell_id"] = serde_json::json!(cell_id);
            }
            _ => {}
        }
        (self.status(), Json(body)).into_response()
    }
}
