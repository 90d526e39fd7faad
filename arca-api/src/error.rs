//! HTTP error mapping for the REST surface (§7). The `kind` taxonomy lives
//! in `arca_common::error`; here it is mapped onto status codes and the
//! response envelope `{ "data": …, "error": "…", "message": "…" }` (§6).

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use arca_common::error::{ArcaError, ErrorKind};

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub data: Option<()>,
    pub error: String,
    pub message: String,
}

impl From<ArcaError> for ApiError {
    fn from(e: ArcaError) -> Self {
        ApiError {
            data: None,
            error: format!("{:?}", e.kind()),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        // §6: 404 for missing, 409 differentiated in message between
        // resource-already-exists and network-resource-conflict.
        let status = match self.error.as_str() {
            "NotFound" => StatusCode::NOT_FOUND,
            "AlreadyExists" | "NetworkConflict" => StatusCode::CONFLICT,
            "Validation" => StatusCode::BAD_REQUEST,
            "CapacityExhausted" => StatusCode::INSUFFICIENT_STORAGE,
            "Transient" | "Unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "StateMachine" | "Corruption" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::NetworkConflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::CapacityExhausted => StatusCode::INSUFFICIENT_STORAGE,
        ErrorKind::Transient | ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::StateMachine | ErrorKind::Corruption => StatusCode::CONFLICT,
    }
}
