//! Success side of the `{ data, error, message }` response envelope (§6).
//! `ApiError` (in `crate::error`) is the failure side; every handler returns
//! `Result<(StatusCode, Json<Envelope<T>>), ApiError>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Envelope<T: Serialize> {
    pub data: T,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Envelope {
            data,
            error: None,
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Envelope {
            data,
            error: None,
            message: Some(message.into()),
        }
    }
}

/// `201` on resource creation, `200` on idempotent re-affirmation (§6).
pub struct Created<T: Serialize>(pub T);
pub struct Ok<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(Envelope::new(self.0))).into_response()
    }
}

impl<T: Serialize> IntoResponse for Ok<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(Envelope::new(self.0))).into_response()
    }
}
