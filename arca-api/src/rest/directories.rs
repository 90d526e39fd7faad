use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::response::{Created, Ok as RespOk};

use super::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateDirectoryRequest {
    pub svm_name: String,
    pub path: String,
    pub quota_bytes: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct DeleteDirectoryQuery {
    pub svm_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct DirectoryResponse {
    pub svm: String,
    pub path: String,
    pub quota_bytes: u64,
    pub project_id: u32,
}

#[utoipa::path(
    post,
    path = "/v1/directories",
    request_body = CreateDirectoryRequest,
    responses(
        (status = 201, description = "Directory created", body = DirectoryResponse),
        (status = 404, description = "SVM not found", body = ApiError)
    ),
    tag = "directories"
)]
pub async fn create_directory(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDirectoryRequest>,
) -> Result<Created<DirectoryResponse>, ApiError> {
    let project_id = state
        .orchestrator
        .create_directory(&req.svm_name, &req.path, req.quota_bytes)
        .await?;
    Ok(Created(DirectoryResponse {
        svm: req.svm_name,
        path: req.path,
        quota_bytes: req.quota_bytes,
        project_id,
    }))
}

#[utoipa::path(
    delete,
    path = "/v1/directories/{path}",
    params(
        ("path" = String, Path, description = "directory path"),
        ("svm_name" = String, Query, description = "owning SVM")
    ),
    responses((status = 200, description = "deleted (idempotent)")),
    tag = "directories"
)]
pub async fn delete_directory(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(q): Query<DeleteDirectoryQuery>,
) -> Result<RespOk<()>, ApiError> {
    state.orchestrator.delete_directory(&q.svm_name, &path).await?;
    Ok(RespOk(()))
}
