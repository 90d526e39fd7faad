use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use arca_common::model::Snapshot;

use crate::error::ApiError;
use crate::response::{Created, Ok as RespOk};

use super::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateSnapshotRequest {
    pub svm_name: String,
    pub source_path: String,
    pub snapshot_path: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RestoreSnapshotRequest {
    pub svm_name: String,
    pub snapshot_path: String,
    pub target_path: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DeleteSnapshotQuery {
    pub svm_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct SnapshotResponse {
    pub svm: String,
    pub source_path: String,
    pub snapshot_path: String,
    pub size_bytes: u64,
    pub ready_to_use: bool,
}

impl From<Snapshot> for SnapshotResponse {
    fn from(s: Snapshot) -> Self {
        SnapshotResponse {
            svm: s.svm,
            source_path: s.source_path,
            snapshot_path: s.snapshot_path,
            size_bytes: s.size_bytes,
            ready_to_use: s.ready_to_use,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/snapshots",
    request_body = CreateSnapshotRequest,
    responses(
        (status = 201, description = "Snapshot created", body = SnapshotResponse),
        (status = 404, description = "source path not found", body = ApiError)
    ),
    tag = "snapshots"
)]
pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<Created<SnapshotResponse>, ApiError> {
    let snapshot = state
        .orchestrator
        .create_snapshot(&req.svm_name, &req.source_path, &req.snapshot_path)
        .await?;
    Ok(Created(snapshot.into()))
}

#[utoipa::path(
    post,
    path = "/v1/snapshots/restore",
    request_body = RestoreSnapshotRequest,
    responses(
        (status = 200, description = "restored"),
        (status = 404, description = "snapshot not found", body = ApiError)
    ),
    tag = "snapshots"
)]
pub async fn restore_snapshot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RestoreSnapshotRequest>,
) -> Result<RespOk<()>, ApiError> {
    state
        .orchestrator
        .restore_snapshot(&req.svm_name, &req.snapshot_path, &req.target_path)
        .await?;
    Ok(RespOk(()))
}

#[utoipa::path(
    delete,
    path = "/v1/snapshots/{path}",
    params(
        ("path" = String, Path, description = "snapshot path"),
        ("svm_name" = String, Query, description = "owning SVM")
    ),
    responses((status = 200, description = "deleted (idempotent)")),
    tag = "snapshots"
)]
pub async fn delete_snapshot(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(q): Query<DeleteSnapshotQuery>,
) -> Result<RespOk<()>, ApiError> {
    state.orchestrator.delete_snapshot(&q.svm_name, &path).await?;
    Ok(RespOk(()))
}
