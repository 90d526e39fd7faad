use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use arca_common::model::Volume;

use crate::error::ApiError;
use crate::response::{Created, Ok as RespOk};

use super::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateVolumeRequest {
    pub svm: String,
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct GrowVolumeRequest {
    pub svm: String,
    pub size_bytes: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct DeleteVolumeQuery {
    pub svm: String,
}

#[derive(Serialize, ToSchema)]
pub struct VolumeResponse {
    pub svm: String,
    pub name: String,
    pub size_bytes: u64,
    pub path: String,
}

impl From<Volume> for VolumeResponse {
    fn from(v: Volume) -> Self {
        VolumeResponse {
            svm: v.svm,
            name: v.name,
            size_bytes: v.size_bytes,
            path: v.path,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/volumes",
    request_body = CreateVolumeRequest,
    responses(
        (status = 201, description = "Volume created", body = VolumeResponse),
        (status = 200, description = "already converged", body = VolumeResponse),
        (status = 409, description = "conflict", body = ApiError)
    ),
    tag = "volumes"
)]
pub async fn create_volume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVolumeRequest>,
) -> Result<RespOk<VolumeResponse>, ApiError> {
    let volume = state.orchestrator.create_volume(&req.svm, &req.name, req.size_bytes).await?;
    Ok(RespOk(volume.into()))
}

#[utoipa::path(
    patch,
    path = "/v1/volumes/{name}",
    params(("name" = String, Path, description = "Volume name")),
    request_body = GrowVolumeRequest,
    responses(
        (status = 200, description = "resized (or no-op if not larger)", body = VolumeResponse),
        (status = 404, description = "not found", body = ApiError)
    ),
    tag = "volumes"
)]
pub async fn grow_volume(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<GrowVolumeRequest>,
) -> Result<RespOk<VolumeResponse>, ApiError> {
    let volume = state.orchestrator.resize_volume(&req.svm, &name, req.size_bytes).await?;
    Ok(RespOk(volume.into()))
}

#[utoipa::path(
    delete,
    path = "/v1/volumes/{name}",
    params(
        ("name" = String, Path, description = "Volume name"),
        ("svm" = String, Query, description = "owning SVM")
    ),
    responses((status = 200, description = "deleted")),
    tag = "volumes"
)]
pub async fn delete_volume(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(q): Query<DeleteVolumeQuery>,
) -> Result<RespOk<()>, ApiError> {
    state.orchestrator.delete_volume(&q.svm, &name).await?;
    Ok(RespOk(()))
}
