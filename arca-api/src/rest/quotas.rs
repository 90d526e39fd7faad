use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::response::Ok as RespOk;

use super::AppState;

#[derive(Deserialize, ToSchema)]
pub struct SetQuotaRequest {
    pub svm_name: String,
    pub path: String,
    pub quota_bytes: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct ExpandQuotaRequest {
    pub svm_name: String,
    pub path: String,
    pub quota_bytes: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct GetQuotaQuery {
    pub svm_name: String,
    pub path: String,
}

#[derive(Serialize, ToSchema)]
pub struct QuotaResponse {
    pub svm: String,
    pub path: String,
    pub quota_bytes: u64,
    pub used_bytes: u64,
}

#[utoipa::path(
    post,
    path = "/v1/quotas",
    request_body = SetQuotaRequest,
    responses((status = 200, description = "quota set")),
    tag = "quotas"
)]
pub async fn set_quota(State(state): State<Arc<AppState>>, Json(req): Json<SetQuotaRequest>) -> Result<RespOk<()>, ApiError> {
    state.orchestrator.set_quota(&req.svm_name, &req.path, req.quota_bytes).await?;
    Ok(RespOk(()))
}

#[utoipa::path(
    get,
    path = "/v1/quotas",
    params(
        ("svm_name" = String, Query, description = "owning SVM"),
        ("path" = String, Query, description = "directory path")
    ),
    responses((status = 200, description = "quota info", body = QuotaResponse)),
    tag = "quotas"
)]
pub async fn get_quota(State(state): State<Arc<AppState>>, Query(q): Query<GetQuotaQuery>) -> Result<RespOk<QuotaResponse>, ApiError> {
    let (quota_bytes, used_bytes) = state.orchestrator.get_quota(&q.svm_name, &q.path).await?;
    Ok(RespOk(QuotaResponse {
        svm: q.svm_name,
        path: q.path,
        quota_bytes,
        used_bytes,
    }))
}

#[utoipa::path(
    patch,
    path = "/v1/quotas",
    request_body = ExpandQuotaRequest,
    responses(
        (status = 200, description = "expanded (grow-only)"),
        (status = 400, description = "shrink rejected", body = ApiError)
    ),
    tag = "quotas"
)]
pub async fn expand_quota(State(state): State<Arc<AppState>>, Json(req): Json<ExpandQuotaRequest>) -> Result<RespOk<()>, ApiError> {
    state
        .orchestrator
        .expand_quota(&req.svm_name, &req.path, req.quota_bytes)
        .await?;
    Ok(RespOk(()))
}
