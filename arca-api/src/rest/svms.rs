use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use arca_common::model::{Svm, SvmState};

use crate::error::ApiError;
use crate::response::{Created, Ok as RespOk};

use super::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateSvmRequest {
    pub name: String,
    pub vlan_id: u16,
    pub ip_cidr: String,
    pub gateway: Option<String>,
    pub mtu: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct SvmResponse {
    pub name: String,
    pub vlan_id: u16,
    pub ip_cidr: String,
    pub vip: String,
    pub gateway: String,
    pub mtu: u32,
    pub state: String,
    pub created_at: String,
}

impl From<Svm> for SvmResponse {
    fn from(svm: Svm) -> Self {
        SvmResponse {
            name: svm.name,
            vlan_id: svm.vlan_id,
            ip_cidr: svm.ip_cidr,
            vip: svm.vip.to_string(),
            gateway: svm.gateway.to_string(),
            mtu: svm.mtu,
            state: match svm.state {
                SvmState::Creating => "creating".into(),
                SvmState::Ready => "ready".into(),
                SvmState::Degraded => "degraded".into(),
                SvmState::Deleting => "deleting".into(),
            },
            created_at: svm.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CapacityResponse {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub provisioned_bytes: u64,
}

#[utoipa::path(
    post,
    path = "/v1/svms",
    request_body = CreateSvmRequest,
    responses(
        (status = 201, description = "SVM created", body = SvmResponse),
        (status = 200, description = "SVM already converged to requested state", body = SvmResponse),
        (status = 409, description = "name or network conflict", body = ApiError),
        (status = 400, description = "validation error", body = ApiError)
    ),
    tag = "svms"
)]
pub async fn create_svm(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSvmRequest>,
) -> Result<axum::response::Response, ApiError> {
    use axum::response::IntoResponse;
    let gateway = req
        .gateway
        .as_deref()
        .map(|g| g.parse())
        .transpose()
        .map_err(|_| ApiError::from(arca_common::ArcaError::validation("gateway must be a valid IPv4 address")))?;
    let (svm, created) = state
        .orchestrator
        .create_svm(&req.name, req.vlan_id, &req.ip_cidr, gateway, req.mtu)
        .await?;
    let resp: SvmResponse = svm.into();
    Ok(if created {
        Created(resp).into_response()
    } else {
        RespOk(resp).into_response()
    })
}

#[utoipa::path(
    get,
    path = "/v1/svms",
    responses((status = 200, description = "List SVMs", body = [SvmResponse])),
    tag = "svms"
)]
pub async fn list_svms(State(state): State<Arc<AppState>>) -> Result<RespOk<Vec<SvmResponse>>, ApiError> {
    let svms = state.orchestrator.list_svms().await?;
    Ok(RespOk(svms.into_iter().map(SvmResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/svms/{name}",
    params(("name" = String, Path, description = "SVM name")),
    responses(
        (status = 200, description = "SVM", body = SvmResponse),
        (status = 404, description = "not found", body = ApiError)
    ),
    tag = "svms"
)]
pub async fn get_svm(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<RespOk<SvmResponse>, ApiError> {
    let svm = state.orchestrator.get_svm(&name).await?;
    Ok(RespOk(svm.into()))
}

#[utoipa::path(
    get,
    path = "/v1/svms/{name}/capacity",
    params(("name" = String, Path, description = "SVM name")),
    responses(
        (status = 200, description = "capacity info", body = CapacityResponse),
        (status = 404, description = "not found", body = ApiError)
    ),
    tag = "svms"
)]
pub async fn get_capacity(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<RespOk<CapacityResponse>, ApiError> {
    let stats = state.orchestrator.get_capacity(&name).await?;
    Ok(RespOk(CapacityResponse {
        total_bytes: stats.total_bytes,
        available_bytes: stats.available_bytes,
        used_bytes: stats.used_bytes,
        provisioned_bytes: stats.provisioned_bytes,
    }))
}

#[utoipa::path(
    delete,
    path = "/v1/svms/{name}",
    params(("name" = String, Path, description = "SVM name")),
    responses((status = 200, description = "deleted (cascades)", body = SvmResponse)),
    tag = "svms"
)]
pub async fn delete_svm(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<RespOk<()>, ApiError> {
    state.orchestrator.delete_svm(&name).await?;
    Ok(RespOk(()))
}
