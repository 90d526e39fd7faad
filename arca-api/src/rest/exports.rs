use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use arca_common::model::{Access, Export, SecFlavor, Squash};

use crate::error::ApiError;
use crate::response::{Created, Ok as RespOk};

use super::AppState;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessDto {
    Rw,
    Ro,
}

impl From<AccessDto> for Access {
    fn from(a: AccessDto) -> Self {
        match a {
            AccessDto::Rw => Access::Rw,
            AccessDto::Ro => Access::Ro,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SquashDto {
    RootSquash,
    NoRootSquash,
}

impl From<SquashDto> for Squash {
    fn from(s: SquashDto) -> Self {
        match s {
            SquashDto::RootSquash => Squash::RootSquash,
            SquashDto::NoRootSquash => Squash::NoRootSquash,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecFlavorDto {
    Sys,
    Krb5,
    Krb5i,
    Krb5p,
}

impl From<SecFlavorDto> for SecFlavor {
    fn from(s: SecFlavorDto) -> Self {
        match s {
            SecFlavorDto::Sys => SecFlavor::Sys,
            SecFlavorDto::Krb5 => SecFlavor::Krb5,
            SecFlavorDto::Krb5i => SecFlavor::Krb5i,
            SecFlavorDto::Krb5p => SecFlavor::Krb5p,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AddExportRequest {
    pub svm: String,
    pub volume: String,
    pub client_cidr: String,
    pub access: AccessDto,
    pub squash: Option<SquashDto>,
    pub sec: Option<Vec<SecFlavorDto>>,
}

#[derive(Deserialize, ToSchema)]
pub struct RemoveExportRequest {
    pub svm: String,
    pub export_id: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct ListExportsQuery {
    pub svm: String,
}

#[derive(Serialize, ToSchema)]
pub struct ExportResponse {
    pub export_id: u32,
    pub svm: String,
    pub volume: String,
    pub client_cidr: String,
    pub access: String,
    pub squash: String,
    pub sec: Vec<String>,
    pub path: String,
    pub pseudo: String,
}

impl From<Export> for ExportResponse {
    fn from(e: Export) -> Self {
        ExportResponse {
            export_id: e.export_id,
            svm: e.svm,
            volume: e.volume,
            client_cidr: e.client_cidr,
            access: match e.access {
                Access::Rw => "rw".into(),
                Access::Ro => "ro".into(),
            },
            squash: match e.squash {
                Squash::RootSquash => "root_squash".into(),
                Squash::NoRootSquash => "no_root_squash".into(),
            },
            sec: e
                .sec
                .iter()
                .map(|s| match s {
                    SecFlavor::Sys => "sys".to_string(),
                    SecFlavor::Krb5 => "krb5".to_string(),
                    SecFlavor::Krb5i => "krb5i".to_string(),
                    SecFlavor::Krb5p => "krb5p".to_string(),
                })
                .collect(),
            path: e.path,
            pseudo: e.pseudo,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/exports",
    request_body = AddExportRequest,
    responses(
        (status = 201, description = "Export added", body = ExportResponse),
        (status = 404, description = "volume not found", body = ApiError)
    ),
    tag = "exports"
)]
pub async fn add_export(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddExportRequest>,
) -> Result<Created<ExportResponse>, ApiError> {
    let export = state
        .orchestrator
        .add_export(
            &req.svm,
            &req.volume,
            &req.client_cidr,
            req.access.into(),
            req.squash.map(Into::into).unwrap_or_default(),
            req.sec.unwrap_or_default().into_iter().map(Into::into).collect(),
        )
        .await?;
    Ok(Created(export.into()))
}

#[utoipa::path(
    get,
    path = "/v1/exports",
    params(("svm" = String, Query, description = "owning SVM")),
    responses((status = 200, description = "List Exports", body = [ExportResponse])),
    tag = "exports"
)]
pub async fn list_exports(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListExportsQuery>,
) -> Result<RespOk<Vec<ExportResponse>>, ApiError> {
    let exports = state.orchestrator.list_exports(&q.svm).await?;
    Ok(RespOk(exports.into_iter().map(ExportResponse::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/v1/exports",
    request_body = RemoveExportRequest,
    responses((status = 200, description = "removed (idempotent)")),
    tag = "exports"
)]
pub async fn remove_export(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RemoveExportRequest>,
) -> Result<RespOk<()>, ApiError> {
    state.orchestrator.remove_export(&req.svm, req.export_id).await?;
    Ok(RespOk(()))
}
