use std::sync::Arc;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::{directories, exports, quotas, snapshots, svms, volumes, AppState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ARCA Control Plane API",
        version = "1.0.0",
        description = "REST control plane for SVMs, Volumes, Exports, Directories, Snapshots and Quotas on the ARCA NFS storage cluster.",
        license(name = "MIT")
    ),
    tags(
        (name = "svms", description = "Storage Virtual Machine lifecycle and capacity"),
        (name = "volumes", description = "Volume CRUD operations"),
        (name = "exports", description = "NFS export CRUD operations"),
        (name = "directories", description = "Quota-bound directories used by the CSI driver"),
        (name = "snapshots", description = "Directory snapshot and restore operations"),
        (name = "quotas", description = "Directory quota management")
    ),
    paths(
        svms::create_svm,
        svms::list_svms,
        svms::get_svm,
        svms::get_capacity,
        svms::delete_svm,
        volumes::create_volume,
        volumes::grow_volume,
        volumes::delete_volume,
        exports::add_export,
        exports::list_exports,
        exports::remove_export,
        directories::create_directory,
        directories::delete_directory,
        snapshots::create_snapshot,
        snapshots::restore_snapshot,
        snapshots::delete_snapshot,
        quotas::set_quota,
        quotas::get_quota,
        quotas::expand_quota,
    ),
    components(schemas(
        crate::error::ApiError,
        svms::CreateSvmRequest,
        svms::SvmResponse,
        svms::CapacityResponse,
        volumes::CreateVolumeRequest,
        volumes::GrowVolumeRequest,
        volumes::VolumeResponse,
        exports::AccessDto,
        exports::SquashDto,
        exports::SecFlavorDto,
        exports::AddExportRequest,
        exports::RemoveExportRequest,
        exports::ExportResponse,
        directories::CreateDirectoryRequest,
        directories::DirectoryResponse,
        snapshots::CreateSnapshotRequest,
        snapshots::RestoreSnapshotRequest,
        snapshots::SnapshotResponse,
        quotas::SetQuotaRequest,
        quotas::ExpandQuotaRequest,
        quotas::QuotaResponse,
    ))
)]
pub struct ApiDoc;

pub fn create_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/svms", post(svms::create_svm))
        .route("/svms", get(svms::list_svms))
        .route("/svms/{name}", get(svms::get_svm))
        .route("/svms/{name}", delete(svms::delete_svm))
        .route("/svms/{name}/capacity", get(svms::get_capacity))
        .route("/volumes", post(volumes::create_volume))
        .route("/volumes/{name}", patch(volumes::grow_volume))
        .route("/volumes/{name}", delete(volumes::delete_volume))
        .route("/exports", post(exports::add_export))
        .route("/exports", get(exports::list_exports))
        .route("/exports", delete(exports::remove_export))
        .route("/directories", post(directories::create_directory))
        .route("/directories/{path}", delete(directories::delete_directory))
        .route("/snapshots", post(snapshots::create_snapshot))
        .route("/snapshots/restore", post(snapshots::restore_snapshot))
        .route("/snapshots/{path}", delete(snapshots::delete_snapshot))
        .route("/quotas", post(quotas::set_quota))
        .route("/quotas", get(quotas::get_quota))
        .route("/quotas", patch(quotas::expand_quota));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/v1", v1)
        .with_state(state)
}
