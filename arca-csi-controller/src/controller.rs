//! CSI Controller service (§4.7). Grounded on the `Controller` trait impl
//! shape in `ndenev-freebsd-csi`'s `csi-driver/src/controller.rs` and
//! `tarbox`'s `csi-controller.rs`: lazily-held upstream client, thin async
//! methods per RPC, `NOT_FOUND` on delete paths treated as already-done.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tonic::{Request, Response, Status};

use arca_common::error::{ArcaError, Result};
use arca_common::ids::{derive_snapshot_id, derive_volume_id, ensure_grow_only};
use arca_common::lock::LockManager;
use arca_common::model::{ArcaSnapshot, ArcaVolume, ContentSource};

use crate::csi;
use crate::ip_pool::IpAllocator;
use crate::rest_client::{
    ArcaClient, CreateDirectoryRequest, CreateSnapshotRequest as RestCreateSnapshotRequest, CreateSvmRequest, SetQuotaRequest,
};
use crate::store::MetadataStore;

const SVM_ENSURE_LOCK_TTL: Duration = Duration::from_secs(30);
const SVM_ENSURE_LOCK_WAIT: Duration = Duration::from_secs(15);
const SVM_CREATE_ATTEMPTS: u32 = 5;

pub struct ControllerService {
    rest: Arc<ArcaClient>,
    store: Arc<MetadataStore>,
    locks: Arc<dyn LockManager>,
    ip_allocator: Arc<IpAllocator>,
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ControllerService {
    pub fn new(rest: Arc<ArcaClient>, store: Arc<MetadataStore>, locks: Arc<dyn LockManager>, ip_allocator: Arc<IpAllocator>) -> Self {
        Self {
            rest,
            store,
            locks,
            ip_allocator,
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn id_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.id_locks
            .lock()
            .await
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// §4.7.4 "SVM ensure": resolve or create the SVM that owns `namespace`.
    async fn ensure_svm_for_namespace(&self, namespace: &str) -> Result<crate::rest_client::SvmDto> {
        let svm_name = format!("k8s-{namespace}");
        if let Ok(svm) = self.rest.get_svm(&svm_name).await {
            return Ok(svm);
        }

        let guard = self
            .locks
            .acquire(&format!("svm:{namespace}"), SVM_ENSURE_LOCK_TTL, SVM_ENSURE_LOCK_WAIT)
            .await?;
        let result = self.ensure_svm_locked(&svm_name).await;
        guard.release().await?;
        result
    }

    async fn ensure_svm_locked(&self, svm_name: &str) -> Result<crate::rest_client::SvmDto> {
        if let Ok(svm) = self.rest.get_svm(svm_name).await {
            return Ok(svm);
        }

        let mut delay = Duration::from_secs(1);
        let mut retry = false;
        for _ in 0..SVM_CREATE_ATTEMPTS {
            let alloc = self.ip_allocator.allocate(&self.rest, retry).await?;
            let req = CreateSvmRequest {
                name: svm_name.to_string(),
                vlan_id: alloc.vlan_id,
                ip_cidr: alloc.ip_cidr,
                gateway: Some(alloc.gateway.to_string()),
                mtu: None,
            };
            match self.rest.create_svm(&req).await {
                Ok(svm) => return Ok(svm),
                Err(ArcaError::NetworkConflict(_)) => {
                    retry = true;
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    continue;
                }
                Err(ArcaError::AlreadyExists(_)) => return self.rest.get_svm(svm_name).await,
                Err(e) => return Err(e),
            }
        }
        Err(ArcaError::CapacityExhausted(format!(
            "could not place SVM {svm_name} after {SVM_CREATE_ATTEMPTS} attempts"
        )))
    }
}

#[tonic::async_trait]
impl csi::controller_server::Controller for ControllerService {
    async fn create_volume(
        &self,
        request: Request<csi::CreateVolumeRequest>,
    ) -> Result<Response<csi::CreateVolumeResponse>, Status> {
        let req = request.into_inner();
        let volume_id = derive_volume_id(&req.name);
        let _guard = self.id_lock(&volume_id).await.lock_owned().await;

        let requested_bytes = req.capacity_range.as_ref().map(|r| r.required_bytes.max(0) as u64).unwrap_or(0);
        let content_source = req
            .volume_content_source
            .as_ref()
            .and_then(|s| s.r#type.as_ref())
            .map(|t| match t {
                csi::volume_content_source::Type::Volume(v) => ContentSource::Volume {
                    source_volume_id: v.volume_id.clone(),
                },
                csi::volume_content_source::Type::Snapshot(s) => ContentSource::Snapshot {
                    source_snapshot_id: s.snapshot_id.clone(),
                },
            });

        if let Some(existing) = self.store.get_volume(&volume_id).await.map_err(to_status)? {
            if existing.capacity_bytes == requested_bytes && existing.content_source == content_source {
                return Ok(Response::new(csi::CreateVolumeResponse {
                    volume: Some(to_csi_volume(&existing)),
                }));
            }
            return Err(Status::already_exists(format!("volume {volume_id} exists with different parameters")));
        }

        let namespace = req
            .parameters
            .get("csi.storage.k8s.io/pvc/namespace")
            .ok_or_else(|| Status::invalid_argument("csi.storage.k8s.io/pvc/namespace is required"))?;

        let (svm_name, vip) = match &content_source {
            None => {
                let svm = self.ensure_svm_for_namespace(namespace).await.map_err(to_status)?;
                (svm.name, svm.vip)
            }
            Some(ContentSource::Volume { source_volume_id }) => {
                let src = self
                    .store
                    .get_volume(source_volume_id)
                    .await
                    .map_err(to_status)?
                    .ok_or_else(|| Status::not_found(format!("source volume {source_volume_id} not found")))?;
                (src.svm_name, src.vip.to_string())
            }
            Some(ContentSource::Snapshot { source_snapshot_id }) => {
                let src = self
                    .store
                    .get_snapshot(source_snapshot_id)
                    .await
                    .map_err(to_status)?
                    .ok_or_else(|| Status::not_found(format!("source snapshot {source_snapshot_id} not found")))?;
                (src.svm_name, String::new())
            }
        };

        let path = volume_id.clone();

        match &content_source {
            Some(ContentSource::Volume { source_volume_id }) => {
                let src = self.store.get_volume(source_volume_id).await.map_err(to_status)?.unwrap();
                let result = self
                    .rest
                    .create_snapshot(&RestCreateSnapshotRequest {
                        svm_name: svm_name.clone(),
                        source_path: src.path,
                        snapshot_path: path.clone(),
                    })
                    .await;
                if let Err(e) = result {
                    if !matches!(e, ArcaError::AlreadyExists(_)) {
                        return Err(to_status(e));
                    }
                }
            }
            Some(ContentSource::Snapshot { source_snapshot_id }) => {
                let src = self.store.get_snapshot(source_snapshot_id).await.map_err(to_status)?.unwrap();
                let result = self
                    .rest
                    .create_snapshot(&RestCreateSnapshotRequest {
                        svm_name: svm_name.clone(),
                        source_path: src.path,
                        snapshot_path: path.clone(),
                    })
                    .await;
                if let Err(e) = result {
                    if !matches!(e, ArcaError::AlreadyExists(_)) {
                        return Err(to_status(e));
                    }
                }
            }
            None => {
                let result = self
                    .rest
                    .create_directory(&CreateDirectoryRequest {
                        svm_name: svm_name.clone(),
                        path: path.clone(),
                        quota_bytes: requested_bytes,
                    })
                    .await;
                if let Err(e) = result {
                    if !matches!(e, ArcaError::AlreadyExists(_)) {
                        return Err(to_status(e));
                    }
                }
            }
        }

        self.rest
            .set_quota(&SetQuotaRequest {
                svm_name: svm_name.clone(),
                path: path.clone(),
                quota_bytes: requested_bytes,
            })
            .await
            .map_err(to_status)?;

        let vip_addr = if vip.is_empty() {
            self.rest.get_svm(&svm_name).await.map_err(to_status)?.vip.parse().map_err(|_| {
                Status::internal("SVM reported an invalid VIP")
            })?
        } else {
            vip.parse().map_err(|_| Status::internal("SVM reported an invalid VIP"))?
        };

        let record = ArcaVolume {
            volume_id: volume_id.clone(),
            name: req.name.clone(),
            svm_name: svm_name.clone(),
            vip: vip_addr,
            path: path.clone(),
            capacity_bytes: requested_bytes,
            created_at: chrono::Utc::now(),
            content_source: content_source.clone(),
        };

        match self.store.insert_volume(&record).await {
            Ok(()) => Ok(Response::new(csi::CreateVolumeResponse {
                volume: Some(to_csi_volume(&record)),
            })),
            Err(ArcaError::AlreadyExists(_)) => {
                let existing = self
                    .store
                    .get_volume(&volume_id)
                    .await
                    .map_err(to_status)?
                    .ok_or_else(|| Status::internal("volume vanished after AlreadyExists"))?;
                Ok(Response::new(csi::CreateVolumeResponse {
                    volume: Some(to_csi_volume(&existing)),
                }))
            }
            Err(e) => Err(to_status(e)),
        }
    }

    async fn delete_volume(
        &self,
        request: Request<csi::DeleteVolumeRequest>,
    ) -> Result<Response<csi::DeleteVolumeResponse>, Status> {
        let req = request.into_inner();
        let _guard = self.id_lock(&req.volume_id).await.lock_owned().await;

        let Some(volume) = self.store.get_volume(&req.volume_id).await.map_err(to_status)? else {
            return Ok(Response::new(csi::DeleteVolumeResponse {}));
        };

        match self.rest.delete_directory(&volume.svm_name, &volume.path).await {
            Ok(()) | Err(ArcaError::NotFound(_)) => {}
            Err(e) => return Err(to_status(e)),
        }
        self.store.delete_volume(&req.volume_id).await.map_err(to_status)?;
        Ok(Response::new(csi::DeleteVolumeResponse {}))
    }

    async fn controller_publish_volume(
        &self,
        _request: Request<csi::ControllerPublishVolumeRequest>,
    ) -> Result<Response<csi::ControllerPublishVolumeResponse>, Status> {
        Ok(Response::new(csi::ControllerPublishVolumeResponse {
            publish_context: Default::default(),
        }))
    }

    async fn controller_unpublish_volume(
        &self,
        _request: Request<csi::ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<csi::ControllerUnpublishVolumeResponse>, Status> {
        Ok(Response::new(csi::ControllerUnpublishVolumeResponse {}))
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<csi::ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<csi::ValidateVolumeCapabilitiesResponse>, Status> {
        let req = request.into_inner();
        if self.store.get_volume(&req.volume_id).await.map_err(to_status)?.is_none() {
            return Err(Status::not_found(format!("volume {} not found", req.volume_id)));
        }
        if req.volume_capabilities.iter().any(|c| matches!(c.access_type, Some(csi::volume_capability::AccessType::Block(_)))) {
            return Ok(Response::new(csi::ValidateVolumeCapabilitiesResponse {
                confirmed: None,
                message: "block access type is not supported".to_string(),
            }));
        }
        Ok(Response::new(csi::ValidateVolumeCapabilitiesResponse {
            confirmed: Some(csi::validate_volume_capabilities_response::Confirmed {
                volume_context: req.volume_context,
                volume_capabilities: req.volume_capabilities,
                parameters: req.parameters,
                mutable_parameters: Default::default(),
            }),
            message: String::new(),
        }))
    }

    async fn list_volumes(
        &self,
        request: Request<csi::ListVolumesRequest>,
    ) -> Result<Response<csi::ListVolumesResponse>, Status> {
        let req = request.into_inner();
        let token = if req.starting_token.is_empty() { None } else { Some(req.starting_token) };
        let (volumes, next) = self.store.list_volumes(token).await.map_err(to_status)?;
        Ok(Response::new(csi::ListVolumesResponse {
            entries: volumes
                .iter()
                .map(|v| csi::list_volumes_response::Entry {
                    volume: Some(to_csi_volume(v)),
                    status: None,
                })
                .collect(),
            next_token: next.unwrap_or_default(),
        }))
    }

    async fn get_capacity(
        &self,
        _request: Request<csi::GetCapacityRequest>,
    ) -> Result<Response<csi::GetCapacityResponse>, Status> {
        // No single-pool-wide capacity figure is exposed cluster-scope; CSI
        // callers fall back to per-SVM capacity via the REST surface.
        Ok(Response::new(csi::GetCapacityResponse {
            available_capacity: 0,
            maximum_volume_size: None,
            minimum_volume_size: None,
        }))
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<csi::ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<csi::ControllerGetCapabilitiesResponse>, Status> {
        use csi::controller_service_capability::{rpc::Type as RpcType, Rpc, Type};
        let cap = |t: RpcType| csi::ControllerServiceCapability {
            r#type: Some(Type::Rpc(Rpc { r#type: t as i32 })),
        };
        Ok(Response::new(csi::ControllerGetCapabilitiesResponse {
            capabilities: vec![
                cap(RpcType::CreateDeleteVolume),
                cap(RpcType::CreateDeleteSnapshot),
                cap(RpcType::CloneVolume),
                cap(RpcType::ExpandVolume),
                cap(RpcType::ListVolumes),
                cap(RpcType::ListSnapshots),
            ],
        }))
    }

    async fn create_snapshot(
        &self,
        request: Request<csi::CreateSnapshotRequest>,
    ) -> Result<Response<csi::CreateSnapshotResponse>, Status> {
        let req = request.into_inner();
        let snapshot_id = derive_snapshot_id(&req.source_volume_id, &req.name);
        let _guard = self.id_lock(&snapshot_id).await.lock_owned().await;

        if let Some(existing) = self.store.get_snapshot(&snapshot_id).await.map_err(to_status)? {
            return Ok(Response::new(csi::CreateSnapshotResponse {
                snapshot: Some(to_csi_snapshot(&existing)),
            }));
        }

        let source = self
            .store
            .get_volume(&req.source_volume_id)
            .await
            .map_err(to_status)?
            .ok_or_else(|| Status::not_found(format!("source volume {} not found", req.source_volume_id)))?;

        let path = format!(".snapshots/{snapshot_id}");
        let record = ArcaSnapshot {
            snapshot_id: snapshot_id.clone(),
            name: req.name.clone(),
            source_volume_id: req.source_volume_id.clone(),
            svm_name: source.svm_name.clone(),
            path: path.clone(),
            size_bytes: source.capacity_bytes,
            created_at: chrono::Utc::now(),
            ready_to_use: false,
        };

        match self.store.insert_snapshot(&record).await {
            Ok(()) => {}
            Err(ArcaError::AlreadyExists(_)) => {
                let existing = self
                    .store
                    .get_snapshot(&snapshot_id)
                    .await
                    .map_err(to_status)?
                    .ok_or_else(|| Status::internal("snapshot vanished after AlreadyExists"))?;
                return Ok(Response::new(csi::CreateSnapshotResponse {
                    snapshot: Some(to_csi_snapshot(&existing)),
                }));
            }
            Err(e) => return Err(to_status(e)),
        }

        let rest_result = self
            .rest
            .create_snapshot(&RestCreateSnapshotRequest {
                svm_name: source.svm_name.clone(),
                source_path: source.path.clone(),
                snapshot_path: path.clone(),
            })
            .await;
        if let Err(e) = rest_result {
            if !matches!(e, ArcaError::AlreadyExists(_)) {
                let _ = self.store.delete_snapshot(&snapshot_id).await;
                return Err(to_status(e));
            }
        }

        if let Err(e) = self.store.mark_snapshot_ready(&snapshot_id).await {
            let _ = self.store.delete_snapshot(&snapshot_id).await;
            return Err(to_status(e));
        }

        Ok(Response::new(csi::CreateSnapshotResponse {
            snapshot: Some(csi::Snapshot {
                ready_to_use: true,
                ..to_csi_snapshot(&record)
            }),
        }))
    }

    async fn delete_snapshot(
        &self,
        request: Request<csi::DeleteSnapshotRequest>,
    ) -> Result<Response<csi::DeleteSnapshotResponse>, Status> {
        let req = request.into_inner();
        let _guard = self.id_lock(&req.snapshot_id).await.lock_owned().await;

        let Some(snapshot) = self.store.get_snapshot(&req.snapshot_id).await.map_err(to_status)? else {
            return Ok(Response::new(csi::DeleteSnapshotResponse {}));
        };

        match self.rest.delete_snapshot(&snapshot.svm_name, &snapshot.path).await {
            Ok(()) | Err(ArcaError::NotFound(_)) => {}
            Err(e) => return Err(to_status(e)),
        }
        self.store.delete_snapshot(&req.snapshot_id).await.map_err(to_status)?;
        Ok(Response::new(csi::DeleteSnapshotResponse {}))
    }

    async fn list_snapshots(
        &self,
        request: Request<csi::ListSnapshotsRequest>,
    ) -> Result<Response<csi::ListSnapshotsResponse>, Status> {
        let req = request.into_inner();
        let token = if req.starting_token.is_empty() { None } else { Some(req.starting_token) };
        let (mut snapshots, next) = self.store.list_snapshots(token).await.map_err(to_status)?;

        if !req.snapshot_id.is_empty() {
            snapshots.retain(|s| s.snapshot_id == req.snapshot_id);
        }
        if !req.source_volume_id.is_empty() {
            snapshots.retain(|s| s.source_volume_id == req.source_volume_id);
        }

        Ok(Response::new(csi::ListSnapshotsResponse {
            entries: snapshots
                .iter()
                .map(|s| csi::list_snapshots_response::Entry {
                    snapshot: Some(to_csi_snapshot(s)),
                })
                .collect(),
            next_token: next.unwrap_or_default(),
        }))
    }

    async fn controller_expand_volume(
        &self,
        request: Request<csi::ControllerExpandVolumeRequest>,
    ) -> Result<Response<csi::ControllerExpandVolumeResponse>, Status> {
        let req = request.into_inner();
        let _guard = self.id_lock(&req.volume_id).await.lock_owned().await;

        let mut volume = self
            .store
            .get_volume(&req.volume_id)
            .await
            .map_err(to_status)?
            .ok_or_else(|| Status::not_found(format!("volume {} not found", req.volume_id)))?;

        let requested = req.capacity_range.as_ref().map(|r| r.required_bytes.max(0) as u64).unwrap_or(0);
        let grows = ensure_grow_only(volume.capacity_bytes, requested).map_err(to_status)?;
        if grows {
            self.rest
                .expand_quota(&SetQuotaRequest {
                    svm_name: volume.svm_name.clone(),
                    path: volume.path.clone(),
                    quota_bytes: requested,
                })
                .await
                .map_err(to_status)?;
            self.store
                .update_volume_capacity(&volume.volume_id, requested)
                .await
                .map_err(to_status)?;
            volume.capacity_bytes = requested;
        }

        Ok(Response::new(csi::ControllerExpandVolumeResponse {
            capacity_bytes: volume.capacity_bytes as i64,
            node_expansion_required: false,
        }))
    }

    async fn controller_get_volume(
        &self,
        request: Request<csi::ControllerGetVolumeRequest>,
    ) -> Result<Response<csi::ControllerGetVolumeResponse>, Status> {
        let req = request.into_inner();
        let volume = self
            .store
            .get_volume(&req.volume_id)
            .await
            .map_err(to_status)?
            .ok_or_else(|| Status::not_found(format!("volume {} not found", req.volume_id)))?;
        Ok(Response::new(csi::ControllerGetVolumeResponse {
            volume: Some(to_csi_volume(&volume)),
            status: None,
        }))
    }

    async fn controller_modify_volume(
        &self,
        _request: Request<csi::ControllerModifyVolumeRequest>,
    ) -> Result<Response<csi::ControllerModifyVolumeResponse>, Status> {
        Err(Status::unimplemented("ControllerModifyVolume"))
    }
}

fn to_csi_volume(v: &ArcaVolume) -> csi::Volume {
    let mut context = HashMap::new();
    context.insert("svm".to_string(), v.svm_name.clone());
    context.insert("vip".to_string(), v.vip.to_string());
    context.insert("volumePath".to_string(), v.path.clone());
    csi::Volume {
        capacity_bytes: v.capacity_bytes as i64,
        volume_id: v.volume_id.clone(),
        volume_context: context,
        content_source: v.content_source.clone().map(|cs| csi::VolumeContentSource {
            r#type: Some(match cs {
                ContentSource::Volume { source_volume_id } => {
                    csi::volume_content_source::Type::Volume(csi::volume_content_source::VolumeSource {
                        volume_id: source_volume_id,
                    })
                }
                ContentSource::Snapshot { source_snapshot_id } => {
                    csi::volume_content_source::Type::Snapshot(csi::volume_content_source::SnapshotSource {
                        snapshot_id: source_snapshot_id,
                    })
                }
            }),
        }),
        accessible_topology: Vec::new(),
    }
}

fn to_csi_snapshot(s: &ArcaSnapshot) -> csi::Snapshot {
    csi::Snapshot {
        size_bytes: s.size_bytes as i64,
        snapshot_id: s.snapshot_id.clone(),
        source_volume_id: s.source_volume_id.clone(),
        creation_time: Some(prost_types::Timestamp {
            seconds: s.created_at.timestamp(),
            nanos: s.created_at.timestamp_subsec_nanos() as i32,
        }),
        ready_to_use: s.ready_to_use,
        group_snapshot_id: String::new(),
    }
}

fn to_status(e: ArcaError) -> Status {
    match e.kind() {
        arca_common::error::ErrorKind::NotFound => Status::not_found(e.to_string()),
        arca_common::error::ErrorKind::AlreadyExists => Status::already_exists(e.to_string()),
        arca_common::error::ErrorKind::NetworkConflict => Status::aborted(e.to_string()),
        arca_common::error::ErrorKind::Validation => Status::invalid_argument(e.to_string()),
        arca_common::error::ErrorKind::CapacityExhausted => Status::resource_exhausted(e.to_string()),
        arca_common::error::ErrorKind::Transient | arca_common::error::ErrorKind::Unavailable => Status::unavailable(e.to_string()),
        arca_common::error::ErrorKind::StateMachine | arca_common::error::ErrorKind::Corruption => Status::failed_precondition(e.to_string()),
    }
}
