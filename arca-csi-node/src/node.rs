//! Node gRPC service (§4.8). Stage/unstage manage the shared per-SVM NFS
//! mount and its derived refcount; publish/unpublish are plain bind mounts
//! layered on top of the staging path.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use tonic::{Request, Response, Status};
use tracing::warn;

use arca_common::model::NodeVolumeEntry;

use crate::csi;
use crate::mount::MountManager;
use crate::node_state::NodeStateStore;

pub struct NodeService {
    node_id: String,
    max_volumes_per_node: i64,
    mounts: MountManager,
    state: NodeStateStore,
}

impl NodeService {
    pub fn new(node_id: String, max_volumes_per_node: i64, mounts: MountManager, state: NodeStateStore) -> Self {
        Self {
            node_id,
            max_volumes_per_node,
            mounts,
            state,
        }
    }

    async fn svm_refcount(&self, svm: &str) -> usize {
        self.state.snapshot().await.volumes.values().filter(|v| v.svm == svm).count()
    }
}

/// Rejects empty paths and anything containing `..`, matching the
/// kubelet-supplied path contract every CSI node plugin must validate.
fn validate_path(field: &str, value: &str) -> Result<PathBuf, Status> {
    if value.is_empty() {
        return Err(Status::invalid_argument(format!("{field} must not be empty")));
    }
    if value.split('/').any(|segment| segment == "..") {
        return Err(Status::invalid_argument(format!("{field} must not contain '..'")));
    }
    Ok(PathBuf::from(value))
}

fn required_context<'a>(context: &'a HashMap<String, String>, key: &str) -> Result<&'a str, Status> {
    context
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Status::invalid_argument(format!("volume_context missing '{key}'")))
}

#[tonic::async_trait]
impl csi::node_server::Node for NodeService {
    async fn node_stage_volume(
        &self,
        request: Request<csi::NodeStageVolumeRequest>,
    ) -> Result<Response<csi::NodeStageVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume_id must not be empty"));
        }
        let staging_path = validate_path("staging_target_path", &req.staging_target_path)?;

        let svm = required_context(&req.volume_context, "svm")?.to_string();
        let vip: Ipv4Addr = required_context(&req.volume_context, "vip")?
            .parse()
            .map_err(|_| Status::invalid_argument("volume_context 'vip' is not a valid IPv4 address"))?;
        let volume_path = required_context(&req.volume_context, "volumePath")?.to_string();

        if let Some(existing) = self.state.snapshot().await.volumes.get(&req.volume_id) {
            if existing.staging_path == req.staging_target_path {
                return Ok(Response::new(csi::NodeStageVolumeResponse {}));
            }
            return Err(Status::already_exists("volume already staged at a different path"));
        }

        let svm_mount = self.mounts.ensure_svm_mount(&svm, vip).await.map_err(super::to_status)?;
        let source = svm_mount.join(volume_path.trim_start_matches('/'));

        if let Err(e) = self.mounts.bind_mount(&source, &staging_path).await {
            // Roll back the shared mount if this was the first consumer.
            let _ = self
                .mounts
                .teardown_svm_mount_if_unused(&svm, || self.svm_refcount(&svm))
                .await;
            return Err(super::to_status(e));
        }

        let entry = NodeVolumeEntry {
            volume_id: req.volume_id.clone(),
            svm: svm.clone(),
            vip,
            staging_path: req.staging_target_path.clone(),
            published_paths: vec![],
        };
        if let Err(e) = self
            .state
            .mutate(|s| {
                s.volumes.insert(req.volume_id.clone(), entry);
            })
            .await
        {
            let _ = self.mounts.unmount_if_mounted(&staging_path).await;
            let _ = self
                .mounts
                .teardown_svm_mount_if_unused(&svm, || self.svm_refcount(&svm))
                .await;
            return Err(super::to_status(e));
        }

        Ok(Response::new(csi::NodeStageVolumeResponse {}))
    }

    async fn node_unstage_volume(
        &self,
        request: Request<csi::NodeUnstageVolumeRequest>,
    ) -> Result<Response<csi::NodeUnstageVolumeResponse>, Status> {
        let req = request.into_inner();
        let staging_path = validate_path("staging_target_path", &req.staging_target_path)?;

        let entry = self.state.snapshot().await.volumes.get(&req.volume_id).cloned();
        let Some(entry) = entry else {
            return Ok(Response::new(csi::NodeUnstageVolumeResponse {}));
        };

        self.mounts.unmount_if_mounted(&staging_path).await.map_err(super::to_status)?;
        let _ = tokio::fs::remove_dir(&staging_path).await;

        self.state
            .mutate(|s| {
                s.volumes.remove(&req.volume_id);
            })
            .await
            .map_err(super::to_status)?;

        // Final safety re-check happens inside teardown_svm_mount_if_unused,
        // under the same lock that guards ensure_svm_mount.
        self.mounts
            .teardown_svm_mount_if_unused(&entry.svm, || self.svm_refcount(&entry.svm))
            .await
            .map_err(super::to_status)?;

        Ok(Response::new(csi::NodeUnstageVolumeResponse {}))
    }

    async fn node_publish_volume(
        &self,
        request: Request<csi::NodePublishVolumeRequest>,
    ) -> Result<Response<csi::NodePublishVolumeResponse>, Status> {
        let req = request.into_inner();
        let staging_path = validate_path("staging_target_path", &req.staging_target_path)?;
        let target_path = validate_path("target_path", &req.target_path)?;

        if !self.state.snapshot().await.volumes.contains_key(&req.volume_id) {
            return Err(Status::failed_precondition("volume is not staged"));
        }

        self.mounts
            .bind_mount(&staging_path, &target_path)
            .await
            .map_err(super::to_status)?;

        if req.readonly {
            if let Err(e) = self.mounts.remount_readonly(&target_path).await {
                warn!(volume_id = %req.volume_id, %e, "readonly remount failed, unwinding bind mount");
                let _ = self.mounts.unmount_if_mounted(&target_path).await;
                return Err(super::to_status(e));
            }
        }

        self.state
            .mutate(|s| {
                if let Some(entry) = s.volumes.get_mut(&req.volume_id) {
                    if !entry.published_paths.contains(&req.target_path) {
                        entry.published_paths.push(req.target_path.clone());
                    }
                }
            })
            .await
            .map_err(super::to_status)?;

        Ok(Response::new(csi::NodePublishVolumeResponse {}))
    }

    async fn node_unpublish_volume(
        &self,
        request: Request<csi::NodeUnpublishVolumeRequest>,
    ) -> Result<Response<csi::NodeUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();
        let target_path = validate_path("target_path", &req.target_path)?;

        self.mounts.unmount_if_mounted(&target_path).await.map_err(super::to_status)?;
        let _ = tokio::fs::remove_dir(&target_path).await;

        self.state
            .mutate(|s| {
                if let Some(entry) = s.volumes.get_mut(&req.volume_id) {
                    entry.published_paths.retain(|p| p != &req.target_path);
                }
            })
            .await
            .map_err(super::to_status)?;

        Ok(Response::new(csi::NodeUnpublishVolumeResponse {}))
    }

    async fn node_get_volume_stats(
        &self,
        _request: Request<csi::NodeGetVolumeStatsRequest>,
    ) -> Result<Response<csi::NodeGetVolumeStatsResponse>, Status> {
        // Capacity reporting is delegated to the quota subsystem, not the
        // node; the node reports zeroed totals rather than inventing a view
        // of usage it cannot see (§4.8 "Volume stats").
        Ok(Response::new(csi::NodeGetVolumeStatsResponse {
            usage: vec![],
            volume_condition: None,
        }))
    }

    async fn node_expand_volume(
        &self,
        request: Request<csi::NodeExpandVolumeRequest>,
    ) -> Result<Response<csi::NodeExpandVolumeResponse>, Status> {
        // NFS exports have no node-local filesystem to grow; growth happens
        // entirely on the storage node via ControllerExpandVolume.
        let _ = request;
        Ok(Response::new(csi::NodeExpandVolumeResponse { capacity_bytes: 0 }))
    }

    async fn node_get_capabilities(
        &self,
        _request: Request<csi::NodeGetCapabilitiesRequest>,
    ) -> Result<Response<csi::NodeGetCapabilitiesResponse>, Status> {
        use csi::node_service_capability::{rpc::Type as RpcType, Rpc, Type};
        let cap = |t: RpcType| csi::NodeServiceCapability {
            r#type: Some(Type::Rpc(Rpc { r#type: t as i32 })),
        };
        Ok(Response::new(csi::NodeGetCapabilitiesResponse {
            capabilities: vec![
                cap(RpcType::StageUnstageVolume),
                cap(RpcType::GetVolumeStats),
                cap(RpcType::ExpandVolume),
            ],
        }))
    }

    async fn node_get_info(
        &self,
        _request: Request<csi::NodeGetInfoRequest>,
    ) -> Result<Response<csi::NodeGetInfoResponse>, Status> {
        Ok(Response::new(csi::NodeGetInfoResponse {
            node_id: self.node_id.clone(),
            max_volumes_per_node: self.max_volumes_per_node,
            accessible_topology: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_path_rejects_empty() {
        assert!(validate_path("target_path", "").is_err());
    }

    #[test]
    fn validate_path_rejects_dotdot() {
        assert!(validate_path("target_path", "/var/lib/kubelet/../etc").is_err());
    }

    #[test]
    fn validate_path_accepts_absolute() {
        assert!(validate_path("target_path", "/var/lib/kubelet/pods/x/volumes/y").is_ok());
    }

    #[test]
    fn required_context_reports_missing_key() {
        let ctx = HashMap::new();
        assert!(required_context(&ctx, "svm").is_err());
    }
}
