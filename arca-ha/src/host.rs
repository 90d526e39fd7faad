//! HA Resource Host contract (§4.1): `ensure_group`, `remove_group`,
//! `move_group`, `status`. The underlying cluster engine stays Pacemaker —
//! only the per-resource agent script is replaced by this crate's binary
//! (see `crate::group`); the control plane still drives placement through
//! `crm configure`, the same shell-out pattern the rest of this stack uses
//! for LVM/XFS/netns.

use async_trait::async_trait;
use tokio::process::Command;

use arca_common::error::{ArcaError, Result};

use crate::group::SvmResourceGroup;
use crate::resource::ResourceStatus;

#[derive(Debug, Clone)]
pub struct GroupResourceSpec {
    pub drbd_resource: String,
    pub mount_device: String,
    pub mount_point: String,
    pub netns: String,
    pub vlan_id: u16,
    pub parent_if: String,
    pub ip: std::net::Ipv4Addr,
    pub prefix: u8,
    pub gw: std::net::Ipv4Addr,
    pub mtu: u32,
}

#[async_trait]
pub trait ResourceHost: Send + Sync {
    async fn ensure_group(&self, svm: &str, resources: &GroupResourceSpec) -> Result<()>;
    async fn remove_group(&self, svm: &str) -> Result<()>;
    async fn move_group(&self, svm: &str, target_node: &str) -> Result<()>;
    async fn status(&self, svm: &str) -> Result<ResourceStatus>;
}

fn group_name(svm: &str) -> String {
    format!("svm-{svm}")
}

/// Drives a real Pacemaker cluster via `crm configure`/`crm resource`/
/// `crm_mon`. The agent binary built by this crate (`arca-ha-agent`) is
/// registered as the primitive's resource agent for each of the four
/// ordered stages.
pub struct CrmResourceHost;

impl CrmResourceHost {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("crm")
            .args(args)
            .output()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        if !output.status.success() {
            return Err(ArcaError::Transient(format!(
                "crm {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for CrmResourceHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceHost for CrmResourceHost {
    async fn ensure_group(&self, svm: &str, resources: &GroupResourceSpec) -> Result<()> {
        let group = group_name(svm);
        let config = format!(
            "primitive p-drbd-{svm} ocf:arca:agent params resource_name={drbd} stage=block_device\n\
             primitive p-mount-{svm} ocf:arca:agent params device={device} mount_point={mount} stage=mount\n\
             primitive p-net-{svm} ocf:arca:agent params netns={netns} vlan_id={vlan} parent_if={parent_if} ip={ip} prefix={prefix} gw={gw} mtu={mtu} stage=netns\n\
             primitive p-nfs-{svm} ocf:arca:agent params svm={svm} stage=nfs\n\
             group {group} p-drbd-{svm} p-mount-{svm} p-net-{svm} p-nfs-{svm}",
            svm = svm,
            drbd = resources.drbd_resource,
            device = resources.mount_device,
            mount = resources.mount_point,
            netns = resources.netns,
            vlan = resources.vlan_id,
            parent_if = resources.parent_if,
            ip = resources.ip,
            prefix = resources.prefix,
            gw = resources.gw,
            mtu = resources.mtu,
            group = group,
        );

        // `crm configure load update -` is idempotent: re-applying an
        // identical definition is a no-op in Pacemaker's CIB diff engine.
        let mut child = tokio::process::Command::new("crm")
            .args(["configure", "load", "update", "-"])
            .stdin(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ArcaError::Other(e.into()))?;
        {
            use tokio::io::AsyncWriteExt;
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| ArcaError::Other(anyhow::anyhow!("no stdin on crm child")))?;
            stdin
                .write_all(config.as_bytes())
                .await
                .map_err(|e| ArcaError::Other(e.into()))?;
        }
        let status = child.wait().await.map_err(|e| ArcaError::Other(e.into()))?;
        if !status.success() {
            return Err(ArcaError::Transient(format!("crm configure load failed for {group}")));
        }
        Ok(())
    }

    async fn remove_group(&self, svm: &str) -> Result<()> {
        let group = group_name(svm);
        // absence of the group is success
        let _ = self.run(&["resource", "stop", &group]).await;
        let _ = self.run(&["configure", "delete", &group]).await;
        Ok(())
    }

    async fn move_group(&self, svm: &str, target_node: &str) -> Result<()> {
        let group = group_name(svm);
        self.run(&["resource", "move", &group, target_node]).await?;
        Ok(())
    }

    async fn status(&self, svm: &str) -> Result<ResourceStatus> {
        let group = group_name(svm);
        let output = self.run(&["resource", "status", &group]).await;
        match output {
            Ok(text) => {
                if text.contains("is running") {
                    Ok(ResourceStatus::Started)
                } else if text.contains("is NOT running") {
                    Ok(ResourceStatus::Stopped)
                } else {
                    Ok(ResourceStatus::Transitioning)
                }
            }
            Err(_) => Ok(ResourceStatus::Failed),
        }
    }
}

/// In-process host used by tests and by single-node development setups
/// where no Pacemaker cluster is present: drives the group's stages
/// directly instead of going through `crm`.
pub struct LocalResourceHost {
    group: SvmResourceGroup,
}

impl LocalResourceHost {
    pub fn new(group: SvmResourceGroup) -> Self {
        Self { group }
    }
}

#[async_trait]
impl ResourceHost for LocalResourceHost {
    async fn ensure_group(&self, _svm: &str, _resources: &GroupResourceSpec) -> Result<()> {
        self.group.start().await
    }

    async fn remove_group(&self, _svm: &str) -> Result<()> {
        self.group.stop().await
    }

    async fn move_group(&self, _svm: &str, _target_node: &str) -> Result<()> {
        self.group.stop().await?;
        self.group.start().await
    }

    async fn status(&self, _svm: &str) -> Result<ResourceStatus> {
        self.group.status().await
    }
}
