//! Reconcile-on-write engine (§4.6): every mutation validates, acquires a
//! resource-scoped advisory lock, runs side-effects in the ordering §5
//! mandates, and only then writes the authoritative record. Composes
//! `arca-storage`, `arca-net`, `arca-ha`, `arca-exporter`, and the local
//! `Store`/`ApiAuditLogger` the way `mvirt-api`'s `DataStore` impl composes
//! `mvirt-node` RPCs, minus the Raft replication layer (see DESIGN.md).

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;

use arca_common::error::{ArcaError, Result};
use arca_common::ids;
use arca_common::lock::LockManager;
use arca_common::model::{Access, Export, SecFlavor, Snapshot, Squash, Svm, SvmState, Volume};
use arca_exporter::{render, write_config, ExporterProtocolConfig};
use arca_ha::{GroupResourceSpec, ResourceHost};
use arca_storage::{PoolStats, StorageManager};

use crate::audit::ApiAuditLogger;
use crate::locks::InProcessLockManager;
use crate::store::Store;

const LOCK_TTL: Duration = Duration::from_secs(30);
const LOCK_WAIT: Duration = Duration::from_secs(10);

/// Runtime knobs from §6 "Configuration options recognized" that affect the
/// orchestrator's own behavior rather than a single crate's.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub parent_if: String,
    pub export_root: PathBuf,
    pub exporter_config_dir: PathBuf,
    pub template_version: String,
    pub protocol: ExporterProtocolConfig,
    pub svm_root_size_bytes: u64,
    pub vg_name: String,
}

pub struct Orchestrator {
    store: Store,
    storage: StorageManager,
    locks: InProcessLockManager,
    host: Arc<dyn ResourceHost>,
    audit: Arc<ApiAuditLogger>,
    config: OrchestratorConfig,
}

fn svm_lock_key(svm: &str) -> String {
    format!("svm:{svm}")
}

fn exports_lock_key(svm: &str) -> String {
    format!("svm:{svm}:exports")
}

fn volume_lock_key(svm: &str, volume: &str) -> String {
    format!("svm:{svm}:volume:{volume}")
}

impl Orchestrator {
    pub fn new(
        store: Store,
        storage: StorageManager,
        host: Arc<dyn ResourceHost>,
        audit: Arc<ApiAuditLogger>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            storage,
            locks: InProcessLockManager::new(),
            host,
            audit,
            config,
        }
    }

    async fn lock(&self, key: &str) -> Result<Box<dyn arca_common::lock::LockGuard>> {
        self.locks.acquire(key, LOCK_TTL, LOCK_WAIT).await
    }

    // --- SVMs ---

    pub async fn list_svms(&self) -> Result<Vec<Svm>> {
        self.store.list_svms().await
    }

    pub async fn get_svm(&self, name: &str) -> Result<Svm> {
        self.store
            .get_svm(name)
            .await?
            .ok_or_else(|| ArcaError::not_found(format!("svm {name}")))
    }

    pub async fn get_capacity(&self, name: &str) -> Result<PoolStats> {
        self.get_svm(name).await?;
        arca_storage::pool_stats::get_pool_stats(&self.config.vg_name, "arca-pool").await
    }

    /// SVM creation composition (§4.6 line 123): allocate+reserve
    /// `(vlan_id, vip)` → HA group up → record `ready`; on partial failure,
    /// record `degraded` and attempt a background reverse teardown.
    pub async fn create_svm(
        &self,
        name: &str,
        vlan_id: u16,
        ip_cidr: &str,
        gateway: Option<Ipv4Addr>,
        mtu: Option<u32>,
    ) -> Result<(Svm, bool)> {
        ids::validate_dns_label(name)?;
        ids::validate_vlan_id(vlan_id)?;
        let net: ipnet::Ipv4Net = ip_cidr
            .parse()
            .map_err(|_| ArcaError::validation(format!("invalid ip_cidr {ip_cidr}")))?;
        let vip = net.addr();
        let prefix = net.prefix_len();
        let gateway = match gateway {
            Some(gw) => gw,
            None if prefix <= 30 => net
                .hosts()
                .next()
                .ok_or_else(|| ArcaError::validation("subnet has no host addresses"))?,
            None => {
                return Err(ArcaError::validation(
                    "gateway must be specified explicitly for prefixes wider than /30",
                ))
            }
        };
        let mtu = mtu.unwrap_or(1500);

        let _guard = self.lock(&svm_lock_key(name)).await?;

        if let Some(existing) = self.store.get_svm(name).await? {
            if existing.vlan_id == vlan_id && existing.ip_cidr == ip_cidr && existing.gateway == gateway && existing.mtu == mtu {
                return Ok((existing, false));
            }
            return Err(ArcaError::already_exists(format!("svm {name} with different parameters")));
        }

        if self.store.vlan_in_use(vlan_id).await? {
            return Err(ArcaError::NetworkConflict(format!("vlan_id {vlan_id} already in use")));
        }
        if self.store.vip_in_use(&vip).await? {
            return Err(ArcaError::NetworkConflict(format!("vip {vip} already in use")));
        }

        let svm = Svm {
            name: name.to_string(),
            vlan_id,
            ip_cidr: ip_cidr.to_string(),
            vip,
            gateway,
            mtu,
            state: SvmState::Creating,
            created_at: Utc::now(),
        };
        self.store.insert_svm(&svm).await?;

        match self.stand_up_group(&svm).await {
            Ok(()) => {
                self.store.set_svm_state(name, SvmState::Ready).await?;
                self.audit.svm_created(name, vlan_id, &vip.to_string());
                let mut ready = svm;
                ready.state = SvmState::Ready;
                Ok((ready, true))
            }
            Err(e) => {
                self.store.set_svm_state(name, SvmState::Degraded).await?;
                self.audit.svm_degraded(name, &e.to_string());
                tracing::warn!(svm = %name, error = %e, "SVM group failed to come up, scheduling background teardown");
                self.spawn_background_teardown(svm.clone());
                let mut degraded = svm;
                degraded.state = SvmState::Degraded;
                Ok((degraded, true))
            }
        }
    }

    fn group_resource_spec(&self, svm: &Svm, device: String) -> GroupResourceSpec {
        let prefix = svm
            .ip_cidr
            .parse::<ipnet::Ipv4Net>()
            .map(|net| net.prefix_len())
            .unwrap_or(24);
        GroupResourceSpec {
            drbd_resource: format!("{}-root", svm.name),
            mount_device: device,
            mount_point: self.storage.svm_root_mount_path(&svm.name).to_string_lossy().to_string(),
            netns: format!("svm-{}", svm.name),
            vlan_id: svm.vlan_id,
            parent_if: self.config.parent_if.clone(),
            ip: svm.vip,
            prefix,
            gw: svm.gateway,
            mtu: svm.mtu,
        }
    }

    async fn stand_up_group(&self, svm: &Svm) -> Result<()> {
        let device = self.storage.prepare_svm_root(&svm.name, self.config.svm_root_size_bytes).await?;
        let spec = self.group_resource_spec(svm, device);
        self.host.ensure_group(&svm.name, &spec).await?;
        self.render_and_reload(&svm.name).await?;
        Ok(())
    }

    fn spawn_background_teardown(&self, svm: Svm) {
        let host = Arc::clone(&self.host);
        let name = svm.name.clone();
        tokio::spawn(async move {
            for attempt in 0..5u32 {
                match host.remove_group(&name).await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::warn!(svm = %name, attempt, error = %e, "background teardown attempt failed");
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt.min(5)))).await;
                    }
                }
            }
            tracing::error!(svm = %name, "background teardown did not converge after 5 attempts");
        });
    }

    pub async fn delete_svm(&self, name: &str) -> Result<()> {
        let _guard = self.lock(&svm_lock_key(name)).await?;
        let svm = match self.store.get_svm(name).await? {
            Some(svm) => svm,
            None => return Ok(()),
        };
        self.store.set_svm_state(name, SvmState::Deleting).await?;

        self.host.remove_group(name).await?;
        let _ = self.storage.teardown_svm_root(name).await;

        for export in self.store.list_exports(name).await? {
            self.store.delete_export(name, export.export_id).await?;
        }
        self.store.delete_svm(name).await?;
        self.audit.svm_deleted(name);
        let _ = svm;
        Ok(())
    }

    // --- Volumes ---

    pub async fn create_volume(&self, svm: &str, volume: &str, size_bytes: u64) -> Result<Volume> {
        self.get_svm(svm).await?;
        let _guard = self.lock(&volume_lock_key(svm, volume)).await?;

        if let Some(existing) = self.store.get_volume(svm, volume).await? {
            if existing.size_bytes != size_bytes {
                return Err(ArcaError::already_exists(format!("volume {svm}/{volume} with a different size")));
            }
            return Ok(existing);
        }

        let path = self.storage.create_volume(svm, volume, size_bytes).await?;
        let record = Volume {
            name: volume.to_string(),
            svm: svm.to_string(),
            size_bytes,
            path: path.to_string_lossy().to_string(),
        };
        self.store.insert_volume(&record).await?;
        self.audit.volume_created(svm, volume, size_bytes);
        Ok(record)
    }

    pub async fn resize_volume(&self, svm: &str, volume: &str, new_size_bytes: u64) -> Result<Volume> {
        let _guard = self.lock(&volume_lock_key(svm, volume)).await?;
        let existing = self
            .store
            .get_volume(svm, volume)
            .await?
            .ok_or_else(|| ArcaError::not_found(format!("volume {svm}/{volume}")))?;

        if self.storage.resize_volume(svm, volume, new_size_bytes).await? {
            self.store.update_volume_size(svm, volume, new_size_bytes).await?;
            self.audit.volume_resized(svm, volume, new_size_bytes);
            Ok(Volume { size_bytes: new_size_bytes, ..existing })
        } else {
            Ok(existing)
        }
    }

    pub async fn delete_volume(&self, svm: &str, volume: &str) -> Result<()> {
        let _guard = self.lock(&volume_lock_key(svm, volume)).await?;
        if self.store.get_volume(svm, volume).await?.is_none() {
            return Ok(());
        }
        self.storage.delete_volume(svm, volume).await?;
        self.store.delete_volume(svm, volume).await?;
        self.audit.volume_deleted(svm, volume);
        Ok(())
    }

    // --- Exports ---

    pub async fn list_exports(&self, svm: &str) -> Result<Vec<Export>> {
        self.store.list_exports(svm).await
    }

    pub async fn add_export(
        &self,
        svm: &str,
        volume: &str,
        client_cidr: &str,
        access: Access,
        squash: Squash,
        sec: Vec<SecFlavor>,
    ) -> Result<Export> {
        let vol = self
            .store
            .get_volume(svm, volume)
            .await?
            .ok_or_else(|| ArcaError::not_found(format!("volume {svm}/{volume}")))?;

        let _guard = self.lock(&exports_lock_key(svm)).await?;

        let export_id = self.store.next_export_id(svm).await?;
        let export = Export {
            export_id,
            svm: svm.to_string(),
            volume: volume.to_string(),
            client_cidr: client_cidr.to_string(),
            access,
            squash,
            sec: if sec.is_empty() { vec![SecFlavor::Sys] } else { sec },
            path: vol.path,
            pseudo: format!("/exports/{svm}/{volume}"),
        };
        self.store.insert_export(&export).await?;
        self.render_and_reload(svm).await?;
        self.audit.export_added(svm, export_id, volume);
        Ok(export)
    }

    pub async fn remove_export(&self, svm: &str, export_id: u32) -> Result<()> {
        let _guard = self.lock(&exports_lock_key(svm)).await?;
        if self.store.get_export(svm, export_id).await?.is_none() {
            return Ok(());
        }
        self.store.delete_export(svm, export_id).await?;
        self.render_and_reload(svm).await?;
        self.audit.export_removed(svm, export_id);
        Ok(())
    }

    /// Export mutation ordering (§5): render full config → atomic replace →
    /// daemon reload. Readers only see the new export set once this returns.
    async fn render_and_reload(&self, svm: &str) -> Result<()> {
        let exports = self.store.list_exports(svm).await?;
        let rendered = render(&self.config.template_version, &self.config.protocol, &exports);
        write_config(&self.config.exporter_config_dir, svm, &rendered).await?;
        reload_exporter(svm).await
    }

    // --- Directories ---
    //
    // A Directory is a CSI abstraction: a quota-bound subtree directly under
    // the SVM's own root filesystem (`StorageManager::svm_root_mount_path`),
    // not under one of the separately-allocated named Volumes — so these
    // calls pass `""` as `StorageManager`'s volume key, which joins to a
    // no-op path component and resolves to the SVM root.

    const SVM_ROOT_VOLUME: &'static str = "";

    pub async fn create_directory(&self, svm: &str, path: &str, quota_bytes: u64) -> Result<u32> {
        self.get_svm(svm).await?;
        let project_id = self.storage.create_directory(svm, Self::SVM_ROOT_VOLUME, path, quota_bytes).await?;
        self.audit.directory_created(svm, path, quota_bytes);
        Ok(project_id)
    }

    pub async fn delete_directory(&self, svm: &str, path: &str) -> Result<()> {
        self.storage.delete_directory(svm, Self::SVM_ROOT_VOLUME, path).await?;
        self.audit.directory_deleted(svm, path);
        Ok(())
    }

    // --- Snapshots ---

    pub async fn create_snapshot(&self, svm: &str, source_path: &str, snapshot_path: &str) -> Result<Snapshot> {
        self.storage
            .create_snapshot(svm, Self::SVM_ROOT_VOLUME, source_path, snapshot_path)
            .await?;
        let record = Snapshot {
            svm: svm.to_string(),
            source_path: source_path.to_string(),
            snapshot_path: snapshot_path.to_string(),
            size_bytes: 0,
            ready_to_use: true,
        };
        self.store.insert_snapshot(&record).await?;
        self.audit.snapshot_created(svm, snapshot_path);
        Ok(record)
    }

    pub async fn restore_snapshot(&self, svm: &str, snapshot_path: &str, target_path: &str) -> Result<()> {
        self.storage
            .restore_snapshot(svm, Self::SVM_ROOT_VOLUME, snapshot_path, target_path)
            .await?;
        self.audit.snapshot_restored(svm, snapshot_path, target_path);
        Ok(())
    }

    pub async fn delete_snapshot(&self, svm: &str, snapshot_path: &str) -> Result<()> {
        self.storage.delete_snapshot(svm, Self::SVM_ROOT_VOLUME, snapshot_path).await?;
        self.store.delete_snapshot(svm, snapshot_path).await?;
        self.audit.snapshot_deleted(svm, snapshot_path);
        Ok(())
    }

    // --- Quotas ---

    pub async fn set_quota(&self, svm: &str, path: &str, quota_bytes: u64) -> Result<()> {
        self.storage.create_directory(svm, Self::SVM_ROOT_VOLUME, path, quota_bytes).await?;
        self.audit.quota_set(svm, path, quota_bytes);
        Ok(())
    }

    pub async fn get_quota(&self, svm: &str, path: &str) -> Result<(u64, u64)> {
        self.storage.get_quota(svm, Self::SVM_ROOT_VOLUME, path).await
    }

    pub async fn expand_quota(&self, svm: &str, path: &str, new_quota_bytes: u64) -> Result<()> {
        self.storage.expand_quota(svm, Self::SVM_ROOT_VOLUME, path, new_quota_bytes).await?;
        self.audit.quota_expanded(svm, path, new_quota_bytes);
        Ok(())
    }
}

/// Signals the per-SVM `ganesha.nfsd` to re-read its config, the same
/// `systemctl`-shelling pattern `arca-ha::nfs_resource` uses for
/// start/stop/monitor.
async fn reload_exporter(svm: &str) -> Result<()> {
    let unit = format!("arca-exporter@{svm}.service");
    let status = Command::new("systemctl")
        .args(["kill", "-s", "HUP", &unit])
        .status()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    if !status.success() {
        return Err(ArcaError::Transient(format!("failed to reload {unit}")));
    }
    Ok(())
}
