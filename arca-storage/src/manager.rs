//! `StorageManager` composes thin LV, XFS, and the sqlite side-table into
//! the Storage Stack operations described in §4.3. It is consumed directly
//! by `arca-api`'s volume/directory/quota/snapshot handlers; it does not run
//! as its own network service (the spec scopes storage operations to
//! whichever node holds the primary, which `arca-ha` arranges).

use std::path::{Path, PathBuf};

use arca_common::error::{ArcaError, Result};
use arca_common::ids;

use crate::lvm::ThinPool;
use crate::store::Store;
use crate::xfs;

pub struct StorageManager {
    pool: ThinPool,
    store: Store,
    export_root: PathBuf,
}

impl StorageManager {
    pub async fn new(pool: ThinPool, database_url: &str, export_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            pool,
            store: Store::connect(database_url).await?,
            export_root: export_root.into(),
        })
    }

    fn volume_mount_path(&self, svm: &str, volume: &str) -> PathBuf {
        self.export_root.join(svm).join(volume)
    }

    /// Mount point of the SVM's own root filesystem (distinct from any
    /// per-Volume mount under it), the target of the HA group's mount
    /// stage (§4.1).
    pub fn svm_root_mount_path(&self, svm: &str) -> PathBuf {
        self.export_root.join(svm)
    }

    /// Creates and formats (but does not mount) the thin LV backing an
    /// SVM's root filesystem. Mounting is the HA group's job, run after
    /// block-device promotion (§4.1); this only needs to run once, before
    /// the group is first started. Idempotent on an existing LV.
    pub async fn prepare_svm_root(&self, svm: &str, size_bytes: u64) -> Result<String> {
        ids::validate_size_positive(size_bytes)?;
        let lv_name = format!("{svm}-root");
        if let Some(existing) = self.pool.get_lv(&lv_name).await? {
            return Ok(existing.path);
        }
        let lv = self.pool.create_thin_lv(&lv_name, size_bytes).await?;
        xfs::format_xfs(&lv.path, 256, 8192).await?;
        Ok(lv.path)
    }

    pub async fn teardown_svm_root(&self, svm: &str) -> Result<()> {
        let lv_name = format!("{svm}-root");
        self.pool.remove(&lv_name).await
    }

    /// Creates a thin LV, formats XFS, mounts it. Idempotent: an existing LV
    /// of the requested size is treated as already-converged.
    pub async fn create_volume(&self, svm: &str, volume: &str, size_bytes: u64) -> Result<PathBuf> {
        ids::validate_size_positive(size_bytes)?;
        let target = self.volume_mount_path(svm, volume);

        if let Some(existing) = self.pool.get_lv(volume).await? {
            if existing.size_bytes != size_bytes {
                return Err(ArcaError::already_exists(format!(
                    "volume {volume} exists with a different size"
                )));
            }
            xfs::mount(&existing.path, &target).await?;
            return Ok(target);
        }

        let lv = self.pool.create_thin_lv(volume, size_bytes).await?;
        xfs::format_xfs(&lv.path, 256, 8192).await?;
        xfs::mount(&lv.path, &target).await?;
        Ok(target)
    }

    /// Grow-only resize (§9 Open Question 2, §4.3). Returns `Ok(false)` if
    /// the call was a no-op because `new_size_bytes <= current`.
    pub async fn resize_volume(&self, svm: &str, volume: &str, new_size_bytes: u64) -> Result<bool> {
        let existing = self
            .pool
            .get_lv(volume)
            .await?
            .ok_or_else(|| ArcaError::not_found(format!("volume {volume}")))?;

        if !ids::ensure_grow_only(existing.size_bytes, new_size_bytes)? {
            return Ok(false);
        }

        self.pool.extend(volume, new_size_bytes).await?;
        let mount_point = self.volume_mount_path(svm, volume);
        xfs::grow(&mount_point).await?;
        Ok(true)
    }

    pub async fn delete_volume(&self, svm: &str, volume: &str) -> Result<()> {
        let target = self.volume_mount_path(svm, volume);
        xfs::unmount(&target).await?;
        self.pool.remove(volume).await?;
        Ok(())
    }

    /// Creates `<volume>/<path>` and assigns a deterministic project quota
    /// (§4.3). Idempotent on `(svm, path)`.
    pub async fn create_directory(
        &self,
        svm: &str,
        volume: &str,
        path: &str,
        quota_bytes: u64,
    ) -> Result<u32> {
        ids::validate_relative_path(path)?;

        if let Some(existing) = self.store.get_directory(svm, path).await? {
            return Ok(existing.project_id as u32);
        }

        let mount_point = self.volume_mount_path(svm, volume);
        let full_path = mount_point.join(path);
        tokio::fs::create_dir_all(&full_path)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;

        let base = xfs::derive_project_id(svm, path, |_| false);
        let project_id = self.resolve_project_id(svm, path, base).await?;

        xfs::set_project(&mount_point, project_id, path).await?;
        xfs::set_quota(&mount_point, project_id, quota_bytes).await?;
        self.store
            .insert_directory(svm, path, project_id, quota_bytes)
            .await?;
        Ok(project_id)
    }

    async fn resolve_project_id(&self, svm: &str, path: &str, mut candidate: u32) -> Result<u32> {
        loop {
            if !self.store.project_id_in_use(candidate).await? {
                return Ok(candidate);
            }
            candidate = xfs::derive_project_id(svm, &format!("{path}#{candidate}"), |_| false);
        }
    }

    pub async fn delete_directory(&self, svm: &str, volume: &str, path: &str) -> Result<()> {
        if self.store.get_directory(svm, path).await?.is_none() {
            return Ok(());
        }
        let mount_point = self.volume_mount_path(svm, volume);
        let full_path = mount_point.join(path);
        let _ = tokio::fs::remove_dir_all(&full_path).await;
        self.store.delete_directory(svm, path).await?;
        Ok(())
    }

    /// ExpandQuota is monotonic: never shrinks below current usage.
    pub async fn expand_quota(&self, svm: &str, volume: &str, path: &str, new_quota_bytes: u64) -> Result<()> {
        let entry = self
            .store
            .get_directory(svm, path)
            .await?
            .ok_or_else(|| ArcaError::not_found(format!("directory {svm}/{path}")))?;

        if new_quota_bytes < entry.quota_bytes as u64 {
            return Err(ArcaError::validation("quota must not shrink"));
        }

        let mount_point = self.volume_mount_path(svm, volume);
        xfs::set_quota(&mount_point, entry.project_id as u32, new_quota_bytes).await?;
        self.store.update_quota(svm, path, new_quota_bytes).await?;
        Ok(())
    }

    pub async fn get_quota(&self, svm: &str, volume: &str, path: &str) -> Result<(u64, u64)> {
        let entry = self
            .store
            .get_directory(svm, path)
            .await?
            .ok_or_else(|| ArcaError::not_found(format!("directory {svm}/{path}")))?;
        let mount_point = self.volume_mount_path(svm, volume);
        let usage = xfs::get_quota_usage(&mount_point, entry.project_id as u32).await?;
        Ok((entry.quota_bytes as u64, usage.used_bytes))
    }

    /// Reflink snapshot; idempotent when the destination already exists
    /// (§4.3).
    pub async fn create_snapshot(
        &self,
        svm: &str,
        volume: &str,
        source_path: &str,
        snapshot_path: &str,
    ) -> Result<()> {
        ids::validate_relative_path(source_path)?;
        ids::validate_relative_path(snapshot_path)?;

        let mount_point = self.volume_mount_path(svm, volume);
        let source = mount_point.join(source_path);
        let dest = mount_point.join(snapshot_path);

        if !source.exists() {
            return Err(ArcaError::not_found(format!("source path {source_path}")));
        }

        xfs::reflink_copy(&source, &dest).await?;
        self.store.record_snapshot(svm, source_path, snapshot_path).await?;
        Ok(())
    }

    pub async fn restore_snapshot(
        &self,
        svm: &str,
        volume: &str,
        snapshot_path: &str,
        target_path: &str,
    ) -> Result<()> {
        ids::validate_relative_path(snapshot_path)?;
        ids::validate_relative_path(target_path)?;

        let mount_point = self.volume_mount_path(svm, volume);
        let source = mount_point.join(snapshot_path);
        let dest = mount_point.join(target_path);

        if !source.exists() {
            return Err(ArcaError::not_found(format!("snapshot {snapshot_path}")));
        }

        xfs::reflink_copy(&source, &dest).await
    }

    pub async fn delete_snapshot(&self, svm: &str, volume: &str, snapshot_path: &str) -> Result<()> {
        let mount_point = self.volume_mount_path(svm, volume);
        let path = mount_point.join(snapshot_path);
        let _ = tokio::fs::remove_dir_all(&path).await;
        self.store.delete_snapshot(svm, snapshot_path).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub provisioned_bytes: u64,
}

pub fn volume_mount_root(export_root: &Path, svm: &str) -> PathBuf {
    export_root.join(svm)
}
