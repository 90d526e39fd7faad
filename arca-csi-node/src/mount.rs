//! Mount manager (§4.8). Shells out to `mount`/`umount`/`mountpoint` rather
//! than calling mount(2) directly, matching the shell-out idiom
//! `arca-storage/src/xfs.rs` uses for every other filesystem operation. A
//! single mutex serializes mount-table mutation with NodeState inspection
//! (§5 "CSI Node").

use std::future::Future;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

use arca_common::error::{ArcaError, Result};

const NFS_MOUNT_OPTIONS: &str = "nfsvers=4.2,rsize=1048576,wsize=1048576,hard,timeo=600,noresvport";

pub struct MountManager {
    base_mount_path: PathBuf,
    inner: Mutex<()>,
}

impl MountManager {
    pub fn new(base_mount_path: impl Into<PathBuf>) -> Self {
        Self {
            base_mount_path: base_mount_path.into(),
            inner: Mutex::new(()),
        }
    }

    pub fn svm_mount_path(&self, svm: &str) -> PathBuf {
        self.base_mount_path.join(svm)
    }

    /// Ensures the shared NFS mount for `svm` exists, serialized against
    /// concurrent callers and against refcount teardown.
    pub async fn ensure_svm_mount(&self, svm: &str, vip: Ipv4Addr) -> Result<PathBuf> {
        let _guard = self.inner.lock().await;
        let target = self.svm_mount_path(svm);
        if is_mounted(&target).await? {
            return Ok(target);
        }
        tokio::fs::create_dir_all(&target).await.map_err(|e| ArcaError::Other(e.into()))?;
        let source = format!("{vip}:/exports/{svm}");
        mount(&source, &target, &["-t", "nfs4", "-o", NFS_MOUNT_OPTIONS]).await?;
        info!(svm, %vip, target = %target.display(), "mounted shared SVM export");
        Ok(target)
    }

    /// Tears down the shared SVM mount if `remaining_count` (live NodeState
    /// entries for this SVM) is zero. `remaining_count` is evaluated after
    /// `inner`'s lock is taken, so it re-reads NodeState under the same lock
    /// that guards `ensure_svm_mount` (§4.8 "final safety re-check").
    pub async fn teardown_svm_mount_if_unused<F, Fut>(&self, svm: &str, remaining_count: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = usize>,
    {
        let _guard = self.inner.lock().await;
        if remaining_count().await != 0 {
            return Ok(());
        }
        let target = self.svm_mount_path(svm);
        unmount(&target).await?;
        let _ = tokio::fs::remove_dir(&target).await;
        info!(svm, "unmounted shared SVM export, refcount reached zero");
        Ok(())
    }

    pub async fn bind_mount(&self, source: &Path, target: &Path) -> Result<()> {
        if is_mounted(target).await? {
            return Ok(());
        }
        tokio::fs::create_dir_all(target).await.map_err(|e| ArcaError::Other(e.into()))?;
        mount(&source.to_string_lossy(), target, &["--bind"]).await
    }

    /// Remount a bind mount read-only. Bind mounts require a second
    /// remount,ro call because the mount flags cannot be set atomically with
    /// `--bind` (§4.8 "Publishing" step 3).
    pub async fn remount_readonly(&self, target: &Path) -> Result<()> {
        mount(&target.to_string_lossy(), target, &["-o", "remount,ro,bind"]).await
    }

    pub async fn unmount_if_mounted(&self, target: &Path) -> Result<()> {
        unmount(target).await
    }
}

async fn mount(source: &str, target: &Path, extra_args: &[&str]) -> Result<()> {
    let mut cmd = Command::new("mount");
    cmd.args(extra_args).arg(source).arg(target.to_string_lossy().as_ref());
    run(&mut cmd).await
}

/// Idempotent: absence of a mount point is treated as success (§7 "CSI Node
/// recovers from: ... unmount of non-mount (success)").
async fn unmount(target: &Path) -> Result<()> {
    if !is_mounted(target).await? {
        return Ok(());
    }
    let mut cmd = Command::new("umount");
    cmd.arg(target.to_string_lossy().as_ref());
    match run(&mut cmd).await {
        Ok(()) => Ok(()),
        Err(ArcaError::Transient(msg)) if msg.contains("not mounted") || msg.contains("not found") => {
            warn!(target = %target.display(), "umount reported target already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn is_mounted(target: &Path) -> Result<bool> {
    let output = Command::new("mountpoint")
        .args(["-q", &target.to_string_lossy()])
        .status()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    Ok(output.success())
}

async fn run(cmd: &mut Command) -> Result<()> {
    let output = cmd.output().await.map_err(|e| ArcaError::Other(e.into()))?;
    if !output.status.success() {
        return Err(ArcaError::Transient(format!(
            "command failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svm_mount_path_is_one_dir_per_svm() {
        let mgr = MountManager::new("/var/lib/csi-arca-storage/mounts");
        assert_eq!(
            mgr.svm_mount_path("k8s-default"),
            PathBuf::from("/var/lib/csi-arca-storage/mounts/k8s-default")
        );
    }
}
