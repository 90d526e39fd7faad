//! XFS formatting, mounting, and project quotas (§4.3).

use std::path::Path;
use tokio::process::Command;

use arca_common::error::{ArcaError, Result};

/// mkfs options chosen for NVMe thin LVs (§4.3): crc+finobt, 512B inodes,
/// 4KiB blocks, 32 allocation groups, stripe parameters matching the pool's
/// thin chunk size.
pub async fn format_xfs(device: &str, stripe_unit_kb: u32, stripe_width_kb: u32) -> Result<()> {
    run(Command::new("mkfs.xfs").args([
        "-f",
        "-m",
        "crc=1,finobt=1",
        "-i",
        "size=512",
        "-b",
        "size=4096",
        "-d",
        &format!("agcount=32,su={stripe_unit_kb}k,sw={stripe_width_kb}"),
        device,
    ]))
    .await
}

pub async fn mount(device: &str, target: &Path) -> Result<()> {
    tokio::fs::create_dir_all(target)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    run(Command::new("mount").args([
        "-t",
        "xfs",
        "-o",
        "rw,noatime,nodiratime,logbsize=256k,inode64",
        device,
        &target.to_string_lossy(),
    ]))
    .await
}

pub async fn unmount(target: &Path) -> Result<()> {
    let status = Command::new("umount")
        .arg(target.to_string_lossy().as_ref())
        .status()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    // absence of a mount point is treated as success (idempotent teardown)
    let _ = status;
    Ok(())
}

/// Online filesystem grow after `lvextend`. `xfs_growfs` operates on the
/// mount point, not the device.
pub async fn grow(mount_point: &Path) -> Result<()> {
    run(Command::new("xfs_growfs").arg(mount_point.to_string_lossy().as_ref()))
        .await
}

/// Deterministic 32-bit project id derived from `(svm, path)` with linear
/// collision retry (§4.3). `exists` should check whether the candidate id
/// is already in use.
pub fn derive_project_id(svm: &str, path: &str, mut exists: impl FnMut(u32) -> bool) -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    svm.hash(&mut hasher);
    path.hash(&mut hasher);
    let base = (hasher.finish() as u32).max(1);

    let mut candidate = base;
    while exists(candidate) {
        candidate = candidate.wrapping_add(1).max(1);
    }
    candidate
}

pub async fn set_project(mount_point: &Path, project_id: u32, relative_path: &str) -> Result<()> {
    let target = mount_point.join(relative_path);
    run(Command::new("xfs_quota").args([
        "-x",
        "-c",
        &format!("project -s -p {} {}", target.to_string_lossy(), project_id),
        &mount_point.to_string_lossy(),
    ]))
    .await
}

/// `ExpandQuota` is monotonic — callers must ensure `quota_bytes` is not
/// below the project's current usage before calling this.
pub async fn set_quota(mount_point: &Path, project_id: u32, quota_bytes: u64) -> Result<()> {
    run(Command::new("xfs_quota").args([
        "-x",
        "-c",
        &format!("limit -p bhard={quota_bytes} {project_id}"),
        &mount_point.to_string_lossy(),
    ]))
    .await
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaUsage {
    pub used_bytes: u64,
}

pub async fn get_quota_usage(mount_point: &Path, project_id: u32) -> Result<QuotaUsage> {
    let output = Command::new("xfs_quota")
        .args([
            "-x",
            "-c",
            &format!("report -p -N -o bcount {project_id}"),
            &mount_point.to_string_lossy(),
        ])
        .output()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;

    if !output.status.success() {
        return Ok(QuotaUsage::default());
    }

    let used_bytes = String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .next_back()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
        * 512; // xfs_quota reports in 512-byte blocks

    Ok(QuotaUsage { used_bytes })
}

/// Reflink copy. §4.3: "creating over an existing identical destination is
/// a no-op success".
pub async fn reflink_copy(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
    }
    run(Command::new("cp").args([
        "--reflink=always",
        "-r",
        &source.to_string_lossy(),
        &dest.to_string_lossy(),
    ]))
    .await
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
    use std::collections::HashSet;

    #[test]
    fn project_id_deterministic() {
        let a = derive_project_id("tenant_a", "pvc-1", |_| false);
        let b = derive_project_id("tenant_a", "pvc-1", |_| false);
        assert_eq!(a, b);
    }

    #[test]
    fn project_id_differs_by_input() {
        let a = derive_project_id("tenant_a", "pvc-1", |_| false);
        let b = derive_project_id("tenant_a", "pvc-2", |_| false);
        assert_ne!(a, b);
    }

    #[test]
    fn project_id_collision_retry_advances() {
        let mut used = HashSet::new();
        let first = derive_project_id("tenant_a", "pvc-1", |id| used.contains(&id));
        used.insert(first);
        let second = derive_project_id("tenant_a", "pvc-1", |id| used.contains(&id));
        assert_ne!(first, second);
    }
}
