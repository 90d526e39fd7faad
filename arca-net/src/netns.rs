//! Network namespace lifecycle, shelled out to `ip netns` the way the rest
//! of this stack shells out to system tools rather than reimplementing
//! `unshare`/mount-namespace bookkeeping.

use tokio::process::Command;

use arca_common::error::{ArcaError, Result};

pub async fn ensure(ns: &str) -> Result<()> {
    let status = Command::new("ip")
        .args(["netns", "add", ns])
        .status()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    // `ip netns add` fails if the namespace already exists; that is success
    // for an idempotent `start` (§4.2).
    let _ = status;
    Ok(())
}

pub async fn delete(ns: &str) -> Result<()> {
    // absence is success
    let _ = Command::new("ip").args(["netns", "del", ns]).status().await;
    Ok(())
}

pub async fn exists(ns: &str) -> Result<bool> {
    let output = Command::new("ip")
        .args(["netns", "list"])
        .output()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.lines().any(|l| l.split_whitespace().next() == Some(ns)))
}

/// Path `ip netns add` bind-mounts the namespace handle at.
pub fn ns_path(ns: &str) -> std::path::PathBuf {
    std::path::PathBuf::from("/var/run/netns").join(ns)
}
