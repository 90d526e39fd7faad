//! LVM thin pool / thin logical volume management. Shells out to `lvcreate`,
//! `lvextend`, `lvs` the way `mvirt-zfs::zfs` shells out to `zfs`/`zpool`.

use tokio::process::Command;
use tracing::debug;

use arca_common::error::{ArcaError, Result};

#[derive(Debug, Clone)]
pub struct ThinPool {
    pub vg_name: String,
    pub pool_name: String,
}

#[derive(Debug, Clone)]
pub struct LvInfo {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
}

impl ThinPool {
    pub fn new(vg_name: impl Into<String>, pool_name: impl Into<String>) -> Self {
        Self {
            vg_name: vg_name.into(),
            pool_name: pool_name.into(),
        }
    }

    fn lv_name(&self, volume: &str) -> String {
        format!("arca-{}", volume)
    }

    pub async fn create_thin_lv(&self, volume: &str, size_bytes: u64) -> Result<LvInfo> {
        let lv_name = self.lv_name(volume);
        run(Command::new("lvcreate").args([
            "--thin",
            "-V",
            &format!("{size_bytes}B"),
            "-n",
            &lv_name,
            &format!("{}/{}", self.vg_name, self.pool_name),
        ]))
        .await?;

        Ok(LvInfo {
            name: lv_name.clone(),
            path: format!("/dev/{}/{}", self.vg_name, lv_name),
            size_bytes,
        })
    }

    pub async fn get_lv(&self, volume: &str) -> Result<Option<LvInfo>> {
        let lv_name = self.lv_name(volume);
        let output = Command::new("lvs")
            .args([
                "--noheadings",
                "--units",
                "b",
                "--nosuffix",
                "-o",
                "lv_size",
                &format!("{}/{}", self.vg_name, lv_name),
            ])
            .output()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;

        if !output.status.success() {
            return Ok(None);
        }

        let size_bytes = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<u64>()
            .map_err(|e| ArcaError::Other(anyhow::anyhow!("unparsable lvs output: {e}")))?;

        Ok(Some(LvInfo {
            name: lv_name.clone(),
            path: format!("/dev/{}/{}", self.vg_name, lv_name),
            size_bytes,
        }))
    }

    /// Extend the LV to `new_size_bytes`. Caller is responsible for the
    /// filesystem grow step and for leaving the LV alone on failure (§4.3:
    /// "on failure the LV is left at its pre-op size" — `lvextend` itself
    /// does not partially apply a size change).
    pub async fn extend(&self, volume: &str, new_size_bytes: u64) -> Result<()> {
        let lv_name = self.lv_name(volume);
        run(Command::new("lvextend").args([
            "-L",
            &format!("{new_size_bytes}B"),
            &format!("{}/{}", self.vg_name, lv_name),
        ]))
        .await
    }

    pub async fn remove(&self, volume: &str) -> Result<()> {
        let lv_name = self.lv_name(volume);
        let status = Command::new("lvremove")
            .args(["-f", &format!("{}/{}", self.vg_name, lv_name)])
            .status()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        if !status.success() {
            debug!("lvremove for {lv_name} failed, treating absence as success");
        }
        Ok(())
    }
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
