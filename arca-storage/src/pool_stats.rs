//! Thin-pool capacity accounting backing `GET /v1/svms/{name}/capacity`
//! (§4.6, and the `provisioned_bytes` field SPEC_FULL.md adds).

use tokio::process::Command;

use arca_common::error::{ArcaError, Result};

use crate::manager::PoolStats;

pub async fn get_pool_stats(vg_name: &str, pool_name: &str) -> Result<PoolStats> {
    let output = Command::new("lvs")
        .args([
            "--noheadings",
            "--units",
            "b",
            "--nosuffix",
            "-o",
            "lv_size,data_percent,lv_metadata_size",
            &format!("{vg_name}/{pool_name}"),
        ])
        .output()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;

    if !output.status.success() {
        return Err(ArcaError::Transient(format!(
            "lvs failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut fields = text.split_whitespace();
    let total_bytes: u64 = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ArcaError::Other(anyhow::anyhow!("unparsable lvs output")))?;
    let data_percent: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);

    let used_bytes = ((total_bytes as f64) * data_percent / 100.0) as u64;

    Ok(PoolStats {
        total_bytes,
        available_bytes: total_bytes.saturating_sub(used_bytes),
        used_bytes,
        provisioned_bytes: sum_thin_lv_sizes(vg_name).await.unwrap_or(0),
    })
}

async fn sum_thin_lv_sizes(vg_name: &str) -> Result<u64> {
    let output = Command::new("lvs")
        .args([
            "--noheadings",
            "--units",
            "b",
            "--nosuffix",
            "-o",
            "lv_size",
            vg_name,
        ])
        .output()
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;

    if !output.status.success() {
        return Ok(0);
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|l| l.trim().parse::<u64>().ok())
        .sum())
}
