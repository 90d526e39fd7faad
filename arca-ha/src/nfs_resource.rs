//! NFS daemon stage of a resource group (§4.4: "runs one daemon per SVM,
//! inside the SVM's netns"). Each SVM gets its own systemd service instance
//! (`arca-exporter@<svm>`); lifecycle is driven through `systemctl` the same
//! way the rest of this stack shells out to system tools rather than
//! managing processes directly.

use async_trait::async_trait;
use tokio::process::Command;

use arca_common::error::{ArcaError, Result};

use crate::resource::{GroupResource, ResourceStatus};

pub struct NfsDaemon {
    svm: String,
}

impl NfsDaemon {
    pub fn new(svm: impl Into<String>) -> Self {
        Self { svm: svm.into() }
    }

    fn unit(&self) -> String {
        format!("arca-exporter@{}.service", self.svm)
    }
}

#[async_trait]
impl GroupResource for NfsDaemon {
    fn name(&self) -> &str {
        &self.svm
    }

    fn validate(&self) -> Result<()> {
        if self.svm.is_empty() {
            return Err(ArcaError::validation("svm name must not be empty"));
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let status = Command::new("systemctl")
            .args(["start", &self.unit()])
            .status()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        if !status.success() {
            return Err(ArcaError::Transient(format!("failed to start {}", self.unit())));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // absence of the unit is treated as already-stopped
        let _ = Command::new("systemctl")
            .args(["stop", &self.unit()])
            .status()
            .await;
        Ok(())
    }

    async fn monitor(&self) -> Result<ResourceStatus> {
        let output = Command::new("systemctl")
            .args(["is-active", &self.unit()])
            .output()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(match state.as_str() {
            "active" => ResourceStatus::Started,
            "inactive" => ResourceStatus::Stopped,
            "failed" => ResourceStatus::Failed,
            "activating" | "deactivating" => ResourceStatus::Transitioning,
            _ => ResourceStatus::Stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_is_scoped_to_svm() {
        let d = NfsDaemon::new("tenant_a");
        assert_eq!(d.unit(), "arca-exporter@tenant_a.service");
    }

    #[test]
    fn validate_rejects_empty_svm_name() {
        let d = NfsDaemon::new("");
        assert!(d.validate().is_err());
    }
}
