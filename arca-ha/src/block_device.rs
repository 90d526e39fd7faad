//! Replicated block device primary/secondary relation, shelled out to
//! `drbdadm` the same way the storage stack shells out to `lvs`/`mkfs.xfs`
//! (§4.1: "promotion of the block device precedes filesystem mount").

use async_trait::async_trait;
use tokio::process::Command;

use arca_common::error::{ArcaError, Result};

use crate::resource::{GroupResource, ResourceStatus};

pub struct BlockDeviceReplica {
    resource_name: String,
}

impl BlockDeviceReplica {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
        }
    }

    async fn role(&self) -> Result<String> {
        let output = Command::new("drbdadm")
            .args(["role", &self.resource_name])
            .output()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl GroupResource for BlockDeviceReplica {
    fn name(&self) -> &str {
        &self.resource_name
    }

    fn validate(&self) -> Result<()> {
        if self.resource_name.is_empty() {
            return Err(ArcaError::validation("drbd resource name must not be empty"));
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let role = self.role().await?;
        if role.starts_with("Primary") {
            return Ok(());
        }
        let status = Command::new("drbdadm")
            .args(["primary", &self.resource_name])
            .status()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        if !status.success() {
            return Err(ArcaError::Transient(format!(
                "drbdadm primary {} failed",
                self.resource_name
            )));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let role = self.role().await?;
        if role.starts_with("Secondary") {
            return Ok(());
        }
        let status = Command::new("drbdadm")
            .args(["secondary", &self.resource_name])
            .status()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        if !status.success() {
            return Err(ArcaError::Transient(format!(
                "drbdadm secondary {} failed",
                self.resource_name
            )));
        }
        Ok(())
    }

    async fn monitor(&self) -> Result<ResourceStatus> {
        let role = self.role().await?;
        Ok(if role.starts_with("Primary") {
            ResourceStatus::Started
        } else if role.starts_with("Secondary") {
            ResourceStatus::Stopped
        } else if role.is_empty() {
            ResourceStatus::Failed
        } else {
            ResourceStatus::Transitioning
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_resource_name() {
        let r = BlockDeviceReplica::new("");
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_accepts_named_resource() {
        let r = BlockDeviceReplica::new("svm-tenant_a");
        assert!(r.validate().is_ok());
    }
}
