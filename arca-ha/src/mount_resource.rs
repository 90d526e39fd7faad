//! Filesystem mount stage of a resource group (§4.1: "filesystem mount of
//! the SVM's XFS volume" comes after block device promotion, before netns).

use std::path::PathBuf;

use async_trait::async_trait;

use arca_common::error::{ArcaError, Result};
use arca_storage::xfs;

use crate::resource::{GroupResource, ResourceStatus};

pub struct FilesystemMount {
    name: String,
    device: String,
    mount_point: PathBuf,
}

impl FilesystemMount {
    pub fn new(name: impl Into<String>, device: impl Into<String>, mount_point: PathBuf) -> Self {
        Self {
            name: name.into(),
            device: device.into(),
            mount_point,
        }
    }
}

#[async_trait]
impl GroupResource for FilesystemMount {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(ArcaError::validation("mount device must not be empty"));
        }
        if !self.mount_point.is_absolute() {
            return Err(ArcaError::validation("mount point must be an absolute path"));
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        xfs::mount(&self.device, &self.mount_point).await
    }

    async fn stop(&self) -> Result<()> {
        xfs::unmount(&self.mount_point).await
    }

    async fn monitor(&self) -> Result<ResourceStatus> {
        let output = tokio::process::Command::new("mountpoint")
            .args(["-q", &self.mount_point.to_string_lossy()])
            .status()
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(if output.success() {
            ResourceStatus::Started
        } else {
            ResourceStatus::Stopped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_relative_mount_point() {
        let m = FilesystemMount::new("svm1", "/dev/mapper/arca-vol1", PathBuf::from("relative"));
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_accepts_absolute_mount_point() {
        let m = FilesystemMount::new("svm1", "/dev/mapper/arca-vol1", PathBuf::from("/exports/svm1"));
        assert!(m.validate().is_ok());
    }
}
