//! Per-SVM NFS Exporter daemon lifecycle (§4.4): one process per SVM,
//! running inside the SVM's netns, wrapping the real NFS server binary
//! (`ganesha.nfsd`) the way the rest of this stack wraps `lvcreate`/
//! `mkfs.xfs`/`ip netns` rather than reimplementing an NFS protocol stack.

use std::path::{Path, PathBuf};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use arca_common::error::{ArcaError, Result};
use arca_common::fsutil::atomic_write;

use crate::render::RenderedConfig;

pub fn config_path(config_dir: &Path, svm: &str) -> PathBuf {
    config_dir.join(format!("exporter.{svm}.conf"))
}

/// Writes the rendered config atomically (§4.5: "write to temporary file in
/// the same directory, fsync, rename, fsync directory").
pub async fn write_config(config_dir: &Path, svm: &str, rendered: &RenderedConfig) -> Result<()> {
    atomic_write(&config_path(config_dir, svm), rendered.body.as_bytes()).await
}

/// Supervises the `ganesha.nfsd` child process for one SVM, inside its
/// netns.
pub struct ExporterDaemon {
    svm: String,
    netns: String,
    config_dir: PathBuf,
    child: Option<Child>,
}

impl ExporterDaemon {
    pub fn new(svm: impl Into<String>, netns: impl Into<String>, config_dir: PathBuf) -> Self {
        Self {
            svm: svm.into(),
            netns: netns.into(),
            config_dir,
            child: None,
        }
    }

    /// Idempotent: returns immediately if the daemon is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let config = config_path(&self.config_dir, &self.svm);
        let child = Command::new("ip")
            .args([
                "netns",
                "exec",
                &self.netns,
                "ganesha.nfsd",
                "-F",
                "-L",
                "STDOUT",
                "-f",
            ])
            .arg(&config)
            .spawn()
            .map_err(|e| ArcaError::Other(e.into()))?;
        self.child = Some(child);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        matches!(
            self.child.as_mut().map(|c| c.try_wait()),
            Some(Ok(None))
        )
    }

    /// Re-reads the config file via `SIGHUP` (§4.4: "reload (signal or
    /// equivalent) ... must not interrupt in-flight I/O for unchanged
    /// exports" — a property of `ganesha.nfsd` itself, not this wrapper).
    pub fn reload(&self) -> Result<()> {
        let pid = self
            .child
            .as_ref()
            .and_then(|c| c.id())
            .ok_or_else(|| ArcaError::StateMachine(format!("{} is not running", self.svm)))?;
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGHUP)
            .map_err(|e| ArcaError::Other(anyhow::anyhow!("SIGHUP to {} failed: {e}", self.svm)))
    }

    /// Graceful stop: SIGTERM then wait. Absence is success.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(pid) = child.id() {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        let _ = child.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render;

    #[tokio::test]
    async fn write_config_creates_file_at_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = render("v1", &crate::render::ExporterProtocolConfig::default(), &[]);
        write_config(dir.path(), "tenant_a", &rendered).await.unwrap();

        let path = config_path(dir.path(), "tenant_a");
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, rendered.body);
    }

    #[test]
    fn reload_without_running_child_is_state_machine_error() {
        let daemon = ExporterDaemon::new("tenant_a", "tenant_a", PathBuf::from("/tmp"));
        assert!(daemon.reload().is_err());
    }
}
