//! NodeState persistence (§4.8 "NodeState on-disk format"). Writes go through
//! `arca_common::fsutil::atomic_write` (temp file, fsync, rename, fsync dir).
//! A parse failure at startup quarantines the file under `.corrupt.<pid>` and
//! continues with an empty state, per §7 "Corruption".

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{error, warn};

use arca_common::error::Result;
use arca_common::fsutil::atomic_write;
use arca_common::model::NodeState;

pub struct NodeStateStore {
    path: PathBuf,
    state: Mutex<NodeState>,
}

impl NodeStateStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<NodeState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    quarantine(&path, &e);
                    NodeState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => NodeState::default(),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to read NodeState, starting empty");
                NodeState::default()
            }
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub async fn snapshot(&self) -> NodeState {
        self.state.lock().await.clone()
    }

    /// Applies `mutate` to an in-memory copy, persists it, and only commits
    /// the mutation in memory if the write succeeds.
    pub async fn mutate(&self, mutate: impl FnOnce(&mut NodeState)) -> Result<()> {
        let mut guard = self.state.lock().await;
        let mut candidate = guard.clone();
        mutate(&mut candidate);
        let bytes = serde_json::to_vec_pretty(&candidate).map_err(|e| arca_common::error::ArcaError::Other(e.into()))?;
        atomic_write(&self.path, &bytes).await?;
        *guard = candidate;
        Ok(())
    }
}

fn quarantine(path: &Path, parse_error: &serde_json::Error) {
    let quarantine_path = path.with_extension(format!("json.corrupt.{}", std::process::id()));
    error!(error = %parse_error, path = %path.display(), quarantine = %quarantine_path.display(), "NodeState failed to parse, quarantining");
    if let Err(e) = std::fs::rename(path, &quarantine_path) {
        error!(error = %e, "failed to quarantine corrupt NodeState file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_common::model::NodeVolumeEntry;

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeStateStore::load(dir.path().join("node-volumes.json"));
        assert!(store.snapshot().await.volumes.is_empty());
    }

    #[tokio::test]
    async fn mutate_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node-volumes.json");
        let store = NodeStateStore::load(&path);
        store
            .mutate(|s| {
                s.volumes.insert(
                    "pvc-aaaa".to_string(),
                    NodeVolumeEntry {
                        volume_id: "pvc-aaaa".to_string(),
                        svm: "k8s-default".to_string(),
                        vip: "192.168.10.5".parse().unwrap(),
                        staging_path: "/var/lib/kubelet/staging/pvc-aaaa".to_string(),
                        published_paths: vec![],
                    },
                );
            })
            .await
            .unwrap();

        let reloaded = NodeStateStore::load(&path);
        assert_eq!(reloaded.snapshot().await.volumes.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node-volumes.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = NodeStateStore::load(&path);
        assert!(store.snapshot().await.volumes.is_empty());
        assert!(!path.exists());
    }
}
