//! Atomic file replace: write to a temp file in the same directory, fsync
//! it, rename over the target, fsync the containing directory. Used by the
//! Config Renderer (§4.5) and CSI Node's NodeState persistence (§4.8).

use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{ArcaError, Result};

pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ArcaError::validation("path has no parent directory"))?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    file.write_all(contents)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
    file.sync_all().await.map_err(|e| ArcaError::Other(e.into()))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;

    sync_dir(dir).await?;
    Ok(())
}

async fn sync_dir(dir: &Path) -> Result<()> {
    let dir_file = fs::File::open(dir).await.map_err(|e| ArcaError::Other(e.into()))?;
    dir_file.sync_all().await.map_err(|e| ArcaError::Other(e.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn atomic_write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"hello").await.unwrap();
        let contents = fs::read(&path).await.unwrap();
        assert_eq!(contents, b"hello");
        // no leftover tmp file
        let tmp = dir.path().join("state.json.tmp");
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn atomic_write_overwrites_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"first").await.unwrap();
        atomic_write(&path, b"second").await.unwrap();
        let contents = fs::read(&path).await.unwrap();
        assert_eq!(contents, b"second");
    }
}
