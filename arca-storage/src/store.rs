//! Sqlite side-table recording directory→project_id assignments and known
//! snapshots, mirroring `mvirt-zfs::store`'s use of `sqlx::SqlitePool` to
//! keep metadata the backing filesystem itself doesn't expose cheaply.

use chrono::Utc;
use sqlx::SqlitePool;

use arca_common::error::{ArcaError, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DirectoryEntry {
    pub svm: String,
    pub path: String,
    pub project_id: i64,
    pub quota_bytes: i64,
    pub created_at: String,
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(Self { pool })
    }

    pub async fn get_directory(&self, svm: &str, path: &str) -> Result<Option<DirectoryEntry>> {
        sqlx::query_as::<_, DirectoryEntry>(
            "SELECT svm, path, project_id, quota_bytes, created_at FROM directories WHERE svm = ? AND path = ?",
        )
        .bind(svm)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ArcaError::Other(e.into()))
    }

    pub async fn project_id_in_use(&self, project_id: u32) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT project_id FROM directories WHERE project_id = ?")
                .bind(project_id as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.is_some())
    }

    pub async fn insert_directory(
        &self,
        svm: &str,
        path: &str,
        project_id: u32,
        quota_bytes: u64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO directories (svm, path, project_id, quota_bytes, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(svm)
        .bind(path)
        .bind(project_id as i64)
        .bind(quota_bytes as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn update_quota(&self, svm: &str, path: &str, quota_bytes: u64) -> Result<()> {
        sqlx::query("UPDATE directories SET quota_bytes = ? WHERE svm = ? AND path = ?")
            .bind(quota_bytes as i64)
            .bind(svm)
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn delete_directory(&self, svm: &str, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM directories WHERE svm = ? AND path = ?")
            .bind(svm)
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn record_snapshot(&self, svm: &str, source_path: &str, snapshot_path: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO snapshots (svm, source_path, snapshot_path, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(svm)
        .bind(source_path)
        .bind(snapshot_path)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn delete_snapshot(&self, svm: &str, snapshot_path: &str) -> Result<()> {
        sqlx::query("DELETE FROM snapshots WHERE svm = ? AND snapshot_path = ?")
            .bind(svm)
            .bind(snapshot_path)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_directory_roundtrip() {
        let store = test_store().await;
        store.insert_directory("tenant_a", "pvc-1", 1001, 1024).await.unwrap();
        let entry = store.get_directory("tenant_a", "pvc-1").await.unwrap().unwrap();
        assert_eq!(entry.project_id, 1001);
        assert_eq!(entry.quota_bytes, 1024);
    }

    #[tokio::test]
    async fn project_id_in_use_reflects_inserts() {
        let store = test_store().await;
        assert!(!store.project_id_in_use(42).await.unwrap());
        store.insert_directory("tenant_a", "pvc-1", 42, 1024).await.unwrap();
        assert!(store.project_id_in_use(42).await.unwrap());
    }

    #[tokio::test]
    async fn update_quota_is_monotonic_caller_enforced() {
        let store = test_store().await;
        store.insert_directory("tenant_a", "pvc-1", 1, 1024).await.unwrap();
        store.update_quota("tenant_a", "pvc-1", 2048).await.unwrap();
        let entry = store.get_directory("tenant_a", "pvc-1").await.unwrap().unwrap();
        assert_eq!(entry.quota_bytes, 2048);
    }

    #[tokio::test]
    async fn delete_directory_is_idempotent() {
        let store = test_store().await;
        store.delete_directory("tenant_a", "missing").await.unwrap();
        store.insert_directory("tenant_a", "pvc-1", 1, 1024).await.unwrap();
        store.delete_directory("tenant_a", "pvc-1").await.unwrap();
        store.delete_directory("tenant_a", "pvc-1").await.unwrap();
        assert!(store.get_directory("tenant_a", "pvc-1").await.unwrap().is_none());
    }
}
