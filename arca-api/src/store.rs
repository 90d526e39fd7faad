//! Cluster metadata store: Svm, Volume, Export, Directory, Snapshot records,
//! replacing the teacher's `mraft`-backed `RaftStore` with a local
//! `sqlx::SqlitePool` — this control plane has no Raft replication (see
//! DESIGN.md), so state lives in one place and is mutated only after
//! side-effects succeed (§4.6 step 4).

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use arca_common::error::{ArcaError, Result};
use arca_common::model::{Access, Export, SecFlavor, Snapshot, Squash, Svm, SvmState, Volume};

pub struct Store {
    pool: SqlitePool,
}

fn svm_state_str(state: SvmState) -> &'static str {
    match state {
        SvmState::Creating => "creating",
        SvmState::Ready => "ready",
        SvmState::Degraded => "degraded",
        SvmState::Deleting => "deleting",
    }
}

fn parse_svm_state(s: &str) -> SvmState {
    match s {
        "ready" => SvmState::Ready,
        "degraded" => SvmState::Degraded,
        "deleting" => SvmState::Deleting,
        _ => SvmState::Creating,
    }
}

fn access_str(a: Access) -> &'static str {
    match a {
        Access::Rw => "rw",
        Access::Ro => "ro",
    }
}

fn parse_access(s: &str) -> Access {
    if s == "rw" {
        Access::Rw
    } else {
        Access::Ro
    }
}

fn squash_str(s: Squash) -> &'static str {
    match s {
        Squash::RootSquash => "root_squash",
        Squash::NoRootSquash => "no_root_squash",
    }
}

fn parse_squash(s: &str) -> Squash {
    if s == "no_root_squash" {
        Squash::NoRootSquash
    } else {
        Squash::RootSquash
    }
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

    // --- SVMs ---

    pub async fn get_svm(&self, name: &str) -> Result<Option<Svm>> {
        let row = sqlx::query("SELECT * FROM svms WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.map(|r| Svm {
            name: r.get("name"),
            vlan_id: r.get::<i64, _>("vlan_id") as u16,
            ip_cidr: r.get("ip_cidr"),
            vip: r.get::<String, _>("vip").parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED),
            gateway: r.get::<String, _>("gateway").parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED),
            mtu: r.get::<i64, _>("mtu") as u32,
            state: parse_svm_state(&r.get::<String, _>("state")),
            created_at: r
                .get::<String, _>("created_at")
                .parse()
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    pub async fn list_svms(&self) -> Result<Vec<Svm>> {
        let rows = sqlx::query("SELECT * FROM svms ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(rows
            .into_iter()
            .map(|r| Svm {
                name: r.get("name"),
                vlan_id: r.get::<i64, _>("vlan_id") as u16,
                ip_cidr: r.get("ip_cidr"),
                vip: r.get::<String, _>("vip").parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED),
                gateway: r.get::<String, _>("gateway").parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED),
                mtu: r.get::<i64, _>("mtu") as u32,
                state: parse_svm_state(&r.get::<String, _>("state")),
                created_at: r
                    .get::<String, _>("created_at")
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    pub async fn vip_in_use(&self, vip: &std::net::Ipv4Addr) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM svms WHERE vip = ?")
            .bind(vip.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.is_some())
    }

    pub async fn vlan_in_use(&self, vlan_id: u16) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM svms WHERE vlan_id = ?")
            .bind(vlan_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.is_some())
    }

    pub async fn insert_svm(&self, svm: &Svm) -> Result<()> {
        sqlx::query(
            "INSERT INTO svms (name, vlan_id, ip_cidr, vip, gateway, mtu, state, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&svm.name)
        .bind(svm.vlan_id as i64)
        .bind(&svm.ip_cidr)
        .bind(svm.vip.to_string())
        .bind(svm.gateway.to_string())
        .bind(svm.mtu as i64)
        .bind(svm_state_str(svm.state))
        .bind(svm.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn set_svm_state(&self, name: &str, state: SvmState) -> Result<()> {
        sqlx::query("UPDATE svms SET state = ? WHERE name = ?")
            .bind(svm_state_str(state))
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn delete_svm(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM svms WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    // --- Volumes ---

    pub async fn get_volume(&self, svm: &str, name: &str) -> Result<Option<Volume>> {
        let row = sqlx::query("SELECT * FROM volumes WHERE svm = ? AND name = ?")
            .bind(svm)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.map(|r| Volume {
            name: r.get("name"),
            svm: r.get("svm"),
            size_bytes: r.get::<i64, _>("size_bytes") as u64,
            path: r.get("path"),
        }))
    }

    pub async fn insert_volume(&self, volume: &Volume) -> Result<()> {
        sqlx::query("INSERT INTO volumes (svm, name, size_bytes, path) VALUES (?, ?, ?, ?)")
            .bind(&volume.svm)
            .bind(&volume.name)
            .bind(volume.size_bytes as i64)
            .bind(&volume.path)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn update_volume_size(&self, svm: &str, name: &str, size_bytes: u64) -> Result<()> {
        sqlx::query("UPDATE volumes SET size_bytes = ? WHERE svm = ? AND name = ?")
            .bind(size_bytes as i64)
            .bind(svm)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn delete_volume(&self, svm: &str, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM volumes WHERE svm = ? AND name = ?")
            .bind(svm)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    // --- Exports ---

    pub async fn list_exports(&self, svm: &str) -> Result<Vec<Export>> {
        let rows = sqlx::query("SELECT * FROM exports WHERE svm = ? ORDER BY export_id")
            .bind(svm)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(rows.into_iter().map(row_to_export).collect())
    }

    pub async fn get_export(&self, svm: &str, export_id: u32) -> Result<Option<Export>> {
        let row = sqlx::query("SELECT * FROM exports WHERE svm = ? AND export_id = ?")
            .bind(svm)
            .bind(export_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.map(row_to_export))
    }

    pub async fn next_export_id(&self, svm: &str) -> Result<u32> {
        let row = sqlx::query("SELECT COALESCE(MAX(export_id), 0) as max_id FROM exports WHERE svm = ?")
            .bind(svm)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.get::<i64, _>("max_id") as u32 + 1)
    }

    pub async fn insert_export(&self, export: &Export) -> Result<()> {
        let sec = serde_json::to_string(&export.sec).map_err(|e| ArcaError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO exports (svm, export_id, volume, client_cidr, access, squash, sec, path, pseudo)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&export.svm)
        .bind(export.export_id as i64)
        .bind(&export.volume)
        .bind(&export.client_cidr)
        .bind(access_str(export.access))
        .bind(squash_str(export.squash))
        .bind(sec)
        .bind(&export.path)
        .bind(&export.pseudo)
        .execute(&self.pool)
        .await
        .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    pub async fn delete_export(&self, svm: &str, export_id: u32) -> Result<()> {
        sqlx::query("DELETE FROM exports WHERE svm = ? AND export_id = ?")
            .bind(svm)
            .bind(export_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    // --- Directories ---

    pub async fn get_directory(&self, svm: &str, path: &str) -> Result<Option<(u64, u32)>> {
        let row = sqlx::query("SELECT quota_bytes, project_id FROM directories WHERE svm = ? AND path = ?")
            .bind(svm)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.map(|r| (r.get::<i64, _>("quota_bytes") as u64, r.get::<i64, _>("project_id") as u32)))
    }

    pub async fn upsert_directory(&self, svm: &str, path: &str, quota_bytes: u64, project_id: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO directories (svm, path, quota_bytes, project_id) VALUES (?, ?, ?, ?)
             ON CONFLICT (svm, path) DO UPDATE SET quota_bytes = excluded.quota_bytes",
        )
        .bind(svm)
        .bind(path)
        .bind(quota_bytes as i64)
        .bind(project_id as i64)
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

    // --- Snapshots ---

    pub async fn get_snapshot(&self, svm: &str, snapshot_path: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query("SELECT * FROM snapshots WHERE svm = ? AND snapshot_path = ?")
            .bind(svm)
            .bind(snapshot_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(row.map(|r| Snapshot {
            svm: r.get("svm"),
            source_path: r.get("source_path"),
            snapshot_path: r.get("snapshot_path"),
            size_bytes: r.get::<i64, _>("size_bytes") as u64,
            ready_to_use: r.get::<i64, _>("ready_to_use") != 0,
        }))
    }

    pub async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO snapshots (svm, source_path, snapshot_path, size_bytes, ready_to_use)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&snapshot.svm)
        .bind(&snapshot.source_path)
        .bind(&snapshot.snapshot_path)
        .bind(snapshot.size_bytes as i64)
        .bind(snapshot.ready_to_use as i64)
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

fn row_to_export(r: sqlx::sqlite::SqliteRow) -> Export {
    let sec: Vec<SecFlavor> = serde_json::from_str(&r.get::<String, _>("sec")).unwrap_or_default();
    Export {
        export_id: r.get::<i64, _>("export_id") as u32,
        svm: r.get("svm"),
        volume: r.get("volume"),
        client_cidr: r.get("client_cidr"),
        access: parse_access(&r.get::<String, _>("access")),
        squash: parse_squash(&r.get::<String, _>("squash")),
        sec,
        path: r.get("path"),
        pseudo: r.get("pseudo"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_common::model::SecFlavor;

    fn sample_svm(name: &str) -> Svm {
        Svm {
            name: name.into(),
            vlan_id: 100,
            ip_cidr: "10.0.0.0/24".into(),
            vip: "10.0.0.5".parse().unwrap(),
            gateway: "10.0.0.1".parse().unwrap(),
            mtu: 1500,
            state: SvmState::Creating,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_svm_roundtrip() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.insert_svm(&sample_svm("tenant_a")).await.unwrap();
        let fetched = store.get_svm("tenant_a").await.unwrap().unwrap();
        assert_eq!(fetched.vlan_id, 100);
        assert_eq!(fetched.state, SvmState::Creating);
    }

    #[tokio::test]
    async fn vip_and_vlan_uniqueness_checks_reflect_inserts() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.insert_svm(&sample_svm("tenant_a")).await.unwrap();
        assert!(store.vip_in_use(&"10.0.0.5".parse().unwrap()).await.unwrap());
        assert!(store.vlan_in_use(100).await.unwrap());
        assert!(!store.vip_in_use(&"10.0.0.6".parse().unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn next_export_id_increments_from_existing_max() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        assert_eq!(store.next_export_id("tenant_a").await.unwrap(), 1);

        store
            .insert_export(&Export {
                export_id: 1,
                svm: "tenant_a".into(),
                volume: "vol1".into(),
                client_cidr: "10.0.0.0/24".into(),
                access: Access::Rw,
                squash: Squash::RootSquash,
                sec: vec![SecFlavor::Sys],
                path: "/exports/tenant_a/vol1".into(),
                pseudo: "/exports/tenant_a/vol1".into(),
            })
            .await
            .unwrap();

        assert_eq!(store.next_export_id("tenant_a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.delete_svm("missing").await.unwrap();
        store.delete_volume("missing", "missing").await.unwrap();
    }
}
