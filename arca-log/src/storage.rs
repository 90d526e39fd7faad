use anyhow::Result;
use prost::Message;
use redb::{Database, TableDefinition};
use std::path::Path;
use ulid::Ulid;

use crate::LogEntry;

const TABLE_LOGS: TableDefinition<u128, &[u8]> = TableDefinition::new("logs");
const TABLE_IDX_OBJECT: TableDefinition<(&str, u128), ()> = TableDefinition::new("idx_object");
const TABLE_IDX_COMPONENT: TableDefinition<(&str, i32, u128), ()> =
    TableDefinition::new("idx_component");

pub struct LogManager {
    db: Database,
}

impl LogManager {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let db_path = data_dir.as_ref().join("logs.redb");
        let db = Database::create(&db_path)?;

        let txn = db.begin_write()?;
        txn.open_table(TABLE_LOGS)?;
        txn.open_table(TABLE_IDX_OBJECT)?;
        txn.open_table(TABLE_IDX_COMPONENT)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Insert entries that already have id and timestamp_ns set.
    pub fn append_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut logs = txn.open_table(TABLE_LOGS)?;
            let mut idx_obj = txn.open_table(TABLE_IDX_OBJECT)?;
            let mut idx_comp = txn.open_table(TABLE_IDX_COMPONENT)?;

            for entry in entries {
                let ulid: Ulid = entry
                    .id
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid ULID in entry: {e}"))?;

                let key = ulid.0;
                let encoded = entry.encode_to_vec();
                logs.insert(key, encoded.as_slice())?;

                for obj_id in &entry.related_object_ids {
                    idx_obj.insert((obj_id.as_str(), key), ())?;
                }

                idx_comp.insert((entry.component.as_str(), entry.level, key), ())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn query(
        &self,
        object_id: Option<String>,
        start_ns: Option<i64>,
        end_ns: Option<i64>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let start_ms = start_ns.unwrap_or(0) / 1_000_000;
        let end_ms = end_ns.unwrap_or(i64::MAX) / 1_000_000;
        let min_ulid = Ulid::from_parts(start_ms as u64, 0).0;
        let max_ulid = Ulid::from_parts(end_ms as u64, u128::MAX).0;

        let txn = self.db.begin_read()?;
        let logs = txn.open_table(TABLE_LOGS)?;
        let mut results = Vec::new();

        if let Some(obj) = object_id {
            let idx_obj = txn.open_table(TABLE_IDX_OBJECT)?;
            let range = idx_obj.range((obj.as_str(), min_ulid)..=(obj.as_str(), max_ulid))?;

            for item in range {
                if results.len() >= limit {
                    break;
                }
                let (key, _) = item?;
                let (_, ulid_key) = key.value();
                if let Some(access) = logs.get(ulid_key)? {
                    results.push(LogEntry::decode(access.value())?);
                }
            }
        } else {
            let range = logs.range(min_ulid..=max_ulid)?;

            for item in range {
                if results.len() >= limit {
                    break;
                }
                let (_, value) = item?;
                results.push(LogEntry::decode(value.value())?);
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(id: &str, timestamp_ns: i64, message: &str, objects: Vec<&str>) -> LogEntry {
        LogEntry {
            id: id.to_string(),
            timestamp_ns,
            message: message.to_string(),
            level: 1,
            component: "test".to_string(),
            related_object_ids: objects.into_iter().map(String::from).collect(),
        }
    }

    fn ulid_at_ms(ms: u64) -> String {
        Ulid::from_parts(ms, rand::random()).to_string()
    }

    #[test]
    fn append_and_query_all() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = LogManager::new(dir.path()).unwrap();

        let ts = 1_700_000_000_000_000_000i64;
        let id = ulid_at_ms((ts / 1_000_000) as u64);
        mgr.append_batch(vec![make_entry(&id, ts, "test log", vec![])])
            .unwrap();

        let results = mgr.query(None, None, None, 100).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "test log");
    }

    #[test]
    fn query_by_object_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = LogManager::new(dir.path()).unwrap();
        let ts = 1_700_000_000_000_000_000i64;
        let id1 = ulid_at_ms((ts / 1_000_000) as u64);
        let id2 = ulid_at_ms((ts / 1_000_000) as u64);

        mgr.append_batch(vec![
            make_entry(&id1, ts, "with obj", vec!["svm-1"]),
            make_entry(&id2, ts, "no obj", vec!["svm-2"]),
        ])
        .unwrap();

        let results = mgr.query(Some("svm-1".to_string()), None, None, 100).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "with obj");
    }

    #[test]
    fn append_batch_rejects_invalid_ulid() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = LogManager::new(dir.path()).unwrap();
        let entry = make_entry("not-a-ulid", 1_000_000_000, "bad", vec![]);
        assert!(mgr.append_batch(vec![entry]).is_err());
    }
}
