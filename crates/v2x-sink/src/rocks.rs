//! Local durable sink using RocksDB.

use crate::error::Result;
use crate::{validate_path, Sink};
use async_trait::async_trait;
use rocksdb::{Options, DB};
use serde_json::Value;
use std::path::Path;

/// RocksDB-backed key-path store. Keys are the sink paths, values JSON.
pub struct RocksSink {
    db: DB,
}

impl RocksSink {
    /// Open or create a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Store a record.
    pub fn put_record(&self, path: &str, record: &Value) -> Result<()> {
        validate_path(path)?;
        let value = serde_json::to_vec(record)?;
        self.db.put(path.as_bytes(), value)?;
        Ok(())
    }

    /// Get the record at `path`.
    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        match self.db.get(path.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// List every record whose path starts with `prefix`.
    pub fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let prefix = prefix.as_bytes();
        let mut records = Vec::new();

        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                let path = String::from_utf8_lossy(&key).into_owned();
                records.push((path, serde_json::from_slice(&value)?));
            } else {
                break;
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl Sink for RocksSink {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    async fn put(&self, path: &str, record: &Value) -> Result<()> {
        self.put_record(path, record)
    }

    async fn close(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INTERSECTION_STATUS;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn record_roundtrip() {
        let dir = tempdir().unwrap();
        let sink = RocksSink::open(dir.path()).unwrap();

        let record = json!({"timestamp": 1, "phaseStates": []});
        sink.put_record("intersection_status/2351", &record).unwrap();

        assert_eq!(sink.get("intersection_status/2351").unwrap(), Some(record));
        assert_eq!(sink.get("intersection_status/9999").unwrap(), None);
    }

    #[test]
    fn put_overwrites() {
        let dir = tempdir().unwrap();
        let sink = RocksSink::open(dir.path()).unwrap();

        sink.put_record("vehicle_status/7", &json!({"speed": 1.0})).unwrap();
        sink.put_record("vehicle_status/7", &json!({"speed": 2.0})).unwrap();

        assert_eq!(sink.get("vehicle_status/7").unwrap(), Some(json!({"speed": 2.0})));
    }

    #[test]
    fn list_by_prefix() {
        let dir = tempdir().unwrap();
        let sink = RocksSink::open(dir.path()).unwrap();

        sink.put_record("intersection_status/1", &json!(1)).unwrap();
        sink.put_record("intersection_status/2", &json!(2)).unwrap();
        sink.put_record("vehicle_status/1", &json!(3)).unwrap();

        let listed = sink.list(&format!("{INTERSECTION_STATUS}/")).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|(path, _)| path.starts_with(INTERSECTION_STATUS)));
    }

    #[test]
    fn invalid_path_rejected() {
        let dir = tempdir().unwrap();
        let sink = RocksSink::open(dir.path()).unwrap();
        assert!(sink.put_record("vehicle_status/", &json!(1)).is_err());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let sink = RocksSink::open(dir.path()).unwrap();
            sink.put("intersection_status/2351", &json!({"ok": true})).await.unwrap();
            sink.close().await.unwrap();
        }

        let sink = RocksSink::open(dir.path()).unwrap();
        assert_eq!(
            sink.get("intersection_status/2351").unwrap(),
            Some(json!({"ok": true}))
        );
    }
}
