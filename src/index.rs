//! durable, append-only log of checkpoint records
//!
//! the index is a JSON array in `rewind-index.json` next to the snapshot
//! store. every rewrite goes through a temp file and a rename, and holds an
//! exclusive lock on `index.lock` for the whole read-modify-write.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};
use crate::exclude::INDEX_FILE_NAME;
use crate::hash::Hash;

const LOCK_FILE_NAME: &str = "index.lock";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// one user-visible point in history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckpointRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub snapshot_ref: Hash,
    pub files_changed: u64,
}

impl CheckpointRecord {
    /// new record with a fresh id, stamped now
    pub fn new(message: Option<String>, snapshot_ref: Hash, files_changed: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            message,
            snapshot_ref,
            files_changed,
        }
    }
}

/// checkpoint index for one workspace identity
#[derive(Clone, Debug)]
pub struct CheckpointIndex {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl CheckpointIndex {
    /// index stored in `dir`, which is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// how long a writer waits for another writer before giving up
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    /// every record in insertion order
    ///
    /// a missing file is an empty index. anything that does not parse or
    /// validate is `CorruptIndex`.
    pub fn load(&self) -> Result<Vec<CheckpointRecord>> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io { path, source: e }),
        };

        let records: Vec<CheckpointRecord> =
            serde_json::from_str(&content).map_err(|e| corrupt(&path, e))?;
        validate(&records).map_err(|message| corrupt(&path, message))?;
        Ok(records)
    }

    /// add a record and rewrite the index atomically
    pub fn append(&self, record: CheckpointRecord) -> Result<()> {
        let _lock = self.lock()?;
        let mut records = self.load()?;

        if records.iter().any(|r| r.id == record.id) {
            return Err(corrupt(&self.path(), format!("duplicate id {}", record.id)));
        }
        tracing::debug!(checkpoint = %record.id, total = records.len() + 1, "appending checkpoint");

        records.push(record);
        self.write(&records)
    }

    pub fn get(&self, id: &str) -> Result<Option<CheckpointRecord>> {
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    /// records newest first, ties keep insertion order
    pub fn list_descending(&self) -> Result<Vec<CheckpointRecord>> {
        let mut records = self.load()?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    pub fn latest(&self) -> Result<Option<CheckpointRecord>> {
        Ok(self.list_descending()?.into_iter().next())
    }

    /// drop records older than `days` days, returning how many went
    ///
    /// only the index is touched, snapshots stay in the store.
    pub fn prune_older_than(&self, days: u32) -> Result<usize> {
        self.prune_older_than_at(days, Utc::now())
    }

    /// [`CheckpointIndex::prune_older_than`] against a fixed clock
    pub fn prune_older_than_at(&self, days: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - chrono::Duration::days(i64::from(days));

        let _lock = self.lock()?;
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        let removed = before - records.len();

        if removed > 0 {
            self.write(&records)?;
        }
        Ok(removed)
    }

    fn write(&self, records: &[CheckpointRecord]) -> Result<()> {
        let path = self.path();
        let json = serde_json::to_vec_pretty(records)?;

        let tmp_path = self.dir.join(format!(".{}.{}", INDEX_FILE_NAME, uuid::Uuid::new_v4()));
        {
            let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
            tmp_file.write_all(&json).with_path(&tmp_path)?;
            tmp_file.sync_all().with_path(&tmp_path)?;
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Io { path, source: e });
        }

        let dir = File::open(&self.dir).with_path(&self.dir)?;
        dir.sync_all().with_path(&self.dir)?;
        Ok(())
    }

    /// exclusive writer lock, retried until the timeout runs out
    fn lock(&self) -> Result<Flock<File>> {
        fs::create_dir_all(&self.dir).with_path(&self.dir)?;
        let lock_path = self.dir.join(LOCK_FILE_NAME);
        let deadline = Instant::now() + self.lock_timeout;

        loop {
            let file = File::create(&lock_path).with_path(&lock_path)?;
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(flock) => return Ok(flock),
                Err((_, nix::errno::Errno::EWOULDBLOCK)) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(_) => return Err(Error::IndexWriteConflict(lock_path)),
            }
        }
    }
}

fn validate(records: &[CheckpointRecord]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for record in records {
        if record.id.trim().is_empty() {
            return Err("record with empty id".to_string());
        }
        if !seen.insert(record.id.as_str()) {
            return Err(format!("duplicate id {}", record.id));
        }
    }
    Ok(())
}

fn corrupt(path: &Path, message: impl std::fmt::Display) -> Error {
    Error::CorruptIndex {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record_at(secs: i64, message: &str) -> CheckpointRecord {
        CheckpointRecord {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            ..CheckpointRecord::new(Some(message.to_string()), Hash::digest(message.as_bytes()), 0)
        }
    }

    #[test]
    fn test_missing_index_is_empty() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path().join("nope"));
        assert!(index.load().unwrap().is_empty());
        assert!(index.latest().unwrap().is_none());
    }

    #[test]
    fn test_append_and_get() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());

        let record = CheckpointRecord::new(Some("first".to_string()), Hash::digest(b"x"), 3);
        index.append(record.clone()).unwrap();

        assert_eq!(index.get(&record.id).unwrap(), Some(record));
        assert_eq!(index.get("missing").unwrap(), None);
    }

    #[test]
    fn test_record_json_shape() {
        let record = CheckpointRecord::new(None, Hash::ZERO, 2);
        let value = serde_json::to_value(&record).unwrap();

        assert!(value.get("snapshotRef").is_some());
        assert_eq!(value["filesChanged"], 2);
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_list_descending_sorts_by_timestamp() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());

        index.append(record_at(200, "middle")).unwrap();
        index.append(record_at(100, "oldest")).unwrap();
        index.append(record_at(300, "newest")).unwrap();

        let messages: Vec<_> = index
            .list_descending()
            .unwrap()
            .into_iter()
            .map(|r| r.message.unwrap())
            .collect();
        assert_eq!(messages, vec!["newest", "middle", "oldest"]);
        assert_eq!(index.latest().unwrap().unwrap().message.as_deref(), Some("newest"));
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());

        index.append(record_at(100, "a")).unwrap();
        index.append(record_at(100, "b")).unwrap();

        let listed = index.list_descending().unwrap();
        assert_eq!(listed[0].message.as_deref(), Some("a"));
        assert_eq!(listed[1].message.as_deref(), Some("b"));
    }

    #[test]
    fn test_prune_older_than() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());
        let now = Utc.timestamp_opt(100 * 86_400, 0).unwrap();

        index.append(record_at(80 * 86_400, "old")).unwrap();
        index.append(record_at(95 * 86_400, "recent")).unwrap();
        index.append(record_at(99 * 86_400, "fresh")).unwrap();

        assert_eq!(index.prune_older_than_at(10, now).unwrap(), 1);
        assert_eq!(index.load().unwrap().len(), 2);
        assert_eq!(index.prune_older_than_at(10, now).unwrap(), 0);
        assert_eq!(index.prune_older_than_at(0, now).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_json_is_rejected() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());
        fs::write(index.path(), "{ not json").unwrap();

        assert!(matches!(index.load(), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());
        let json = format!(
            r#"[{{"id":"a","timestamp":"2024-01-01T00:00:00Z","snapshotRef":"{}","filesChanged":1,"extra":true}}]"#,
            Hash::ZERO
        );
        fs::write(index.path(), json).unwrap();

        assert!(matches!(index.load(), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());
        fs::write(
            index.path(),
            r#"[{"id":"a","timestamp":"2024-01-01T00:00:00Z","filesChanged":1}]"#,
        )
        .unwrap();

        assert!(matches!(index.load(), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path());
        let mut a = record_at(1, "a");
        let mut b = record_at(2, "b");
        a.id = "same".to_string();
        b.id = "same".to_string();
        fs::write(index.path(), serde_json::to_string(&vec![a, b]).unwrap()).unwrap();

        assert!(matches!(index.load(), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_held_lock_is_write_conflict() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path()).with_lock_timeout(Duration::from_millis(30));

        let _held = index.lock().unwrap();
        let result = index.append(record_at(1, "blocked"));
        assert!(matches!(result, Err(Error::IndexWriteConflict(_))));
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let dir = tempdir().unwrap();
        let index = CheckpointIndex::new(dir.path()).with_lock_timeout(Duration::from_secs(10));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = index.clone();
                std::thread::spawn(move || index.append(record_at(i, &format!("r{i}"))).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.load().unwrap().len(), 8);
    }
}
