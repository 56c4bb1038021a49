//! Append-only result log keyed by run config hash.
//!
//! Every `record` call appends one JSON line and syncs it before returning, so
//! a crash never loses an acknowledged transition. On open the log is replayed
//! and the last line per hash wins, which makes re-recording an overwrite.

use crate::error::StoreError;
use crate::persistence::{append_line_durable, atomic_write};
use crate::record::RunRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Log file name under the output root.
pub const RESULTS_FILE: &str = "results.jsonl";

/// Durable run-outcome store.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    records: HashMap<String, RunRecord>,
    /// Hashes in first-recorded order, for stable iteration.
    order: Vec<String>,
}

impl ResultStore {
    /// Open (or create) the store under `root`, replaying any existing log.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root).map_err(|source| StoreError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let path = root.join(RESULTS_FILE);
        let mut store = Self {
            path,
            records: HashMap::new(),
            order: Vec::new(),
        };
        if store.replay()? {
            // Rewrite so later appends don't land on the partial line.
            store.compact()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably record a run state. Re-recording a hash replaces its entry.
    pub fn record(&mut self, record: &RunRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        append_line_durable(&self.path, &line).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            run_id = record.config.short_id(),
            status = %record.status,
            "Recorded run state"
        );
        self.insert(record.clone());
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<&RunRecord> {
        self.records.get(id)
    }

    /// One record per hash, in first-recorded order.
    pub fn records(&self) -> Vec<&RunRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewrite the log with exactly one line per hash.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut buf = String::new();
        for record in self.records() {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        atomic_write(&self.path, buf.as_bytes()).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn insert(&mut self, record: RunRecord) {
        let id = record.id().to_string();
        if !self.records.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.records.insert(id, record);
    }

    /// Load the log into memory. Returns true when a torn final line was dropped.
    fn replay(&mut self) -> Result<bool, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let lines: Vec<&str> = text.lines().collect();
        let torn_tail = !text.is_empty() && !text.ends_with('\n');
        let mut dropped = false;
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(line) {
                Ok(record) => self.insert(record),
                Err(_) if torn_tail && i + 1 == lines.len() => {
                    warn!(path = %self.path.display(), "Ignoring torn final record");
                    dropped = true;
                }
                Err(source) => {
                    return Err(StoreError::Corrupt {
                        path: self.path.clone(),
                        line: i + 1,
                        source,
                    });
                }
            }
        }
        debug!(records = self.records.len(), "Replayed result log");
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RunMetrics;
    use crate::record::{RunOutcome, RunStatus};
    use crate::sweep::{Param, ParamValue, RunConfig};
    use tempfile::TempDir;

    fn record(index: usize, lr: f64) -> RunRecord {
        let config = RunConfig::new(vec![Param::new("lr", ParamValue::Float(lr))], None);
        RunRecord::pending(index, config)
    }

    #[test]
    fn test_record_and_lookup() {
        let dir = TempDir::new().unwrap();
        let mut store = ResultStore::open(dir.path()).unwrap();
        let r = record(0, 0.1);
        store.record(&r).unwrap();
        assert_eq!(store.lookup(r.id()).unwrap().status, RunStatus::Pending);
        assert!(store.lookup("missing").is_none());
    }

    #[test]
    fn test_rerecord_overwrites_by_hash() {
        let dir = TempDir::new().unwrap();
        let mut store = ResultStore::open(dir.path()).unwrap();
        let mut r = record(0, 0.1);
        store.record(&r).unwrap();
        r.mark_running();
        store.record(&r).unwrap();
        r.complete(RunOutcome::succeeded(RunMetrics::default(), 1, 0.1));
        store.record(&r).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.records().len(), 1);

        let reopened = ResultStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.lookup(r.id()).unwrap().status,
            RunStatus::Succeeded
        );
    }

    #[test]
    fn test_compact_leaves_one_line_per_hash() {
        let dir = TempDir::new().unwrap();
        let mut store = ResultStore::open(dir.path()).unwrap();
        let mut a = record(0, 0.1);
        let b = record(1, 0.2);
        store.record(&a).unwrap();
        store.record(&b).unwrap();
        a.mark_running();
        store.record(&a).unwrap();
        store.compact().unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        let reopened = ResultStore::open(dir.path()).unwrap();
        assert_eq!(reopened.records()[0].id(), a.id());
        assert_eq!(reopened.records()[0].status, RunStatus::Running);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = ResultStore::open(dir.path()).unwrap();
        store.record(&record(0, 0.1)).unwrap();
        drop(store);

        let path = dir.path().join(RESULTS_FILE);
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("{\"index\": 1, \"conf");
        std::fs::write(&path, text).unwrap();

        let mut reopened = ResultStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);

        reopened.record(&record(2, 0.3)).unwrap();
        drop(reopened);
        assert_eq!(ResultStore::open(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_middle_line_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RESULTS_FILE);
        let good = serde_json::to_string(&record(0, 0.1)).unwrap();
        std::fs::write(&path, format!("not json\n{good}\n")).unwrap();

        let err = ResultStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 1, .. }));
    }
}
