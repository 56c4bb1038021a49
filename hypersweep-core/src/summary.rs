//! Sweep session identity and the final summary report.

use crate::persistence::{atomic_write_json, load_json};
use crate::record::{RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SESSION_FILE: &str = "session.json";
pub const SUMMARY_FILE: &str = "summary.json";

/// One invocation of the orchestrator against an output root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSession {
    pub id: String,
    /// Content hash of the sweep document's model.
    pub sweep_hash: String,
    pub output_root: PathBuf,
    pub run_count: usize,
    pub resumed: bool,
    pub started_at: DateTime<Utc>,
}

impl SweepSession {
    pub fn new(sweep_hash: &str, output_root: &Path, run_count: usize, resumed: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sweep_hash: sweep_hash.to_string(),
            output_root: output_root.to_path_buf(),
            run_count,
            resumed,
            started_at: Utc::now(),
        }
    }

    pub fn load(root: &Path) -> std::io::Result<Option<Self>> {
        load_json(&root.join(SESSION_FILE))
    }

    pub fn save(&self) -> std::io::Result<()> {
        atomic_write_json(&self.output_root.join(SESSION_FILE), self)
    }
}

/// Per-status run counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub running: usize,
    pub pending: usize,
}

impl StatusCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a RunRecord>) -> Self {
        let mut counts = Self::default();
        for r in records {
            match r.status {
                RunStatus::Succeeded => counts.succeeded += 1,
                RunStatus::Failed => counts.failed += 1,
                RunStatus::Skipped => counts.skipped += 1,
                RunStatus::Running => counts.running += 1,
                RunStatus::Pending => counts.pending += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.running + self.pending
    }
}

/// Final report: every run in submission order plus aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub session: SweepSession,
    pub counts: StatusCounts,
    /// Submission index of the run with the lowest eval (or final) loss.
    pub best_index: Option<usize>,
    pub duplicates_skipped: usize,
    pub records: Vec<RunRecord>,
    pub finished_at: DateTime<Utc>,
}

impl SweepSummary {
    /// Build from records; they are re-sorted by submission index.
    pub fn build(session: SweepSession, mut records: Vec<RunRecord>, duplicates_skipped: usize) -> Self {
        records.sort_by_key(|r| r.index);
        let counts = StatusCounts::tally(&records);
        let best_index = best_run(&records).map(|r| r.index);
        Self {
            session,
            counts,
            best_index,
            duplicates_skipped,
            records,
            finished_at: Utc::now(),
        }
    }

    pub fn best(&self) -> Option<&RunRecord> {
        let index = self.best_index?;
        self.records.iter().find(|r| r.index == index)
    }

    pub fn save(&self, root: &Path) -> std::io::Result<()> {
        atomic_write_json(&root.join(SUMMARY_FILE), self)
    }

    pub fn load(root: &Path) -> std::io::Result<Option<Self>> {
        load_json(&root.join(SUMMARY_FILE))
    }
}

/// Lowest-scoring run among those with results (succeeded or skipped).
fn best_run(records: &[RunRecord]) -> Option<&RunRecord> {
    records
        .iter()
        .filter(|r| matches!(r.status, RunStatus::Succeeded | RunStatus::Skipped))
        .filter_map(|r| r.metrics.as_ref().and_then(|m| m.score()).map(|s| (r, s)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(r, _)| r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RunMetrics;
    use crate::record::RunOutcome;
    use crate::sweep::{Param, ParamValue, RunConfig};
    use tempfile::TempDir;

    fn record(index: usize, eval: Option<f64>, ok: bool) -> RunRecord {
        let config = RunConfig::new(vec![Param::new("i", ParamValue::Int(index as i64))], None);
        let mut r = RunRecord::pending(index, config);
        if ok {
            let metrics = RunMetrics {
                eval_loss: eval,
                ..Default::default()
            };
            r.complete(RunOutcome::succeeded(metrics, 1, 1.0));
        } else {
            r.complete(RunOutcome::failed("boom", 1, 1.0));
        }
        r
    }

    #[test]
    fn test_summary_orders_by_index_and_picks_best() {
        let dir = TempDir::new().unwrap();
        let session = SweepSession::new("abc", dir.path(), 3, false);
        let records = vec![
            record(2, Some(0.5), true),
            record(0, Some(0.9), true),
            record(1, None, false),
        ];
        let summary = SweepSummary::build(session, records, 1);

        let order: Vec<usize> = summary.records.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(summary.counts.succeeded, 2);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.counts.total(), 3);
        assert_eq!(summary.best_index, Some(2));
        assert_eq!(summary.best().unwrap().index, 2);
    }

    #[test]
    fn test_summary_save_and_load() {
        let dir = TempDir::new().unwrap();
        let session = SweepSession::new("abc", dir.path(), 1, false);
        session.save().unwrap();
        let summary = SweepSummary::build(session.clone(), vec![record(0, Some(1.0), true)], 0);
        summary.save(dir.path()).unwrap();

        assert_eq!(SweepSession::load(dir.path()).unwrap(), Some(session));
        let loaded = SweepSummary::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.best_index, Some(0));
    }

    #[test]
    fn test_no_best_without_scores() {
        let dir = TempDir::new().unwrap();
        let session = SweepSession::new("abc", dir.path(), 1, false);
        let summary = SweepSummary::build(session, vec![record(0, None, false)], 0);
        assert!(summary.best().is_none());
    }
}
