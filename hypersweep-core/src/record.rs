//! Run lifecycle records.

use crate::metrics::RunMetrics;
use crate::sweep::RunConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the executor reports back for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_secs: f64,
}

impl RunOutcome {
    pub fn succeeded(metrics: RunMetrics, attempts: u32, duration_secs: f64) -> Self {
        Self {
            status: RunStatus::Succeeded,
            metrics: Some(metrics),
            error: None,
            attempts,
            duration_secs,
        }
    }

    pub fn failed(error: impl Into<String>, attempts: u32, duration_secs: f64) -> Self {
        Self {
            status: RunStatus::Failed,
            metrics: None,
            error: Some(error.into()),
            attempts,
            duration_secs,
        }
    }
}

/// A run configuration plus its lifecycle state; the unit persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Position in the expanded sweep.
    pub index: usize,
    pub config: RunConfig,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn pending(index: usize, config: RunConfig) -> Self {
        Self {
            index,
            config,
            status: RunStatus::Pending,
            metrics: None,
            error: None,
            attempts: 0,
            duration_secs: None,
            updated_at: Utc::now(),
        }
    }

    /// Content hash of the underlying config; the store key.
    pub fn id(&self) -> &str {
        self.config.id()
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, outcome: RunOutcome) {
        self.status = outcome.status;
        self.metrics = outcome.metrics;
        self.error = outcome.error;
        self.attempts = outcome.attempts;
        self.duration_secs = Some(outcome.duration_secs);
        self.updated_at = Utc::now();
    }

    /// Mark as skipped, carrying over results from a prior successful record.
    pub fn skip_from(&mut self, prior: &RunRecord) {
        self.status = RunStatus::Skipped;
        self.metrics = prior.metrics.clone();
        self.attempts = 0;
        self.duration_secs = prior.duration_secs;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::{Param, ParamValue};

    fn config() -> RunConfig {
        RunConfig::new(vec![Param::new("lr", ParamValue::Float(0.1))], None)
    }

    #[test]
    fn test_record_lifecycle() {
        let mut record = RunRecord::pending(0, config());
        assert_eq!(record.status, RunStatus::Pending);
        assert!(!record.status.is_terminal());

        record.mark_running();
        assert_eq!(record.status, RunStatus::Running);

        record.complete(RunOutcome::failed("exit 1", 1, 0.5));
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.status.is_terminal());
        assert_eq!(record.error.as_deref(), Some("exit 1"));
        assert_eq!(record.duration_secs, Some(0.5));
    }

    #[test]
    fn test_skip_carries_prior_metrics() {
        let mut prior = RunRecord::pending(0, config());
        let metrics = RunMetrics {
            eval_loss: Some(1.25),
            ..Default::default()
        };
        prior.complete(RunOutcome::succeeded(metrics.clone(), 1, 3.0));

        let mut record = RunRecord::pending(0, config());
        record.skip_from(&prior);
        assert_eq!(record.status, RunStatus::Skipped);
        assert_eq!(record.metrics, Some(metrics));
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let mut record = RunRecord::pending(4, config());
        record.complete(RunOutcome::succeeded(RunMetrics::default(), 2, 1.5));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"succeeded\""));
        let parsed: RunRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
