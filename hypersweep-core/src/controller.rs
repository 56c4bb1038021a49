//! Sweep controller — drives every run config to a terminal state.
//!
//! The controller is the only writer to the result store. Runs execute on
//! tokio tasks held in a `JoinSet` with at most `concurrency` in flight; their
//! outcomes come back to the controller, which records them. Completion order
//! never affects the summary, which is indexed by submission position.

use crate::error::SweepError;
use crate::executor::Executor;
use crate::record::{RunOutcome, RunRecord, RunStatus};
use crate::store::ResultStore;
use crate::summary::{SweepSession, SweepSummary};
use crate::sweep::{ConfigModel, Expansion, expand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Scheduling options for one sweep invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Worker pool size; 1 is fully sequential.
    pub concurrency: usize,
    /// Skip runs whose identical config already succeeded in the store.
    pub resume: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            resume: false,
        }
    }
}

/// Orchestrates a sweep over an output root.
pub struct SweepController<E: Executor + 'static> {
    executor: Arc<E>,
    store: ResultStore,
    root: PathBuf,
    options: ControllerOptions,
}

impl<E: Executor + 'static> SweepController<E> {
    /// Open the result store under `root` and prepare a controller.
    pub fn new(executor: E, root: &Path, options: ControllerOptions) -> Result<Self, SweepError> {
        let store = ResultStore::open(root)?;
        Ok(Self {
            executor: Arc::new(executor),
            store,
            root: root.to_path_buf(),
            options: ControllerOptions {
                concurrency: options.concurrency.max(1),
                ..options
            },
        })
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expand `model` and run the whole sweep.
    pub async fn run(&mut self, model: &ConfigModel) -> Result<SweepSummary, SweepError> {
        let expansion = expand(model);
        self.run_expansion(&model.content_hash(), expansion).await
    }

    /// Run an already-expanded sweep.
    pub async fn run_expansion(
        &mut self,
        sweep_hash: &str,
        expansion: Expansion,
    ) -> Result<SweepSummary, SweepError> {
        let session = self.start_session(sweep_hash, expansion.len())?;
        let duplicates = expansion.duplicates.len();

        let mut records: Vec<RunRecord> = expansion
            .runs
            .into_iter()
            .enumerate()
            .map(|(i, config)| RunRecord::pending(i, config))
            .collect();

        let mut in_flight: JoinSet<RunOutcome> = JoinSet::new();
        let mut task_index: HashMap<tokio::task::Id, usize> = HashMap::new();
        let mut next = 0;

        loop {
            while in_flight.len() < self.options.concurrency && next < records.len() {
                let index = next;
                next += 1;

                if self.try_skip(&mut records[index]) {
                    continue;
                }

                records[index].mark_running();
                self.store.record(&records[index])?;
                info!(
                    index,
                    run_id = records[index].config.short_id(),
                    label = %records[index].config.label(),
                    "Starting run"
                );

                let executor = Arc::clone(&self.executor);
                let config = records[index].config.clone();
                let root = self.root.clone();
                let handle = in_flight.spawn(async move { executor.execute(&config, &root).await });
                task_index.insert(handle.id(), index);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };
            let (index, outcome) = match joined {
                Ok((id, outcome)) => (task_index.remove(&id), outcome),
                Err(e) => {
                    error!(error = %e, "Run task aborted");
                    let outcome = RunOutcome::failed(format!("run task aborted: {e}"), 0, 0.0);
                    (task_index.remove(&e.id()), outcome)
                }
            };
            let Some(index) = index else {
                continue;
            };

            records[index].complete(outcome);
            self.store.record(&records[index])?;
            let record = &records[index];
            match record.status {
                RunStatus::Succeeded => info!(
                    index,
                    run_id = record.config.short_id(),
                    duration_secs = record.duration_secs,
                    "Run succeeded"
                ),
                _ => warn!(
                    index,
                    run_id = record.config.short_id(),
                    error = record.error.as_deref().unwrap_or(""),
                    "Run failed"
                ),
            }
        }

        self.store.compact()?;
        let summary = SweepSummary::build(session, records, duplicates);
        summary.save(&self.root)?;
        info!(
            succeeded = summary.counts.succeeded,
            failed = summary.counts.failed,
            skipped = summary.counts.skipped,
            "Sweep finished"
        );
        Ok(summary)
    }

    fn start_session(&self, sweep_hash: &str, run_count: usize) -> Result<SweepSession, SweepError> {
        if self.options.resume {
            if let Some(prior) = SweepSession::load(&self.root)? {
                if prior.sweep_hash != sweep_hash {
                    warn!(
                        prior = %prior.sweep_hash,
                        current = %sweep_hash,
                        "Resuming into an output root created by a different sweep document"
                    );
                }
            }
        }
        let session = SweepSession::new(sweep_hash, &self.root, run_count, self.options.resume);
        session.save()?;
        info!(
            session_id = %session.id,
            runs = run_count,
            concurrency = self.options.concurrency,
            resume = self.options.resume,
            "Sweep session started"
        );
        Ok(session)
    }

    /// PENDING -> SKIPPED when resuming and the store holds a success for this
    /// exact config. RUNNING and FAILED entries are re-executed.
    fn try_skip(&self, record: &mut RunRecord) -> bool {
        if !self.options.resume {
            return false;
        }
        match self.store.lookup(record.id()) {
            Some(prior) if prior.status == RunStatus::Succeeded => {
                record.skip_from(prior);
                info!(
                    index = record.index,
                    run_id = record.config.short_id(),
                    "Skipping run already completed"
                );
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RunMetrics;
    use crate::sweep::{ParamValue, RunConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Fails any run whose `fail` parameter is true; sleeps longer for
    /// earlier indices so completion order differs from submission order.
    struct MockExecutor {
        calls: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
    }

    impl MockExecutor {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                active: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Executor for MockExecutor {
        async fn execute(&self, run: &RunConfig, _root: &Path) -> RunOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = match run.get("delay") {
                Some(ParamValue::Int(ms)) => *ms as u64,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if run.get("fail") == Some(&ParamValue::Bool(true)) {
                return RunOutcome::failed("exit 1", 1, 0.0);
            }
            let metrics = RunMetrics {
                eval_loss: Some(delay as f64),
                ..Default::default()
            };
            RunOutcome::succeeded(metrics, 1, 0.0)
        }
    }

    fn model(doc: &str) -> ConfigModel {
        doc.parse().unwrap()
    }

    #[tokio::test]
    async fn test_failed_run_does_not_abort_sweep() {
        let dir = TempDir::new().unwrap();
        let exec = MockExecutor::new();
        let calls = exec.calls.clone();
        let mut controller =
            SweepController::new(exec, dir.path(), ControllerOptions::default()).unwrap();

        let summary = controller
            .run(&model("fail: [true, false]\nlr: [0.1, 0.2]\n"))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(summary.counts.failed, 2);
        assert_eq!(summary.counts.succeeded, 2);
        assert_eq!(summary.records[0].status, RunStatus::Failed);
        assert_eq!(summary.records[3].status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_resume_skips_completed_runs() {
        let dir = TempDir::new().unwrap();
        let m = model("lr: [0.1, 0.01]\nbatch: 8\nparameter_groups:\n  - variant: [a, b]\n");

        let mut first =
            SweepController::new(MockExecutor::new(), dir.path(), ControllerOptions::default())
                .unwrap();
        let summary = first.run(&m).await.unwrap();
        assert_eq!(summary.counts.succeeded, 4);

        let exec = MockExecutor::new();
        let calls = exec.calls.clone();
        let options = ControllerOptions {
            resume: true,
            ..Default::default()
        };
        let mut second = SweepController::new(exec, dir.path(), options).unwrap();
        let summary = second.run(&m).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.counts.skipped, 4);
        assert_eq!(second.store().len(), 4);
        assert!(
            second
                .store()
                .records()
                .iter()
                .all(|r| r.status == RunStatus::Succeeded)
        );
    }

    #[tokio::test]
    async fn test_resume_reruns_failed_and_interrupted() {
        let dir = TempDir::new().unwrap();
        let m = model("fail: [true, false]\n");

        let mut first =
            SweepController::new(MockExecutor::new(), dir.path(), ControllerOptions::default())
                .unwrap();
        first.run(&m).await.unwrap();

        let exec = MockExecutor::new();
        let calls = exec.calls.clone();
        let options = ControllerOptions {
            resume: true,
            ..Default::default()
        };
        let mut second = SweepController::new(exec, dir.path(), options).unwrap();
        let summary = second.run(&m).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.counts.skipped, 1);
        assert_eq!(summary.counts.failed, 1);
    }

    #[tokio::test]
    async fn test_without_resume_everything_reruns() {
        let dir = TempDir::new().unwrap();
        let m = model("lr: [0.1, 0.2]\n");
        let mut first =
            SweepController::new(MockExecutor::new(), dir.path(), ControllerOptions::default())
                .unwrap();
        first.run(&m).await.unwrap();

        let exec = MockExecutor::new();
        let calls = exec.calls.clone();
        let mut second =
            SweepController::new(exec, dir.path(), ControllerOptions::default()).unwrap();
        second.run(&m).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.store().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_summary_keeps_submission_order() {
        let dir = TempDir::new().unwrap();
        let exec = MockExecutor::new();
        let peak = exec.peak.clone();
        let options = ControllerOptions {
            concurrency: 3,
            resume: false,
        };
        let mut controller = SweepController::new(exec, dir.path(), options).unwrap();
        let summary = controller
            .run(&model("delay: [60, 40, 20, 0, 10]\n"))
            .await
            .unwrap();

        let delays: Vec<String> = summary
            .records
            .iter()
            .map(|r| r.config.get("delay").unwrap().to_string())
            .collect();
        assert_eq!(delays, vec!["60", "40", "20", "0", "10"]);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(summary.best_index, Some(3));
        assert!(dir.path().join(crate::summary::SUMMARY_FILE).exists());
    }

    #[tokio::test]
    async fn test_duplicates_counted_in_summary() {
        let dir = TempDir::new().unwrap();
        let mut controller =
            SweepController::new(MockExecutor::new(), dir.path(), ControllerOptions::default())
                .unwrap();
        let summary = controller
            .run(&model("lr: 0.1\nparameter_groups:\n  - q: [1]\n  - q: [1]\n"))
            .await
            .unwrap();
        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.duplicates_skipped, 1);
    }
}
