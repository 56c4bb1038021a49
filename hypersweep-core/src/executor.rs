//! Run execution — launches the external trainer for one run config.
//!
//! Each run gets its own directory under the output root, named by the
//! config's short hash. The resolved config is written there before launch,
//! and the trainer's stdout/stderr are redirected straight into files so
//! output survives a timeout kill.

use crate::config::{ArgStyle, BoolStyle, ExecutionSettings, SweepSettings, TrainerSettings};
use crate::error::{ResourceError, RunExecutionError};
use crate::metrics::{self, BEST_VAL_LOSS_FILE, RunMetrics};
use crate::persistence::atomic_write_json;
use crate::record::RunOutcome;
use crate::sweep::{ParamValue, RunConfig};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Resolved configuration written into every run directory.
pub const CONFIG_FILE: &str = "config.json";
pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";

/// Directory for a run under the output root.
pub fn run_dir(root: &Path, run: &RunConfig) -> PathBuf {
    root.join(run.short_id())
}

/// Executes a single run to a terminal outcome.
///
/// Implementations never return an error: failures are folded into the
/// outcome so one bad run cannot abort the sweep.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, run: &RunConfig, root: &Path) -> RunOutcome;
}

/// Executor that launches the trainer as a child process.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    trainer: TrainerSettings,
    execution: ExecutionSettings,
}

impl ProcessExecutor {
    pub fn new(settings: &SweepSettings) -> Self {
        let launch_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut trainer = settings.trainer.clone();
        trainer.program = absolutize(&trainer.program, &launch_dir, true);
        trainer.args = trainer
            .args
            .iter()
            .map(|a| absolutize(a, &launch_dir, false))
            .collect();
        Self {
            trainer,
            execution: settings.execution.clone(),
        }
    }

    /// Trainer argv (after the program) for a run.
    pub fn build_args(&self, run: &RunConfig, run_dir: &Path) -> Vec<String> {
        let mut args = self.trainer.args.clone();

        match self.trainer.arg_style {
            ArgStyle::Flags => {
                for p in run.params() {
                    match (&p.value, self.trainer.bool_style) {
                        (ParamValue::Bool(true), BoolStyle::Switch) => {
                            args.push(format!("--{}", p.name));
                        }
                        (ParamValue::Bool(false), BoolStyle::Switch) => {
                            args.push(format!("--no-{}", p.name));
                        }
                        (value, _) => {
                            args.push(format!("--{}", p.name));
                            args.push(value.to_string());
                        }
                    }
                }
            }
            ArgStyle::ConfigFile => {
                args.push(self.trainer.config_flag.clone());
                args.push(run_dir.join(CONFIG_FILE).display().to_string());
            }
        }

        if !self.trainer.output_dir_flag.is_empty() {
            args.push(format!("--{}", self.trainer.output_dir_flag));
            args.push(run_dir.display().to_string());
        }
        args
    }

    fn prepare(&self, run: &RunConfig, run_dir: &Path) -> Result<(), RunExecutionError> {
        let workdir_err = |e: std::io::Error| RunExecutionError::Workdir {
            path: run_dir.to_path_buf(),
            message: e.to_string(),
        };
        std::fs::create_dir_all(run_dir).map_err(workdir_err)?;
        atomic_write_json(&run_dir.join(CONFIG_FILE), &run.to_json_object()).map_err(workdir_err)
    }

    async fn attempt(&self, run: &RunConfig, run_dir: &Path) -> Result<RunMetrics, RunExecutionError> {
        let workdir_err = |e: std::io::Error| RunExecutionError::Workdir {
            path: run_dir.to_path_buf(),
            message: e.to_string(),
        };
        self.clear_metrics(run_dir).map_err(workdir_err)?;
        let stdout_path = run_dir.join(STDOUT_LOG);
        let stderr_path = run_dir.join(STDERR_LOG);
        let stdout = std::fs::File::create(&stdout_path).map_err(workdir_err)?;
        let stderr = std::fs::File::create(&stderr_path).map_err(workdir_err)?;

        let args = self.build_args(run, run_dir);
        debug!(run_id = run.short_id(), program = %self.trainer.program, ?args, "Launching trainer");

        let mut command = Command::new(&self.trainer.program);
        command
            .args(&args)
            .envs(&self.trainer.env)
            .current_dir(run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        // Own process group, so a timeout can take down the trainer's workers too.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(|e| RunExecutionError::Spawn {
            program: self.trainer.program.clone(),
            message: e.to_string(),
        })?;

        let waited = match self.execution.timeout() {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(res) => res,
                Err(_) => {
                    if let Err(e) = kill_run(&mut child).await {
                        warn!(run_id = run.short_id(), error = %e, "Failed to kill timed-out trainer");
                    }
                    return Err(ResourceError::Timeout {
                        timeout_secs: limit.as_secs(),
                    }
                    .into());
                }
            },
            None => child.wait().await,
        };
        let status = waited.map_err(|e| RunExecutionError::Spawn {
            program: self.trainer.program.clone(),
            message: e.to_string(),
        })?;

        if !status.success() {
            let stderr_tail = tail_lines(&stderr_path, self.execution.stderr_tail_lines);
            return Err(match status.code() {
                Some(code) if Some(code) == self.execution.resource_unavailable_exit_code => {
                    ResourceError::Unavailable { code, stderr_tail }.into()
                }
                Some(code) => RunExecutionError::ExitCode { code, stderr_tail },
                None => RunExecutionError::Terminated { stderr_tail },
            });
        }

        let stdout_text = std::fs::read_to_string(&stdout_path).unwrap_or_default();
        let metrics = metrics::collect(run_dir, &self.trainer.metrics_file, &stdout_text);
        if metrics.is_empty() {
            warn!(run_id = run.short_id(), "Trainer succeeded but reported no metrics");
        }
        Ok(metrics)
    }

    /// Remove metrics left by an earlier attempt or sweep in a reused run dir.
    fn clear_metrics(&self, run_dir: &Path) -> std::io::Result<()> {
        for name in [self.trainer.metrics_file.as_str(), BEST_VAL_LOSS_FILE] {
            if name.is_empty() {
                continue;
            }
            match std::fs::remove_file(run_dir.join(name)) {
                Ok(()) => debug!(file = name, "Removed stale metrics"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Kill the trainer's whole process group, then the child itself.
async fn kill_run(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // Negative pid addresses the group led by the child.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
    }
    child.kill().await
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, run: &RunConfig, root: &Path) -> RunOutcome {
        let started = Instant::now();
        let dir = run_dir(root, run);

        if let Err(e) = self.prepare(run, &dir) {
            return RunOutcome::failed(e.to_string(), 0, started.elapsed().as_secs_f64());
        }

        let max_attempts = 1 + self.execution.max_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(run, &dir).await {
                Ok(metrics) => {
                    info!(run_id = run.short_id(), attempt, "Trainer finished");
                    return RunOutcome::succeeded(metrics, attempt, started.elapsed().as_secs_f64());
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        run_id = run.short_id(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transient trainer failure, retrying"
                    );
                    tokio::time::sleep(self.execution.retry_delay()).await;
                }
                Err(e) => {
                    warn!(run_id = run.short_id(), attempt, error = %e, "Trainer failed");
                    return RunOutcome::failed(e.to_string(), attempt, started.elapsed().as_secs_f64());
                }
            }
        }
    }
}

/// Resolve a relative path that exists under `base` so it survives the
/// trainer running inside its run directory. Bare program names are left for
/// `PATH` lookup.
fn absolutize(arg: &str, base: &Path, is_program: bool) -> String {
    if arg.starts_with('-') {
        return arg.to_string();
    }
    let path = Path::new(arg);
    if is_program && path.components().count() < 2 {
        return arg.to_string();
    }
    if path.is_relative() && base.join(path).exists() {
        return base.join(path).display().to_string();
    }
    arg.to_string()
}

/// Last `n` lines of a log file; empty if unreadable.
fn tail_lines(path: &Path, n: usize) -> String {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
