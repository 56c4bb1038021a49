//! Orchestrator settings.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit/local settings file -> environment. CLI flags are applied on top
//! of the extracted settings by the caller. The sweep
//! document itself (what to run) is separate; these settings describe how to
//! invoke the trainer and how to schedule runs.

use crate::error::SettingsError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file name looked up in the user config dir and the working directory.
pub const SETTINGS_FILE: &str = "hypersweep.toml";

/// Environment variable prefix (`HYPERSWEEP_EXECUTION__CONCURRENCY=4`).
pub const ENV_PREFIX: &str = "HYPERSWEEP_";

/// Top-level orchestrator settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {
    #[serde(default)]
    pub trainer: TrainerSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

/// How run configs are handed to the trainer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgStyle {
    /// `--key value` per parameter.
    #[default]
    Flags,
    /// Pass the path of the resolved `config.json` via `config_flag`.
    ConfigFile,
}

/// Rendering of boolean parameters in flag mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolStyle {
    /// `--key` / `--no-key`.
    #[default]
    Switch,
    /// `--key true` / `--key false`.
    Value,
}

/// External trainer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerSettings {
    /// Executable to launch.
    #[serde(default = "default_program")]
    pub program: String,
    /// Fixed leading arguments, e.g. the training script path.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub arg_style: ArgStyle,
    #[serde(default)]
    pub bool_style: BoolStyle,
    #[serde(default = "default_config_flag")]
    pub config_flag: String,
    /// Flag receiving the run directory. Empty disables it.
    #[serde(default = "default_output_dir_flag")]
    pub output_dir_flag: String,
    /// JSON metrics file the trainer may write into its run directory.
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    /// When non-empty, sweep documents may only use these parameter names.
    #[serde(default)]
    pub known_parameters: Vec<String>,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            env: BTreeMap::new(),
            arg_style: ArgStyle::default(),
            bool_style: BoolStyle::default(),
            config_flag: default_config_flag(),
            output_dir_flag: default_output_dir_flag(),
            metrics_file: default_metrics_file(),
            known_parameters: Vec::new(),
        }
    }
}

fn default_program() -> String {
    "python3".into()
}

fn default_args() -> Vec<String> {
    vec!["train.py".into()]
}

fn default_config_flag() -> String {
    "--config".into()
}

fn default_output_dir_flag() -> String {
    "out_dir".into()
}

fn default_metrics_file() -> String {
    "metrics.json".into()
}

/// Scheduling, timeout and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Worker pool size. 1 runs the sweep sequentially.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-attempt wall-clock limit. `None` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra attempts for transient failures.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Exit code the trainer uses to signal "resources unavailable, try later".
    #[serde(default = "default_unavailable_code")]
    pub resource_unavailable_exit_code: Option<i32>,
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: None,
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            resource_unavailable_exit_code: default_unavailable_code(),
            stderr_tail_lines: default_stderr_tail_lines(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_unavailable_code() -> Option<i32> {
    // EX_TEMPFAIL from sysexits.h
    Some(75)
}

fn default_stderr_tail_lines() -> usize {
    20
}

impl ExecutionSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl SweepSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.execution.concurrency == 0 {
            return Err(SettingsError::Invalid {
                message: "execution.concurrency must be at least 1".into(),
            });
        }
        if self.trainer.program.trim().is_empty() {
            return Err(SettingsError::Invalid {
                message: "trainer.program must not be empty".into(),
            });
        }
        if self.execution.timeout_secs == Some(0) {
            return Err(SettingsError::Invalid {
                message: "execution.timeout_secs must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Path of the per-user settings file, if a config dir can be resolved.
pub fn user_settings_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "hypersweep", "hypersweep")
        .map(|d| d.config_dir().join(SETTINGS_FILE))
}

/// Load settings from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `HYPERSWEEP_`)
/// 2. `settings_file`, or `./hypersweep.toml` when none is given
/// 3. User config (`~/.config/hypersweep/hypersweep.toml`)
/// 4. Built-in defaults
pub fn load_settings(settings_file: Option<&Path>) -> Result<SweepSettings, SettingsError> {
    let mut figment = Figment::from(Serialized::defaults(SweepSettings::default()));

    if let Some(user) = user_settings_path() {
        if user.exists() {
            figment = figment.merge(Toml::file(&user));
        }
    }

    match settings_file {
        Some(path) => {
            if !path.exists() {
                return Err(SettingsError::Invalid {
                    message: format!("settings file {} not found", path.display()),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let local = Path::new(SETTINGS_FILE);
            if local.exists() {
                figment = figment.merge(Toml::file(local));
            }
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let settings: SweepSettings = figment.extract().map_err(Box::new)?;
    settings.validate()?;
    Ok(settings)
}

/// Resolve settings from TOML text layered over the defaults.
pub fn settings_from_toml(text: &str) -> Result<SweepSettings, SettingsError> {
    let settings: SweepSettings = Figment::from(Serialized::defaults(SweepSettings::default()))
        .merge(Toml::string(text))
        .extract()
        .map_err(Box::new)?;
    settings.validate()?;
    Ok(settings)
}
