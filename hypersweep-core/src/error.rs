//! Error types for the hypersweep core library.
//!
//! Uses `thiserror` for structured error variants. Configuration and storage
//! failures abort a sweep; execution and resource failures are folded into the
//! affected run's record and never escape the controller.

use std::path::PathBuf;

/// Top-level error type for sweep orchestration.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Result store error: {0}")]
    Store(#[from] StoreError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while parsing or validating a sweep document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read sweep file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed sweep document: {message}")]
    Parse { message: String },

    #[error("Sweep document must be a mapping at the top level")]
    NotAMapping,

    #[error("`parameter_groups` must be a sequence of mappings")]
    InvalidGroups,

    #[error("Parameter group {index} is empty")]
    EmptyGroup { index: usize },

    #[error("Parameter '{name}' has no candidate values")]
    EmptyCandidates { name: String },

    #[error("Parameter '{name}' lists candidate {value} more than once")]
    DuplicateCandidate { name: String, value: String },

    #[error("Parameter '{name}' has an unsupported value: {reason}")]
    UnsupportedValue { name: String, reason: String },

    #[error("Parameter key must be a string, found {found}")]
    InvalidKey { found: String },

    #[error("Unknown parameter '{name}'")]
    UnknownParameter { name: String },

    #[error(
        "Parameter group {group} overrides '{name}' with a {found} value, but the base value is a {expected}"
    )]
    TypeMismatch {
        group: usize,
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Failure of a single trainer invocation. Recorded on the run, never fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RunExecutionError {
    #[error("Failed to launch trainer '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("Trainer exited with code {code}: {stderr_tail}")]
    ExitCode { code: i32, stderr_tail: String },

    #[error("Trainer terminated by signal: {stderr_tail}")]
    Terminated { stderr_tail: String },

    #[error("Failed to prepare run directory {path}: {message}")]
    Workdir { path: PathBuf, message: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Transient failures that the retry policy may absorb.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    #[error("Trainer timed out after {timeout_secs}s and was killed")]
    Timeout { timeout_secs: u64 },

    #[error("Trainer reported resources unavailable (exit {code}): {stderr_tail}")]
    Unavailable { code: i32, stderr_tail: String },
}

impl RunExecutionError {
    /// Whether the retry policy applies to this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Resource(_))
    }
}

/// Persistence failures. Fatal: resumability depends on durable records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt record at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from layered settings resolution.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("Invalid setting: {message}")]
    Invalid { message: String },
}

pub type Result<T, E = SweepError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = RunExecutionError::from(ResourceError::Timeout { timeout_secs: 5 });
        assert!(timeout.is_transient());

        let exit = RunExecutionError::ExitCode {
            code: 1,
            stderr_tail: "boom".into(),
        };
        assert!(!exit.is_transient());
    }

    #[test]
    fn test_config_error_wraps_into_sweep_error() {
        let err: SweepError = ConfigError::EmptyGroup { index: 2 }.into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Parameter group 2 is empty"
        );
    }
}
