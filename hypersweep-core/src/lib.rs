//! # hypersweep-core
//!
//! Hyperparameter-sweep orchestration for an external training program.
//!
//! A sweep document declares base hyperparameters (scalars or candidate lists)
//! and optional `parameter_groups`, mutually exclusive override sets. The
//! pipeline is:
//!
//! 1. [`sweep::ConfigModel`] parses and validates the document.
//! 2. [`sweep::expand`] produces the ordered, de-duplicated [`sweep::RunConfig`]s.
//! 3. [`controller::SweepController`] schedules them on a bounded worker pool,
//!    skipping configs that already succeeded when resuming.
//! 4. [`executor::ProcessExecutor`] launches the trainer per run with timeout
//!    and retry handling.
//! 5. [`store::ResultStore`] durably records every state transition, and a
//!    [`summary::SweepSummary`] is written at the end.

pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod persistence;
pub mod record;
pub mod store;
pub mod summary;
pub mod sweep;

pub use config::{SweepSettings, load_settings};
pub use controller::{ControllerOptions, SweepController};
pub use error::{ConfigError, ResourceError, RunExecutionError, StoreError, SweepError};
pub use executor::{Executor, ProcessExecutor};
pub use metrics::RunMetrics;
pub use record::{RunOutcome, RunRecord, RunStatus};
pub use store::ResultStore;
pub use summary::{SweepSession, SweepSummary};
pub use sweep::{ConfigModel, Expansion, ParamValue, RunConfig, expand};
