//! Sweep specification and combination expansion.

pub mod expand;
pub mod model;
pub mod run_config;

pub use expand::{DuplicateRun, Expansion, expand};
pub use model::{ConfigModel, GROUPS_KEY, ParameterGroup, ParameterSpec};
pub use run_config::{Param, ParamValue, RunConfig};
