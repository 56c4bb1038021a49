//! Typed sweep specification parsed from a YAML or JSON document.
//!
//! Top-level keys are base hyperparameters, each a scalar or a list of
//! candidates. The reserved `parameter_groups` key holds an ordered sequence
//! of mutually exclusive override sets.

use crate::error::ConfigError;
use crate::sweep::run_config::{ParamValue, ValueKind};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

/// Reserved top-level key holding the parameter groups.
pub const GROUPS_KEY: &str = "parameter_groups";

/// One named parameter and its ordered candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    name: String,
    candidates: Vec<ParamValue>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, candidates: Vec<ParamValue>) -> Result<Self, ConfigError> {
        let name = name.into();
        if candidates.is_empty() {
            return Err(ConfigError::EmptyCandidates { name });
        }
        let mut seen = HashSet::new();
        for c in &candidates {
            if let ParamValue::Float(f) = c {
                if !f.is_finite() {
                    return Err(ConfigError::UnsupportedValue {
                        name,
                        reason: format!("{f} is not a valid candidate; values must be finite"),
                    });
                }
            }
            if !seen.insert(c.canonical()) {
                return Err(ConfigError::DuplicateCandidate {
                    name,
                    value: c.to_string(),
                });
            }
        }
        Ok(Self { name, candidates })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &[ParamValue] {
        &self.candidates
    }

    /// True when the spec branches the sweep (more than one candidate).
    pub fn is_swept(&self) -> bool {
        self.candidates.len() > 1
    }

    fn kinds(&self) -> Vec<ValueKind> {
        let mut kinds: Vec<ValueKind> = Vec::new();
        for c in &self.candidates {
            if !kinds.contains(&c.kind()) {
                kinds.push(c.kind());
            }
        }
        kinds
    }
}

/// A bundle of parameter specs cross-combined together and merged over the base.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGroup {
    params: Vec<ParameterSpec>,
}

impl ParameterGroup {
    /// Emptiness is checked when the group is placed into a `ConfigModel`.
    pub fn new(params: Vec<ParameterSpec>) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// A parsed sweep specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigModel {
    base: Vec<ParameterSpec>,
    groups: Vec<ParameterGroup>,
}

impl ConfigModel {
    /// Build a model from already-typed parts, applying the same validation
    /// as document parsing.
    pub fn new(base: Vec<ParameterSpec>, groups: Vec<ParameterGroup>) -> Result<Self, ConfigError> {
        let model = Self { base, groups };
        model.check_groups()?;
        Ok(model)
    }

    /// Read and parse a sweep document from disk.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Parse from an already-loaded YAML value.
    pub fn from_yaml(doc: &Value) -> Result<Self, ConfigError> {
        let Value::Mapping(root) = doc else {
            return Err(ConfigError::NotAMapping);
        };

        let mut base = Vec::new();
        let mut groups = Vec::new();
        for (key, value) in root {
            let name = key_name(key)?;
            if name == GROUPS_KEY {
                groups = parse_groups(value)?;
            } else {
                base.push(parse_spec(name, value)?);
            }
        }

        Self::new(base, groups)
    }

    pub fn base(&self) -> &[ParameterSpec] {
        &self.base
    }

    pub fn groups(&self) -> &[ParameterGroup] {
        &self.groups
    }

    pub fn base_param(&self, name: &str) -> Option<&ParameterSpec> {
        self.base.iter().find(|p| p.name == name)
    }

    /// Reject any parameter not in `known`. An empty allowlist accepts everything.
    pub fn validate_known(&self, known: &[String]) -> Result<(), ConfigError> {
        if known.is_empty() {
            return Ok(());
        }
        let all = self
            .base
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.params.iter()));
        for spec in all {
            if !known.iter().any(|k| k == &spec.name) {
                return Err(ConfigError::UnknownParameter {
                    name: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Stable hash of the whole model; identifies a sweep session.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut feed = |section: &str, specs: &[ParameterSpec]| {
            hasher.update(section.as_bytes());
            hasher.update(b"\n");
            for spec in specs {
                hasher.update(spec.name.as_bytes());
                for c in &spec.candidates {
                    hasher.update(b"|");
                    hasher.update(c.canonical().as_bytes());
                }
                hasher.update(b"\n");
            }
        };
        feed("base", &self.base);
        for (i, group) in self.groups.iter().enumerate() {
            feed(&format!("group{i}"), &group.params);
        }
        format!("{:x}", hasher.finalize())
    }

    fn check_groups(&self) -> Result<(), ConfigError> {
        for (index, group) in self.groups.iter().enumerate() {
            if group.params.is_empty() {
                return Err(ConfigError::EmptyGroup { index });
            }
            for spec in &group.params {
                let Some(base) = self.base_param(&spec.name) else {
                    continue;
                };
                let expected = base.kinds();
                for c in &spec.candidates {
                    if !expected.contains(&c.kind()) {
                        return Err(ConfigError::TypeMismatch {
                            group: index,
                            name: spec.name.clone(),
                            expected: expected[0].as_str(),
                            found: c.kind().as_str(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigModel {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let doc: Value = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        Self::from_yaml(&doc)
    }
}

fn key_name(key: &Value) -> Result<&str, ConfigError> {
    match key {
        Value::String(s) => Ok(s.as_str()),
        other => Err(ConfigError::InvalidKey {
            found: format!("{other:?}"),
        }),
    }
}

fn parse_spec(name: &str, value: &Value) -> Result<ParameterSpec, ConfigError> {
    let raw: Vec<&Value> = match value {
        Value::Sequence(items) => items.iter().collect(),
        scalar => vec![scalar],
    };
    let candidates = raw
        .into_iter()
        .map(|v| {
            ParamValue::from_yaml(v).map_err(|reason| ConfigError::UnsupportedValue {
                name: name.to_string(),
                reason,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    ParameterSpec::new(name, candidates)
}

fn parse_groups(value: &Value) -> Result<Vec<ParameterGroup>, ConfigError> {
    let Value::Sequence(items) = value else {
        return Err(ConfigError::InvalidGroups);
    };
    items
        .iter()
        .map(|item| match item {
            Value::Mapping(map) => parse_group(map),
            _ => Err(ConfigError::InvalidGroups),
        })
        .collect()
}

fn parse_group(map: &Mapping) -> Result<ParameterGroup, ConfigError> {
    let params = map
        .iter()
        .map(|(k, v)| {
            let name = key_name(k)?;
            if name == GROUPS_KEY {
                return Err(ConfigError::InvalidGroups);
            }
            parse_spec(name, v)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParameterGroup { params })
}
