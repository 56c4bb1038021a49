//! Scalar parameter values and fully resolved run configurations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of the hash prefix used for run directory names.
const SHORT_ID_LEN: usize = 16;

/// A single scalar hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Coarse value kind used for override compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Number,
    String,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
        }
    }
}

impl ParamValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) | Self::Float(_) => ValueKind::Number,
            Self::Str(_) => ValueKind::String,
        }
    }

    /// Type-tagged rendering used for identity hashing and duplicate checks.
    ///
    /// `Int(1)` and `Float(1.0)` render differently on purpose.
    pub fn canonical(&self) -> String {
        match self {
            Self::Bool(b) => format!("b:{b}"),
            Self::Int(i) => format!("i:{i}"),
            Self::Float(f) => format!("f:{f:?}"),
            Self::Str(s) => format!("s:{s}"),
        }
    }

    /// Convert a YAML scalar into a parameter value.
    pub(crate) fn from_yaml(value: &serde_yaml::Value) -> Result<Self, String> {
        use serde_yaml::Value;

        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if n.is_u64() {
                    Err(format!("integer {n} does not fit in i64"))
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_nan() => Err("NaN is not a valid candidate".into()),
                        Some(f) if f.is_infinite() => {
                            Err(format!("{f} is not a valid candidate; values must be finite"))
                        }
                        Some(f) => Ok(Self::Float(f)),
                        None => Err(format!("unrepresentable number {n}")),
                    }
                }
            }
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Null => Err("null is not a valid candidate".into()),
            Value::Sequence(_) => Err("nested lists are not supported".into()),
            Value::Mapping(_) => Err("nested mappings are not supported".into()),
            Value::Tagged(t) => Err(format!("tagged value {} is not supported", t.tag)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part (`1.0`, not `1`) so floats stay floats downstream.
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// One resolved `name = value` entry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

impl Param {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A fully resolved, immutable set of hyperparameters for one trainer invocation.
///
/// Entries keep their declaration order (base parameters first, then
/// group-only parameters). Identity ignores that order: two configs with the
/// same key/value mapping share an id regardless of which group produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    id: String,
    group: Option<usize>,
    params: Vec<Param>,
}

impl RunConfig {
    pub fn new(params: Vec<Param>, group: Option<usize>) -> Self {
        let id = content_hash(&params);
        Self { id, group, params }
    }

    /// Full SHA-256 content hash (hex).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hash prefix used as the run directory name.
    pub fn short_id(&self) -> &str {
        &self.id[..SHORT_ID_LEN.min(self.id.len())]
    }

    /// Index of the parameter group this run was drawn from, if any.
    pub fn group(&self) -> Option<usize> {
        self.group
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Human-readable label, e.g. `lr-0.1_batch-8_variant-a`.
    pub fn label(&self) -> String {
        self.params
            .iter()
            .map(|p| format!("{}-{}", p.name, p.value))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Flattened JSON object written next to the run's outputs.
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.value.to_json()))
            .collect()
    }
}

fn content_hash(params: &[Param]) -> String {
    let mut sorted: Vec<&Param> = params.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    for p in sorted {
        hasher.update(p.name.as_bytes());
        hasher.update(b"=");
        hasher.update(p.value.canonical().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
