//! Combination expansion: `ConfigModel` -> ordered, de-duplicated `RunConfig`s.
//!
//! Ordering contract: base combinations form the outer loop, then groups in
//! declaration order, then each group's own combinations. Within a cartesian
//! product the first declared parameter varies slowest. Everything operates
//! on ordered slices, so repeated expansion of the same model is identical.

use crate::sweep::model::{ConfigModel, ParameterSpec};
use crate::sweep::run_config::{Param, RunConfig};
use std::collections::HashMap;
use tracing::warn;

/// A combination dropped because an identical config was already produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRun {
    pub id: String,
    /// Index (in the de-duplicated output) of the config it duplicates.
    pub first_index: usize,
    /// Group that produced the dropped combination.
    pub group: Option<usize>,
}

/// Result of expanding a sweep.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub runs: Vec<RunConfig>,
    pub duplicates: Vec<DuplicateRun>,
}

impl Expansion {
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Expand a model into its full run sequence.
pub fn expand(model: &ConfigModel) -> Expansion {
    let base_combos = cartesian(model.base());
    let group_combos: Vec<Vec<Vec<Param>>> = model
        .groups()
        .iter()
        .map(|g| cartesian(g.params()))
        .collect();

    let mut expansion = Expansion::default();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for base in &base_combos {
        if group_combos.is_empty() {
            push_unique(&mut expansion, &mut seen, RunConfig::new(base.clone(), None));
            continue;
        }
        for (group_index, combos) in group_combos.iter().enumerate() {
            for overrides in combos {
                let run = RunConfig::new(merge(base, overrides), Some(group_index));
                push_unique(&mut expansion, &mut seen, run);
            }
        }
    }

    expansion
}

/// Iterative cartesian product over ordered specs. An empty slice yields one
/// empty combination.
pub fn cartesian(specs: &[ParameterSpec]) -> Vec<Vec<Param>> {
    let mut combos: Vec<Vec<Param>> = vec![Vec::new()];
    for spec in specs {
        let mut next = Vec::with_capacity(combos.len() * spec.candidates().len());
        for combo in &combos {
            for candidate in spec.candidates() {
                let mut c = combo.clone();
                c.push(Param::new(spec.name(), candidate.clone()));
                next.push(c);
            }
        }
        combos = next;
    }
    combos
}

/// Overlay group values onto a base combination. Overlapping keys keep their
/// base position; group-only keys are appended in group order.
fn merge(base: &[Param], overrides: &[Param]) -> Vec<Param> {
    let mut merged = base.to_vec();
    for o in overrides {
        match merged.iter_mut().find(|p| p.name == o.name) {
            Some(existing) => existing.value = o.value.clone(),
            None => merged.push(o.clone()),
        }
    }
    merged
}

fn push_unique(expansion: &mut Expansion, seen: &mut HashMap<String, usize>, run: RunConfig) {
    if let Some(&first_index) = seen.get(run.id()) {
        warn!(
            run_id = run.short_id(),
            first_index,
            group = ?run.group(),
            "Skipping duplicate run configuration"
        );
        expansion.duplicates.push(DuplicateRun {
            id: run.id().to_string(),
            first_index,
            group: run.group(),
        });
        return;
    }
    seen.insert(run.id().to_string(), expansion.runs.len());
    expansion.runs.push(run);
}
