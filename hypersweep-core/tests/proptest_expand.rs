//! Property-based tests for combination expansion using proptest.

use proptest::prelude::*;

use hypersweep_core::sweep::{
    ConfigModel, ParamValue, ParameterGroup, ParameterSpec, expand,
};

fn spec(name: String, n: usize) -> ParameterSpec {
    let candidates = (0..n as i64).map(ParamValue::Int).collect();
    ParameterSpec::new(name, candidates).unwrap()
}

fn base_specs(lengths: &[usize]) -> Vec<ParameterSpec> {
    lengths
        .iter()
        .enumerate()
        .map(|(i, &n)| spec(format!("p{i}"), n))
        .collect()
}

// --- Base-only products ---

proptest! {
    #[test]
    fn base_only_count_is_product_of_lengths(
        lengths in prop::collection::vec(1usize..5, 0..5)
    ) {
        let model = ConfigModel::new(base_specs(&lengths), Vec::new()).unwrap();
        let out = expand(&model);
        let expected: usize = lengths.iter().product();
        prop_assert_eq!(out.len(), expected);
        prop_assert!(out.duplicates.is_empty());
    }

    #[test]
    fn expansion_order_is_deterministic(
        lengths in prop::collection::vec(1usize..4, 1..4),
        group_lengths in prop::collection::vec(1usize..4, 0..3),
    ) {
        let groups = group_lengths
            .iter()
            .enumerate()
            .map(|(g, &n)| ParameterGroup::new(vec![spec(format!("g{g}"), n)]))
            .collect();
        let model = ConfigModel::new(base_specs(&lengths), groups).unwrap();

        let first: Vec<String> = expand(&model).runs.iter().map(|r| r.id().to_string()).collect();
        let second: Vec<String> = expand(&model).runs.iter().map(|r| r.id().to_string()).collect();
        prop_assert_eq!(first, second);
    }
}

// --- Group isolation ---

proptest! {
    #[test]
    fn runs_never_mix_two_groups(
        base_len in 1usize..4,
        group_shapes in prop::collection::vec(prop::collection::vec(1usize..3, 1..3), 1..4),
    ) {
        let groups: Vec<ParameterGroup> = group_shapes
            .iter()
            .enumerate()
            .map(|(g, shape)| {
                ParameterGroup::new(
                    shape
                        .iter()
                        .enumerate()
                        .map(|(j, &n)| spec(format!("g{g}_k{j}"), n))
                        .collect(),
                )
            })
            .collect();
        let model = ConfigModel::new(vec![spec("base".into(), base_len)], groups).unwrap();
        let out = expand(&model);

        let per_group: usize = group_shapes.iter().map(|s| s.iter().product::<usize>()).sum();
        prop_assert_eq!(out.len(), base_len * per_group);

        for run in &out.runs {
            let prefix = format!("g{}_", run.group().unwrap());
            for p in run.params() {
                prop_assert!(
                    p.name == "base" || p.name.starts_with(&prefix),
                    "parameter {} leaked into a run of group {}",
                    p.name,
                    prefix
                );
            }
        }
    }

    #[test]
    fn identical_groups_collapse_to_one_set(
        n in 1usize..5,
        copies in 2usize..4,
    ) {
        let groups = (0..copies)
            .map(|_| ParameterGroup::new(vec![spec("shared".into(), n)]))
            .collect();
        let model = ConfigModel::new(vec![spec("base".into(), 1)], groups).unwrap();
        let out = expand(&model);
        prop_assert_eq!(out.len(), n);
        prop_assert_eq!(out.duplicates.len(), n * (copies - 1));
    }
}
