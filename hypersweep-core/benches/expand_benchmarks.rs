use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hypersweep_core::sweep::{ConfigModel, expand};

const GRID: &str = r#"
learning_rate: [0.001, 0.0006, 0.0003, 0.0001]
batch_size: [8, 16, 32]
n_layer: [4, 6, 8]
dropout: [0.0, 0.1, 0.2]
compile: true
parameter_groups:
  - quantize_linear_method: [symmetric_quant, affine_quant]
    quantize_linear_bits: [4, 8]
  - quantize_attn_act: [true, false]
    quantize_attn_act_bits: [8, 16]
  - n_layer: [12]
"#;

fn bench_expand(c: &mut Criterion) {
    let model: ConfigModel = GRID.parse().expect("valid sweep");

    c.bench_function("parse_sweep_document", |b| {
        b.iter(|| black_box(GRID).parse::<ConfigModel>())
    });

    c.bench_function("expand_grid_with_groups", |b| {
        b.iter(|| expand(black_box(&model)))
    });

    c.bench_function("model_content_hash", |b| {
        b.iter(|| black_box(&model).content_hash())
    });
}

criterion_group!(benches, bench_expand);
criterion_main!(benches);
