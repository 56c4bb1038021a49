//! Plain-text rendering of expansions and sweep summaries.

use hypersweep_core::record::RunRecord;
use hypersweep_core::summary::SweepSummary;
use hypersweep_core::sweep::Expansion;
use std::fmt::Write;

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "-".into())
}

fn fmt_group(g: Option<usize>) -> String {
    g.map(|g| g.to_string()).unwrap_or_else(|| "-".into())
}

pub fn render_expansion(expansion: &Expansion) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>5}  {:<16}  {:>5}  parameters", "#", "id", "group");
    for (i, run) in expansion.runs.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>5}  {:<16}  {:>5}  {}",
            i,
            run.short_id(),
            fmt_group(run.group()),
            run.label()
        );
    }
    let _ = writeln!(
        out,
        "\n{} run(s), {} duplicate(s) skipped",
        expansion.runs.len(),
        expansion.duplicates.len()
    );
    out
}

pub fn render_records(records: &[RunRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:<16}  {:<9}  {:>10}  {:>10}  {:>9}  parameters",
        "#", "id", "status", "final", "eval", "secs"
    );
    for r in records {
        let metrics = r.metrics.as_ref();
        let _ = writeln!(
            out,
            "{:>5}  {:<16}  {:<9}  {:>10}  {:>10}  {:>9}  {}",
            r.index,
            r.config.short_id(),
            r.status.as_str(),
            fmt_opt(metrics.and_then(|m| m.final_loss)),
            fmt_opt(metrics.and_then(|m| m.eval_loss)),
            r.duration_secs
                .map(|d| format!("{d:.1}"))
                .unwrap_or_else(|| "-".into()),
            r.config.label()
        );
        if let Some(err) = &r.error {
            let first = err.lines().next().unwrap_or_default();
            let _ = writeln!(out, "{:>7}error: {}", "", first);
        }
    }
    out
}

pub fn render_summary(summary: &SweepSummary) -> String {
    let mut out = render_records(&summary.records);
    let c = &summary.counts;
    let _ = writeln!(
        out,
        "\n{} run(s): {} succeeded, {} failed, {} skipped",
        c.total(),
        c.succeeded,
        c.failed,
        c.skipped
    );
    if summary.duplicates_skipped > 0 {
        let _ = writeln!(
            out,
            "{} duplicate configuration(s) removed during expansion",
            summary.duplicates_skipped
        );
    }
    if let Some(best) = summary.best() {
        let score = best.metrics.as_ref().and_then(|m| m.score());
        let _ = writeln!(
            out,
            "best: #{} {} (loss {})",
            best.index,
            best.config.short_id(),
            fmt_opt(score)
        );
    }
    out
}
