//! Trainer metrics collection.
//!
//! Metrics are taken from the first source that yields anything:
//! a JSON metrics file in the run directory, the `best_val_loss_and_iter.txt`
//! summary the reference trainer writes, or a scan of the trainer's stdout.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// File written by the reference trainer: `best_val_loss, best_iter, ...`.
pub const BEST_VAL_LOSS_FILE: &str = "best_val_loss_and_iter.txt";

static ITER_LOSS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"iter\s+(\d+):\s*loss\s+([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)")
        .expect("valid regex")
});

static VAL_LOSS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"val(?:idation)?[ _]loss[:\s]+([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)")
        .expect("valid regex")
});

/// Metrics reported by one trainer run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_iter: Option<u64>,
    /// `(iteration, loss)` pairs in logged order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loss_history: Vec<(u64, f64)>,
    /// Any other numeric fields the trainer reported.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl RunMetrics {
    pub fn is_empty(&self) -> bool {
        self.final_loss.is_none()
            && self.eval_loss.is_none()
            && self.best_iter.is_none()
            && self.loss_history.is_empty()
            && self.extra.is_empty()
    }

    /// Score used to rank runs: eval loss, falling back to final loss.
    pub fn score(&self) -> Option<f64> {
        self.eval_loss.or(self.final_loss)
    }

    pub fn record_iter(&mut self, iter: u64, loss: f64) {
        self.loss_history.push((iter, loss));
        self.final_loss = Some(loss);
    }
}

/// Collect metrics for a finished run.
pub fn collect(run_dir: &Path, metrics_file: &str, stdout: &str) -> RunMetrics {
    let json_path = run_dir.join(metrics_file);
    if let Some(m) = std::fs::read_to_string(&json_path)
        .ok()
        .and_then(|text| parse_metrics_json(&text))
    {
        debug!(path = %json_path.display(), "Metrics taken from metrics file");
        return m;
    }

    if let Some(m) = std::fs::read_to_string(run_dir.join(BEST_VAL_LOSS_FILE))
        .ok()
        .and_then(|text| parse_best_val_loss(&text))
    {
        debug!("Metrics taken from best-val-loss summary");
        return m;
    }

    parse_stdout(stdout)
}

/// Parse a JSON metrics object. Unknown numeric fields land in `extra`.
pub fn parse_metrics_json(text: &str) -> Option<RunMetrics> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;

    let mut metrics = RunMetrics::default();
    for (key, v) in obj {
        match key.as_str() {
            "final_loss" | "loss" => metrics.final_loss = v.as_f64(),
            "eval_loss" | "val_loss" | "best_val_loss" => metrics.eval_loss = v.as_f64(),
            "best_iter" => metrics.best_iter = v.as_u64(),
            _ => {
                if let Some(n) = v.as_f64() {
                    metrics.extra.insert(key.clone(), n);
                }
            }
        }
    }
    Some(metrics)
}

/// Parse `best_val_loss, best_iter[, ...]`.
pub fn parse_best_val_loss(text: &str) -> Option<RunMetrics> {
    let mut fields = text.trim().split(',').map(str::trim);
    let eval_loss = fields.next()?.parse::<f64>().ok()?;
    let best_iter = fields.next().and_then(|f| f.parse::<f64>().ok()).map(|f| f as u64);
    Some(RunMetrics {
        eval_loss: Some(eval_loss),
        best_iter,
        ..Default::default()
    })
}

/// Scan trainer stdout for `iter N: loss X` and `val loss X` lines.
pub fn parse_stdout(stdout: &str) -> RunMetrics {
    let mut metrics = RunMetrics::default();
    for line in stdout.lines() {
        if let Some(caps) = ITER_LOSS.captures(line) {
            if let (Ok(iter), Ok(loss)) = (caps[1].parse::<u64>(), caps[2].parse::<f64>()) {
                metrics.record_iter(iter, loss);
            }
        }
        if let Some(caps) = VAL_LOSS.captures(line) {
            if let Ok(loss) = caps[1].parse::<f64>() {
                metrics.eval_loss = Some(loss);
            }
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_stdout_trainer_log() {
        let log = "\
step 0: train loss 4.2000, val loss 4.2100
iter 0: loss 4.1873, time 120.00ms
iter 10: loss 3.5021, time 30.00ms
step 20: train loss 3.1000, val loss 3.2500
iter 20: loss 3.0544, time 31.00ms
";
        let m = parse_stdout(log);
        assert_eq!(m.loss_history.len(), 3);
        assert_eq!(m.final_loss, Some(3.0544));
        assert_eq!(m.eval_loss, Some(3.25));
        assert_eq!(m.score(), Some(3.25));
    }

    #[test]
    fn test_parse_metrics_json_keeps_extra() {
        let m = parse_metrics_json(r#"{"final_loss": 1.5, "eval_loss": 1.7, "mfu": 0.31}"#)
            .unwrap();
        assert_eq!(m.final_loss, Some(1.5));
        assert_eq!(m.eval_loss, Some(1.7));
        assert_eq!(m.extra.get("mfu"), Some(&0.31));
        assert!(parse_metrics_json("[1, 2]").is_none());
    }

    #[test]
    fn test_parse_best_val_loss() {
        let m = parse_best_val_loss("2.4817, 1500, 12345\n").unwrap();
        assert_eq!(m.eval_loss, Some(2.4817));
        assert_eq!(m.best_iter, Some(1500));
        assert!(parse_best_val_loss("garbage").is_none());
    }

    #[test]
    fn test_collect_prefers_metrics_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("metrics.json"), r#"{"eval_loss": 0.9}"#).unwrap();
        std::fs::write(dir.path().join(BEST_VAL_LOSS_FILE), "1.9, 10").unwrap();
        let m = collect(dir.path(), "metrics.json", "iter 1: loss 5.0");
        assert_eq!(m.eval_loss, Some(0.9));
        assert!(m.loss_history.is_empty());
    }

    #[test]
    fn test_collect_falls_back_to_stdout() {
        let dir = TempDir::new().unwrap();
        let m = collect(dir.path(), "metrics.json", "iter 7: loss 2.5");
        assert_eq!(m.final_loss, Some(2.5));
        assert_eq!(m.loss_history, vec![(7, 2.5)]);
    }

    #[test]
    fn test_empty_metrics() {
        assert!(RunMetrics::default().is_empty());
        assert!(parse_stdout("nothing useful here").is_empty());
    }
}
