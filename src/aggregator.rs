//! Converts a finished benchmark's registry into the four-series shape the
//! report exporter consumes, and writes it out as a `results.json` data
//! blob. Only the data shape is in scope here — no HTML/JS templating.

use crate::error::ExportError;
use crate::registry::Registry;
use crate::stats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One task's four aligned series, each a list of `(window_start_seconds,
/// value)` pairs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskSeries {
    pub avg_run_time: Vec<(f64, f64)>,
    pub max_run_time: Vec<(f64, f64)>,
    pub std_dev: Vec<(f64, f64)>,
    pub failed: Vec<(f64, f64)>,
    pub runs: Vec<(f64, f64)>,
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Builds the series for one task's completed run.
///
/// `sample_interval` governs `avg_run_time`/`std_dev`/`max_run_time`;
/// `failed`/`runs` always use fixed 1-second windows per spec.
#[must_use]
pub fn aggregate(registry: &Registry, duration: f64, sample_interval: f64) -> TaskSeries {
    let mut avg_run_time = Vec::new();
    let mut std_dev = Vec::new();
    let mut max_run_time = Vec::new();

    for (window_start, stats) in stats::intervals(registry, sample_interval, 0.0, duration) {
        let t = round(window_start, 2);
        avg_run_time.push((t, round(stats.avg_run_time * 1000.0, 4)));
        std_dev.push((t, round(stats.std_dev_run_time * 1000.0, 4)));

        if let Some(peak) = peak_in_window(registry, window_start, sample_interval) {
            max_run_time.push((round(peak.0, 2), round(peak.1 * 1000.0, 4)));
        }
    }

    let mut failed = vec![(0.0, 0.0)];
    let mut runs = vec![(0.0, 0.0)];
    for (window_start, stats) in stats::intervals(registry, 1.0, 0.0, duration) {
        let t = round(window_start + 1.0, 2);
        failed.push((t, stats.failed_runs as f64));
        runs.push((t, stats.submitted_runs as f64));
    }

    TaskSeries {
        avg_run_time,
        max_run_time,
        std_dev,
        failed,
        runs,
    }
}

/// Finds `(start_time, run_time)` of the slowest successful run in
/// `[window_start, window_start + step)`, or `None` if the window has no
/// successful run.
fn peak_in_window(registry: &Registry, window_start: f64, step: f64) -> Option<(f64, f64)> {
    registry
        .slice(Some(window_start), Some(window_start + step))
        .into_iter()
        .filter_map(|run| run.run_time().map(|rt| (run.start_time, rt)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Writes `series`, keyed by task name, as `results.json` into a fresh
/// directory derived from `dir`: if `dir` already exists, the first
/// available `<dir>.N` suffix (N &ge; 1) is used instead.
///
/// # Errors
/// Returns [`ExportError`] if the directory can't be created or the file
/// can't be written.
pub fn export(dir: &Path, series: &BTreeMap<String, TaskSeries>) -> Result<PathBuf, ExportError> {
    let target = resolve_export_dir(dir);
    fs::create_dir_all(&target).map_err(|source| ExportError::CreateDir {
        path: target.display().to_string(),
        source,
    })?;

    let path = target.join("results.json");
    let body = serde_json::to_vec_pretty(series)?;
    fs::write(&path, body).map_err(|source| ExportError::WriteFile {
        path: path.display().to_string(),
        source,
    })?;

    Ok(target)
}

fn resolve_export_dir(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }
    let mut n = 1u32;
    loop {
        let candidate = PathBuf::from(format!("{}.{n}", base.display()));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, RunResult, WorkloadFault};

    fn success(registry: &Registry, start: f64, run_time: f64) {
        let id = registry.append(start).unwrap();
        registry
            .mark_finished(
                id,
                RunResult {
                    run_id: id,
                    exc: None,
                    run_time,
                },
            )
            .unwrap();
    }

    fn failure(registry: &Registry, start: f64) {
        let id = registry.append(start).unwrap();
        registry
            .mark_finished(
                id,
                RunResult {
                    run_id: id,
                    exc: Some(WorkloadFault {
                        kind: "err".into(),
                        message: "err".into(),
                    }),
                    run_time: 0.0,
                },
            )
            .unwrap();
    }

    #[test]
    fn series_have_expected_point_counts() {
        let registry = Registry::new();
        for i in 0..10 {
            success(&registry, i as f64 * 0.4, 0.1);
        }
        let series = aggregate(&registry, 5.0, 0.5);
        assert_eq!(series.avg_run_time.len(), 10);
        assert_eq!(series.std_dev.len(), 10);
        assert_eq!(series.failed[0], (0.0, 0.0));
        assert_eq!(series.runs[0], (0.0, 0.0));
        assert_eq!(series.failed.len(), 6);
        assert_eq!(series.runs.len(), 6);
    }

    #[test]
    fn max_run_time_picks_window_peak() {
        let registry = Registry::new();
        success(&registry, 0.1, 0.05);
        success(&registry, 0.2, 0.30);
        success(&registry, 0.3, 0.10);
        failure(&registry, 0.4);
        let series = aggregate(&registry, 1.0, 1.0);
        assert_eq!(series.max_run_time.len(), 1);
        assert_eq!(series.max_run_time[0], (0.2, 300.0));
    }

    #[test]
    fn export_creates_suffixed_directory_when_target_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("results");
        fs::create_dir_all(&base).unwrap();

        let registry = Registry::new();
        success(&registry, 0.0, 0.05);
        let mut series = BTreeMap::new();
        series.insert("demo".to_string(), aggregate(&registry, 1.0, 1.0));

        let written = export(&base, &series).unwrap();
        assert_eq!(written, tmp.path().join("results.1"));
        assert!(written.join("results.json").exists());
    }

    #[test]
    fn export_is_idempotent_given_same_input() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        success(&registry, 0.0, 0.05);
        success(&registry, 0.3, 0.07);
        let mut series = BTreeMap::new();
        series.insert("demo".to_string(), aggregate(&registry, 1.0, 0.5));

        let first = export(&tmp.path().join("a"), &series).unwrap();
        let second = export(&tmp.path().join("b"), &series).unwrap();
        let a = fs::read(first.join("results.json")).unwrap();
        let b = fs::read(second.join("results.json")).unwrap();
        assert_eq!(a, b);
    }
}
