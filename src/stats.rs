//! Pure aggregation over run slices: the statistics engine.

use crate::registry::Run;

/// Aggregate figures over a window of runs. All times in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneralStats {
    pub submitted_runs: usize,
    pub finished_runs: usize,
    pub failed_runs: usize,
    pub failed_ratio: f64,
    pub avg_run_time: f64,
    pub std_dev_run_time: f64,
    pub min_run_time: f64,
    pub max_run_time: f64,
}

fn ratio(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Computes [`GeneralStats`] over any slice of runs. Aggregates consider
/// only finished, successful runs; `min_run_time` defaults to 0 when there
/// are none.
#[must_use]
pub fn compute(runs: &[Run]) -> GeneralStats {
    let submitted_runs = runs.len();
    let mut finished_runs = 0usize;
    let mut failed_runs = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count_success = 0usize;
    let mut min_time = f64::INFINITY;
    let mut max_time = 0.0f64;

    for run in runs {
        if !run.finished {
            continue;
        }
        finished_runs += 1;
        match run.run_time() {
            Some(run_time) => {
                count_success += 1;
                sum += run_time;
                sum_sq += run_time * run_time;
                min_time = min_time.min(run_time);
                max_time = max_time.max(run_time);
            }
            None => failed_runs += 1,
        }
    }

    let min_run_time = if min_time.is_finite() { min_time } else { 0.0 };
    let std_dev_run_time = if count_success <= 1 {
        0.0
    } else {
        let n = count_success as f64;
        ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0).sqrt()
    };

    GeneralStats {
        submitted_runs,
        finished_runs,
        failed_runs,
        failed_ratio: ratio(failed_runs as f64, finished_runs as f64),
        avg_run_time: ratio(sum, count_success as f64),
        std_dev_run_time,
        min_run_time,
        max_run_time,
    }
}

/// Yields `(window_start, GeneralStats)` for each window
/// `[window_start, window_start + step)` in the arithmetic progression
/// `start, start + step, …` while `window_start < end`.
pub fn intervals<'a>(
    registry: &'a crate::registry::Registry,
    step: f64,
    start: f64,
    end: f64,
) -> impl Iterator<Item = (f64, GeneralStats)> + 'a {
    let steps = if step > 0.0 {
        ((end - start) / step).ceil().max(0.0) as usize
    } else {
        0
    };
    (0..steps).map(move |i| {
        let window_start = start + step * i as f64;
        let runs = registry.slice(Some(window_start), Some(window_start + step));
        (window_start, compute(&runs))
    })
}
