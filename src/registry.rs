//! The run registry: an append-only, time-ordered log of dispatched
//! invocations, queried concurrently by the reporter and the final export
//! while the driver keeps appending and workers keep marking runs finished.

use crate::error::RegistryError;
use std::sync::RwLock;

/// The captured outcome of one invocation. `run_time` is only meaningful
/// when `exc` is absent.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: u64,
    pub exc: Option<WorkloadFault>,
    pub run_time: f64,
}

/// A `(kind, message)` error descriptor captured from a failed invocation.
/// Never propagated as a Rust error — it only ever lives inside a
/// [`RunResult`].
#[derive(Debug, Clone)]
pub struct WorkloadFault {
    pub kind: String,
    pub message: String,
}

/// One dispatched invocation. `id` equals its insertion index in the
/// registry; `start_time` is seconds since the benchmark started.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: u64,
    pub start_time: f64,
    pub finished: bool,
    pub result: Option<RunResult>,
}

impl Run {
    fn new(id: u64, start_time: f64) -> Self {
        Run {
            id,
            start_time,
            finished: false,
            result: None,
        }
    }

    /// Duration of a finished, successful run. `None` while pending or on
    /// failure, per the invariant that `run_time` is undefined when `exc`
    /// is set.
    #[must_use]
    pub fn run_time(&self) -> Option<f64> {
        self.result
            .as_ref()
            .filter(|r| r.exc.is_none())
            .map(|r| r.run_time)
    }

    /// `start_time + run_time` for a finished, successful run.
    #[must_use]
    pub fn finish_time(&self) -> Option<f64> {
        self.run_time().map(|rt| self.start_time + rt)
    }
}

/// Append-only, `start_time`-ordered collection of [`Run`]s.
///
/// Appends come from a single producer (the driver) and are always added at
/// the tail with non-decreasing `start_time`, so range queries resolve via
/// binary search rather than a scan.
#[derive(Default)]
pub struct Registry {
    runs: RwLock<Vec<Run>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Registry {
            runs: RwLock::new(Vec::new()),
        }
    }

    /// Reserves the next id and appends a new pending run at `start_time`.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvariantViolation`] if `start_time` is
    /// smaller than the last appended run's `start_time`.
    pub fn append(&self, start_time: f64) -> Result<u64, RegistryError> {
        let mut runs = self.runs.write().expect("registry lock poisoned");
        if let Some(last) = runs.last() {
            if start_time < last.start_time {
                return Err(RegistryError::InvariantViolation {
                    run_id: runs.len() as u64,
                    start_time,
                    last_start_time: last.start_time,
                });
            }
        }
        let id = runs.len() as u64;
        runs.push(Run::new(id, start_time));
        Ok(id)
    }

    /// Attaches `result` to the run and flips it to finished. A run may only
    /// be finished once.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownRun`] or
    /// [`RegistryError::DoubleFinish`] if `run_id` is invalid or already
    /// finished.
    pub fn mark_finished(&self, run_id: u64, result: RunResult) -> Result<(), RegistryError> {
        let mut runs = self.runs.write().expect("registry lock poisoned");
        let run = runs
            .get_mut(run_id as usize)
            .ok_or(RegistryError::UnknownRun(run_id))?;
        if run.finished {
            return Err(RegistryError::DoubleFinish(run_id));
        }
        run.result = Some(result);
        run.finished = true;
        Ok(())
    }

    /// Returns the ordered runs with `start ≤ run.start_time < end`.
    /// `start` defaults to 0, `end` to `+∞`.
    #[must_use]
    pub fn slice(&self, start: Option<f64>, end: Option<f64>) -> Vec<Run> {
        let start = start.unwrap_or(0.0);
        let end = end.unwrap_or(f64::INFINITY);
        let runs = self.runs.read().expect("registry lock poisoned");
        let lo = runs.partition_point(|r| r.start_time < start);
        let hi = runs.partition_point(|r| r.start_time < end);
        runs[lo..hi].to_vec()
    }

    /// Number of runs appended so far, finished or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.read().expect("registry lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
