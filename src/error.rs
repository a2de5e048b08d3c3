//! Error taxonomy for the load driver and measurement engine.
//!
//! `thiserror` enums model the fatal/absorbed split described by the error
//! handling design: workload faults never reach here (they're captured as
//! [`crate::registry::WorkloadFault`] inside a `RunResult`), everything else
//! bubbles up through these types to the CLI boundary, where `anyhow` takes
//! over.

use thiserror::Error;

/// Invalid task or executor configuration. Fatal at setup time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown executor kind `{0}`")]
    UnknownExecutor(String),
    #[error("max_concurrency must be positive, got {0}")]
    NonPositiveConcurrency(i64),
    #[error("unknown module `{0}`; available: {1}")]
    UnknownModule(String, String),
}

/// A breach of a run registry invariant — always a bug, never a user error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("start_time regressed: run {run_id} has start_time {start_time} but the last appended run has start_time {last_start_time}")]
    InvariantViolation {
        run_id: u64,
        start_time: f64,
        last_start_time: f64,
    },
    #[error("run {0} was marked finished twice")]
    DoubleFinish(u64),
    #[error("run {0} not found in registry")]
    UnknownRun(u64),
}

/// Raised by a task's `setup()`. Fatal for that task; the driver aborts
/// before the ramp begins.
#[derive(Debug, Error)]
#[error("task setup failed: {0}")]
pub struct TaskSetupError(pub String);

/// Failures creating the output directory or writing the results blob.
/// Surfaced to the caller; does not roll back a completed benchmark.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create export directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Top-level error returned by executor setup and the driver's orchestration.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    TaskSetup(#[from] TaskSetupError),
    #[error(transparent)]
    Export(#[from] ExportError),
}
