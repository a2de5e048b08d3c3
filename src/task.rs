//! Task descriptors: the opaque configuration + callable interface a loader
//! collaborator produces and the executors consume.

use crate::error::{ConfigError, TaskSetupError};
use async_trait::async_trait;
use std::num::NonZeroUsize;

/// Which execution back-end a task wants to run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Threaded,
    Cooperative,
}

impl std::str::FromStr for ExecutorKind {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threaded" => Ok(ExecutorKind::Threaded),
            "cooperative" => Ok(ExecutorKind::Cooperative),
            other => Err(crate::error::ConfigError::UnknownExecutor(other.to_string())),
        }
    }
}

/// The configuration fields enumerated in the data model: which executor to
/// use, how many invocations may be in flight at once, and whether each
/// invocation gets its own task instance or shares one.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub executor: ExecutorKind,
    pub max_concurrency: NonZeroUsize,
    pub per_worker_instance: bool,
}

impl TaskConfig {
    /// Validates `max_concurrency` before constructing a `TaskConfig`.
    /// `max_concurrency` takes `i64` because loader collaborators resolve it
    /// from arbitrary user-supplied configuration, which may turn out to be
    /// zero or negative.
    ///
    /// # Errors
    /// Returns [`ConfigError::NonPositiveConcurrency`] if `max_concurrency`
    /// is not a positive integer.
    pub fn try_new(
        executor: ExecutorKind,
        max_concurrency: i64,
        per_worker_instance: bool,
    ) -> Result<Self, ConfigError> {
        let concurrency = usize::try_from(max_concurrency)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::NonPositiveConcurrency(max_concurrency))?;
        Ok(TaskConfig {
            executor,
            max_concurrency: concurrency,
            per_worker_instance,
        })
    }
}

/// A per-invocation (or per-worker, when `per_worker_instance` is true)
/// instance of a task's state, constructed once by [`Task::setup`] and then
/// driven repeatedly by the executor.
///
/// The `?Send` async-trait bound mirrors [`crate::task::Task`]'s own: no
/// executor ever moves an in-progress `run()` future across an OS thread
/// boundary, only the (`Send`) instance itself between invocations.
#[async_trait(?Send)]
pub trait TaskInstance {
    /// Runs one invocation. Returning `Err` records a workload failure;
    /// panicking inside `run()` is also captured as a failure by the
    /// executor (there is no separate "crashed" outcome).
    async fn run(&mut self) -> Result<(), String>;
}

/// A task descriptor: a display name, a one-time setup, and the
/// configuration that tells an executor how to drive it.
///
/// `setup()` is called once per task instance, before any dispatch; workload
/// authors are expected to do connection/client construction there, not in
/// `run()`.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;
    fn config(&self) -> &TaskConfig;
    fn setup(&self) -> Result<Box<dyn TaskInstance + Send>, TaskSetupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_kind_parses_known_names() {
        assert_eq!("threaded".parse::<ExecutorKind>().unwrap(), ExecutorKind::Threaded);
        assert_eq!(
            "cooperative".parse::<ExecutorKind>().unwrap(),
            ExecutorKind::Cooperative
        );
    }

    #[test]
    fn executor_kind_rejects_unknown_names() {
        let err: Result<ExecutorKind, _> = "multiprocessing".parse();
        assert!(matches!(err, Err(crate::error::ConfigError::UnknownExecutor(ref s)) if s == "multiprocessing"));
    }

    #[test]
    fn task_config_rejects_zero_concurrency() {
        let err = TaskConfig::try_new(ExecutorKind::Threaded, 0, false).unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveConcurrency(0)));
    }

    #[test]
    fn task_config_rejects_negative_concurrency() {
        let err = TaskConfig::try_new(ExecutorKind::Threaded, -5, false).unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveConcurrency(-5)));
    }

    #[test]
    fn task_config_accepts_positive_concurrency() {
        let cfg = TaskConfig::try_new(ExecutorKind::Cooperative, 8, true).unwrap();
        assert_eq!(cfg.max_concurrency.get(), 8);
        assert!(cfg.per_worker_instance);
    }
}
