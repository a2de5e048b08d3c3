//! A minimal, explicitly-demo stand-in for a real task loader. Spec-wise the
//! loader is an external collaborator; this catalog exists only so the
//! binary and its integration tests have something concrete to run behind
//! the `module` CLI argument.

use crate::error::{ConfigError, TaskSetupError};
use crate::task::{ExecutorKind, Task, TaskConfig, TaskInstance};
use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Resolves a module name to a task descriptor. Real loaders would discover
/// tasks by inspecting a user-supplied module; this one just looks a name up
/// in a fixed table.
pub struct TaskCatalog;

impl TaskCatalog {
    /// # Errors
    /// Returns [`ConfigError::UnknownModule`] if `name` isn't one of the
    /// built-in demo tasks.
    pub fn resolve(name: &str) -> Result<Arc<dyn Task>, ConfigError> {
        match name {
            "zero-latency" => Ok(Arc::new(ZeroLatencyTask::default())),
            "fixed-sleep" => Ok(Arc::new(FixedSleepTask::default())),
            other => Err(ConfigError::UnknownModule(
                other.to_string(),
                Self::names().join(", "),
            )),
        }
    }

    #[must_use]
    pub fn names() -> Vec<&'static str> {
        vec!["zero-latency", "fixed-sleep"]
    }
}

/// Scenario 1 of spec.md §8: a task that returns immediately, to exercise
/// the dispatcher's rate ramp without any workload latency of its own.
pub struct ZeroLatencyTask {
    config: TaskConfig,
}

impl Default for ZeroLatencyTask {
    fn default() -> Self {
        ZeroLatencyTask {
            config: TaskConfig {
                executor: ExecutorKind::Threaded,
                max_concurrency: NonZeroUsize::new(64).expect("64 is nonzero"),
                per_worker_instance: false,
            },
        }
    }
}

struct ZeroLatencyInstance;

#[async_trait(?Send)]
impl TaskInstance for ZeroLatencyInstance {
    async fn run(&mut self) -> Result<(), String> {
        Ok(())
    }
}

impl Task for ZeroLatencyTask {
    fn name(&self) -> &str {
        "zero-latency"
    }

    fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn setup(&self) -> Result<Box<dyn TaskInstance + Send>, TaskSetupError> {
        Ok(Box::new(ZeroLatencyInstance))
    }
}

/// Scenario 2 of spec.md §8: every invocation sleeps a fixed duration,
/// exercising a workload whose latency dominates over dispatch overhead.
pub struct FixedSleepTask {
    config: TaskConfig,
    sleep_for: Duration,
}

impl Default for FixedSleepTask {
    fn default() -> Self {
        FixedSleepTask {
            config: TaskConfig {
                executor: ExecutorKind::Cooperative,
                max_concurrency: NonZeroUsize::new(32).expect("32 is nonzero"),
                per_worker_instance: false,
            },
            sleep_for: Duration::from_millis(50),
        }
    }
}

struct FixedSleepInstance {
    sleep_for: Duration,
}

#[async_trait(?Send)]
impl TaskInstance for FixedSleepInstance {
    async fn run(&mut self) -> Result<(), String> {
        tokio::time::sleep(self.sleep_for).await;
        Ok(())
    }
}

impl Task for FixedSleepTask {
    fn name(&self) -> &str {
        "fixed-sleep"
    }

    fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn setup(&self) -> Result<Box<dyn TaskInstance + Send>, TaskSetupError> {
        Ok(Box::new(FixedSleepInstance {
            sleep_for: self.sleep_for,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_advertised_name() {
        for name in TaskCatalog::names() {
            let task = TaskCatalog::resolve(name).unwrap();
            assert_eq!(task.name(), name);
        }
    }

    #[test]
    fn unknown_module_is_an_error() {
        let err = TaskCatalog::resolve("nonexistent").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownModule(..)));
    }
}
