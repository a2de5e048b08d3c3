//! The executor abstraction: two interchangeable back-ends that run task
//! invocations concurrently under a bounded admission gate.

mod gate;
pub mod cooperative;
pub mod threaded;

use crate::error::TaskSetupError;
use crate::task::Task;
use enum_dispatch::enum_dispatch;
use std::sync::Arc;

pub use cooperative::CooperativeExecutor;
pub use threaded::ThreadedExecutor;

/// The capability set every executor back-end exposes to the driver.
#[enum_dispatch]
pub trait Executor {
    /// Constructs workers and runs the task's `setup()` on every task
    /// instance exactly once, before any dispatch.
    fn setup(&self) -> Result<(), TaskSetupError>;

    /// Reserves an id, records a pending `Run` at `start_time = now -
    /// benchmark_start`, and enqueues execution of `task.run()`. Returns the
    /// new run's id.
    fn submit(&self) -> u64;

    /// Blocks until at least one worker slot is free.
    fn wait_available(&self);

    /// Non-blocking check of whether a slot is free.
    fn available(&self) -> bool;

    /// Waits for all in-flight runs to finish.
    fn join(&self);

    /// Stamps the end time; no new submissions are accepted afterward.
    fn finish(&self);
}

/// Either concrete executor, dispatched without a vtable via `enum_dispatch`
/// (the same pattern `loaded` uses for its connection lifecycle listeners).
#[enum_dispatch(Executor)]
pub enum AnyExecutor {
    Threaded(ThreadedExecutor),
    Cooperative(CooperativeExecutor),
}

impl AnyExecutor {
    #[must_use]
    pub fn new(
        task: Arc<dyn Task>,
        registry: Arc<crate::registry::Registry>,
        benchmark_start: std::time::Instant,
    ) -> Self {
        match task.config().executor {
            crate::task::ExecutorKind::Threaded => {
                AnyExecutor::Threaded(ThreadedExecutor::new(task, registry, benchmark_start))
            }
            crate::task::ExecutorKind::Cooperative => {
                AnyExecutor::Cooperative(CooperativeExecutor::new(task, registry, benchmark_start))
            }
        }
    }
}
