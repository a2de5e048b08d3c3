//! Thread-per-invocation executor: each `submit()` spawns a fresh OS thread
//! that terminates when its invocation completes, gated by
//! [`super::gate::ConcurrencyGate`]. Each worker thread builds its own
//! single-threaded Tokio runtime to drive the task instance's async `run()`
//! to completion — the same trick `loaded`'s `cmd/run.rs::start_worker`
//! uses to host async work on a plain `std::thread`.

use super::gate::ConcurrencyGate;
use crate::error::TaskSetupError;
use crate::executor::Executor;
use crate::registry::{Registry, RunResult, WorkloadFault};
use crate::task::{Task, TaskInstance};
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

type BoxedInstance = Box<dyn TaskInstance + Send>;

#[derive(Clone)]
struct InstancePool {
    tx: SyncSender<BoxedInstance>,
    rx: Arc<Mutex<Receiver<BoxedInstance>>>,
}

impl InstancePool {
    fn new(instances: Vec<BoxedInstance>) -> Self {
        let (tx, rx) = sync_channel(instances.len().max(1));
        for instance in instances {
            tx.send(instance)
                .expect("pool capacity sized to instance count");
        }
        InstancePool {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    fn checkout(&self) -> BoxedInstance {
        self.rx
            .lock()
            .expect("pool lock poisoned")
            .recv()
            .expect("pool sender outlives the executor")
    }

    fn give_back(&self, instance: BoxedInstance) {
        self.tx
            .send(instance)
            .expect("pool capacity never exceeded");
    }
}

enum InstanceSource {
    Shared(Arc<AsyncMutex<BoxedInstance>>),
    Pool(InstancePool),
}

pub struct ThreadedExecutor {
    task: Arc<dyn Task>,
    registry: Arc<Registry>,
    benchmark_start: Instant,
    gate: Arc<ConcurrencyGate>,
    source: Mutex<Option<InstanceSource>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadedExecutor {
    #[must_use]
    pub fn new(task: Arc<dyn Task>, registry: Arc<Registry>, benchmark_start: Instant) -> Self {
        let max_concurrency = task.config().max_concurrency.get();
        ThreadedExecutor {
            task,
            registry,
            benchmark_start,
            gate: ConcurrencyGate::new(max_concurrency),
            source: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }
}

impl Executor for ThreadedExecutor {
    fn setup(&self) -> Result<(), TaskSetupError> {
        let source = if self.task.config().per_worker_instance {
            let n = self.task.config().max_concurrency.get();
            let mut instances = Vec::with_capacity(n);
            for _ in 0..n {
                instances.push(self.task.setup()?);
            }
            InstanceSource::Pool(InstancePool::new(instances))
        } else {
            InstanceSource::Shared(Arc::new(AsyncMutex::new(self.task.setup()?)))
        };
        *self.source.lock().expect("source lock poisoned") = Some(source);
        Ok(())
    }

    fn submit(&self) -> u64 {
        let start_time = self.benchmark_start.elapsed().as_secs_f64();
        let run_id = self
            .registry
            .append(start_time)
            .expect("start_time is monotonic under the single-producer driver loop");

        let guard = self.gate.acquire();
        let registry = Arc::clone(&self.registry);
        let source = self
            .source
            .lock()
            .expect("source lock poisoned")
            .as_ref()
            .map(clone_source)
            .expect("setup() must run before submit()");

        let handle = thread::Builder::new()
            .name(format!("run-{run_id}"))
            .spawn(move || {
                let _guard = guard;
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("build per-invocation runtime");

                let started = Instant::now();
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    rt.block_on(run_once(&source))
                }));
                let run_time = started.elapsed().as_secs_f64();

                let result = match outcome {
                    Ok(Ok(())) => RunResult {
                        run_id,
                        exc: None,
                        run_time,
                    },
                    Ok(Err(message)) => RunResult {
                        run_id,
                        exc: Some(WorkloadFault {
                            kind: "workload_error".to_string(),
                            message,
                        }),
                        run_time: 0.0,
                    },
                    Err(panic) => RunResult {
                        run_id,
                        exc: Some(WorkloadFault {
                            kind: "panic".to_string(),
                            message: panic_message(&panic),
                        }),
                        run_time: 0.0,
                    },
                };
                registry
                    .mark_finished(run_id, result)
                    .expect("run was just appended by this executor and not yet finished");
            })
            .expect("spawn worker thread");

        self.handles.lock().expect("handles lock poisoned").push(handle);
        run_id
    }

    fn wait_available(&self) {
        self.gate.wait_available();
    }

    fn available(&self) -> bool {
        self.gate.available()
    }

    fn join(&self) {
        let handles: Vec<_> = self
            .handles
            .lock()
            .expect("handles lock poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn finish(&self) {
        // No new submissions are issued by the driver after finish(); there
        // is no additional state to stamp here beyond what join() already
        // waits on.
    }
}

fn clone_source(source: &InstanceSource) -> InstanceSource {
    match source {
        InstanceSource::Shared(shared) => InstanceSource::Shared(Arc::clone(shared)),
        InstanceSource::Pool(pool) => InstanceSource::Pool(pool.clone()),
    }
}

async fn run_once(source: &InstanceSource) -> Result<(), String> {
    match source {
        InstanceSource::Shared(shared) => {
            let mut instance = shared.lock().await;
            instance.run().await
        }
        InstanceSource::Pool(pool) => {
            let mut instance = pool.checkout();
            let result = instance.run().await;
            pool.give_back(instance);
            result
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "workload panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ExecutorKind, TaskConfig};
    use async_trait::async_trait;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingInstance(Arc<AtomicUsize>);

    #[async_trait(?Send)]
    impl TaskInstance for CountingInstance {
        async fn run(&mut self) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingTask {
        config: TaskConfig,
        counter: Arc<AtomicUsize>,
    }

    impl Task for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }
        fn config(&self) -> &TaskConfig {
            &self.config
        }
        fn setup(&self) -> Result<Box<dyn TaskInstance + Send>, TaskSetupError> {
            Ok(Box::new(CountingInstance(Arc::clone(&self.counter))))
        }
    }

    #[test]
    fn runs_to_completion_and_records_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn Task> = Arc::new(CountingTask {
            config: TaskConfig {
                executor: ExecutorKind::Threaded,
                max_concurrency: NonZeroUsize::new(4).unwrap(),
                per_worker_instance: false,
            },
            counter: Arc::clone(&counter),
        });
        let registry = Arc::new(Registry::new());
        let exec = ThreadedExecutor::new(Arc::clone(&task), Arc::clone(&registry), Instant::now());
        exec.setup().unwrap();

        for _ in 0..10 {
            exec.wait_available();
            exec.submit();
        }
        exec.finish();
        exec.join();

        assert_eq!(counter.load(Ordering::SeqCst), 10);
        let runs = registry.slice(None, None);
        assert_eq!(runs.len(), 10);
        assert!(runs.iter().all(|r| r.finished && r.result.as_ref().unwrap().exc.is_none()));
    }

    #[test]
    fn per_worker_instance_pool_round_trips() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn Task> = Arc::new(CountingTask {
            config: TaskConfig {
                executor: ExecutorKind::Threaded,
                max_concurrency: NonZeroUsize::new(3).unwrap(),
                per_worker_instance: true,
            },
            counter: Arc::clone(&counter),
        });
        let registry = Arc::new(Registry::new());
        let exec = ThreadedExecutor::new(Arc::clone(&task), Arc::clone(&registry), Instant::now());
        exec.setup().unwrap();

        for _ in 0..9 {
            exec.wait_available();
            exec.submit();
        }
        exec.finish();
        exec.join();

        assert_eq!(counter.load(Ordering::SeqCst), 9);
        assert_eq!(registry.len(), 9);
    }
}
