//! Cooperative executor: a single background OS thread hosts one
//! `tokio::task::LocalSet` for the whole benchmark's lifetime, and every
//! invocation becomes a `spawn_local` task on it. This mirrors `loaded`'s
//! `Worker::run`, which drives many connection futures on one `LocalSet`
//! rather than handing each its own thread.

use super::gate::ConcurrencyGate;
use crate::error::TaskSetupError;
use crate::executor::Executor;
use crate::registry::{Registry, RunResult, WorkloadFault};
use crate::task::{Task, TaskInstance};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::LocalSet;

type BoxedInstance = Box<dyn TaskInstance>;

// `TaskInstance::run` is `?Send` (see task.rs), so every instance and the
// channel carrying spawn requests lives entirely on the LocalSet's thread;
// nothing here crosses an OS thread boundary.
enum InstanceSource {
    Shared(Rc<AsyncMutex<BoxedInstance>>),
    Pool(Rc<AsyncPool>),
}

struct AsyncPool {
    tx: tokio::sync::mpsc::UnboundedSender<BoxedInstance>,
    rx: AsyncMutex<tokio::sync::mpsc::UnboundedReceiver<BoxedInstance>>,
}

impl AsyncPool {
    fn new(instances: Vec<BoxedInstance>) -> Self {
        let (tx, rx) = unbounded_channel();
        for instance in instances {
            tx.send(instance).expect("receiver held alive by self");
        }
        AsyncPool {
            tx,
            rx: AsyncMutex::new(rx),
        }
    }

    async fn checkout(&self) -> BoxedInstance {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("pool sender outlives the executor")
    }

    fn give_back(&self, instance: BoxedInstance) {
        self.tx.send(instance).expect("pool capacity never exceeded");
    }
}

struct SpawnRequest {
    run_id: u64,
}

pub struct CooperativeExecutor {
    registry: Arc<Registry>,
    benchmark_start: Instant,
    gate: Arc<ConcurrencyGate>,
    task: Arc<dyn Task>,
    spawn_tx: Mutex<Option<UnboundedSender<SpawnRequest>>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    done_rx: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
}

impl CooperativeExecutor {
    #[must_use]
    pub fn new(task: Arc<dyn Task>, registry: Arc<Registry>, benchmark_start: Instant) -> Self {
        CooperativeExecutor {
            registry,
            benchmark_start,
            gate: ConcurrencyGate::new(task.config().max_concurrency.get()),
            task,
            spawn_tx: Mutex::new(None),
            worker: Mutex::new(None),
            done_rx: Mutex::new(None),
        }
    }
}

impl Executor for CooperativeExecutor {
    fn setup(&self) -> Result<(), TaskSetupError> {
        let (spawn_tx, mut spawn_rx) = unbounded_channel::<SpawnRequest>();
        let (setup_tx, setup_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let task = Arc::clone(&self.task);
        let registry = Arc::clone(&self.registry);
        let gate = Arc::clone(&self.gate);
        let benchmark_start = self.benchmark_start;

        let handle = std::thread::Builder::new()
            .name("cooperative-executor".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("build cooperative executor runtime");
                let local = LocalSet::new();

                let setup_result = local.block_on(&rt, async {
                    if task.config().per_worker_instance {
                        let n = task.config().max_concurrency.get();
                        let mut instances: Vec<BoxedInstance> = Vec::with_capacity(n);
                        for _ in 0..n {
                            instances.push(task.setup()?);
                        }
                        Ok(InstanceSource::Pool(Rc::new(AsyncPool::new(instances))))
                    } else {
                        let instance: BoxedInstance = task.setup()?;
                        Ok(InstanceSource::Shared(Rc::new(AsyncMutex::new(instance))))
                    }
                });

                let source = match setup_result {
                    Ok(source) => {
                        let _ = setup_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        let _ = setup_tx.send(Err(err));
                        let _ = done_tx.send(());
                        return;
                    }
                };

                local.block_on(&rt, async {
                    dispatch_until_closed(&mut spawn_rx, &source, &registry, &gate).await;
                    // The channel is closed (finish() dropped the sender)
                    // but tasks it already spawned may still be in flight;
                    // yield until the gate drains so finish() observes a
                    // fully quiesced benchmark.
                    while !gate.is_idle() {
                        tokio::task::yield_now().await;
                    }
                });
                let _ = done_tx.send(());
                let _ = benchmark_start;
            })
            .expect("spawn cooperative executor thread");

        *self.worker.lock().expect("worker lock poisoned") = Some(handle);
        *self.spawn_tx.lock().expect("spawn_tx lock poisoned") = Some(spawn_tx);
        *self.done_rx.lock().expect("done_rx lock poisoned") = Some(done_rx);
        setup_rx
            .recv()
            .expect("setup thread always replies before spawn_local loop starts")
    }

    fn submit(&self) -> u64 {
        let start_time = self.benchmark_start.elapsed().as_secs_f64();
        let run_id = self
            .registry
            .append(start_time)
            .expect("start_time is monotonic under the single-producer driver loop");
        self.spawn_tx
            .lock()
            .expect("spawn_tx lock poisoned")
            .as_ref()
            .expect("setup() must run before submit()")
            .send(SpawnRequest { run_id })
            .expect("executor thread outlives submit() calls");
        run_id
    }

    fn wait_available(&self) {
        self.gate.wait_available();
    }

    fn available(&self) -> bool {
        self.gate.available()
    }

    fn join(&self) {
        self.gate.join_idle();
    }

    fn finish(&self) {
        // Dropping the sender closes the spawn_rx channel, which ends the
        // executor thread's dispatch loop once every already-queued
        // invocation has been spawned.
        self.spawn_tx.lock().expect("spawn_tx lock poisoned").take();
        if let Some(done_rx) = self.done_rx.lock().expect("done_rx lock poisoned").take() {
            let _ = done_rx.recv();
        }
        if let Some(handle) = self.worker.lock().expect("worker lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

async fn dispatch_until_closed(
    spawn_rx: &mut tokio::sync::mpsc::UnboundedReceiver<SpawnRequest>,
    source: &InstanceSource,
    registry: &Arc<Registry>,
    gate: &Arc<ConcurrencyGate>,
) {
    while let Some(request) = spawn_rx.recv().await {
        let source = clone_source(source);
        let registry = Arc::clone(registry);
        let gate = Arc::clone(gate);
        let run_id = request.run_id;
        tokio::task::spawn_local(async move {
            let _guard = gate.acquire();
            let started = Instant::now();
            // Nest the actual invocation in its own task so a workload
            // panic surfaces as a JoinError here instead of unwinding
            // through this task (and the shared LocalSet).
            let join = tokio::task::spawn_local(async move { run_once(&source).await });
            let outcome = join.await;
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
                Err(join_err) => RunResult {
                    run_id,
                    exc: Some(WorkloadFault {
                        kind: "panic".to_string(),
                        message: panic_message(join_err),
                    }),
                    run_time: 0.0,
                },
            };
            registry
                .mark_finished(run_id, result)
                .expect("run was appended by this executor and not yet finished");
        });
    }
}

fn clone_source(source: &InstanceSource) -> InstanceSource {
    match source {
        InstanceSource::Shared(shared) => InstanceSource::Shared(Rc::clone(shared)),
        InstanceSource::Pool(pool) => InstanceSource::Pool(Rc::clone(pool)),
    }
}

async fn run_once(source: &InstanceSource) -> Result<(), String> {
    match source {
        InstanceSource::Shared(shared) => {
            let mut instance = shared.lock().await;
            instance.run().await
        }
        InstanceSource::Pool(pool) => {
            let mut instance = pool.checkout().await;
            let result = instance.run().await;
            pool.give_back(instance);
            result
        }
    }
}

fn panic_message(join_err: tokio::task::JoinError) -> String {
    match join_err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "workload panicked with a non-string payload".to_string()
            }
        }
        Err(join_err) => format!("invocation task was cancelled: {join_err}"),
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
                executor: ExecutorKind::Cooperative,
                max_concurrency: NonZeroUsize::new(8).unwrap(),
                per_worker_instance: false,
            },
            counter: Arc::clone(&counter),
        });
        let registry = Arc::new(Registry::new());
        let exec =
            CooperativeExecutor::new(Arc::clone(&task), Arc::clone(&registry), Instant::now());
        exec.setup().unwrap();

        for _ in 0..20 {
            exec.wait_available();
            exec.submit();
        }
        exec.finish();

        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(registry.len(), 20);
        assert!(registry.slice(None, None).iter().all(|r| r.finished));
    }

    #[test]
    fn per_worker_instance_pool_round_trips() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn Task> = Arc::new(CountingTask {
            config: TaskConfig {
                executor: ExecutorKind::Cooperative,
                max_concurrency: NonZeroUsize::new(5).unwrap(),
                per_worker_instance: true,
            },
            counter: Arc::clone(&counter),
        });
        let registry = Arc::new(Registry::new());
        let exec =
            CooperativeExecutor::new(Arc::clone(&task), Arc::clone(&registry), Instant::now());
        exec.setup().unwrap();

        for _ in 0..15 {
            exec.wait_available();
            exec.submit();
        }
        exec.finish();

        assert_eq!(counter.load(Ordering::SeqCst), 15);
        assert_eq!(registry.len(), 15);
    }
}
