use crate::config::{OverflowPolicy, PoolConfig, QueueCapacity};
use crate::error::{ExecutorError, ExecutorErrorExt};
use crate::executor::{Executor, Task};
use parking_lot::RwLock;
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, trace, warn};

/// How long an idle blocking thread stays alive.
const THREAD_KEEP_ALIVE: Duration = Duration::from_secs(60);
/// How long shutdown waits for the runtime's threads once the queue is drained.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the pool that owns the current thread, `0` for foreign threads.
    static WORKER_OF: Cell<u64> = const { Cell::new(0) };
}

struct Shared {
    id: u64,
    /// `None` for an unbounded queue.
    permits: Option<Arc<Semaphore>>,
    capacity: QueueCapacity,
    overflow: OverflowPolicy,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    queued: AtomicUsize,
    idle: Notify,
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn on_own_worker(&self) -> bool {
        WORKER_OF.with(Cell::get) == self.id
    }

    fn run(&self, task: Task, permit: Option<OwnedSemaphorePermit>) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
        if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
            self.panicked.fetch_add(1, Ordering::AcqRel);
            warn!(panic = %panic_message(&*panic), "Task panicked on worker thread");
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
        drop(permit);
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_one();
        }
    }

    async fn drained(&self) {
        while self.in_flight.load(Ordering::Acquire) > 0 {
            self.idle.notified().await;
        }
    }
}

/// A fixed number of named worker threads fed from a shared FIFO queue.
///
/// The pool owns a Tokio runtime and runs every task through `spawn_blocking`,
/// with the blocking pool capped at the configured worker count. A bounded
/// queue is a [`Semaphore`] holding one permit per worker plus one per queue
/// slot; when it runs dry the configured [`OverflowPolicy`] applies. A
/// panicking task is caught and counted, the worker keeps running.
///
/// Tasks submitted from one of the pool's own workers never wait for a slot:
/// under [`OverflowPolicy::Block`] they are accepted past the bound, since
/// only the workers themselves could free one.
///
/// # Example
/// ```rust
/// use courier_runtime::{Executor, OverflowPolicy, PoolConfig, QueueCapacity, WorkerPool};
///
/// # fn main() -> Result<(), courier_runtime::ExecutorError> {
/// let config = PoolConfig::default()
///     .with_worker_threads(2)
///     .with_queue(QueueCapacity::Bounded(64))
///     .with_overflow(OverflowPolicy::Reject);
/// let pool = WorkerPool::new(&config)?;
/// pool.execute(Box::new(|| {}))?;
/// pool.shutdown();
/// assert_eq!(pool.completed(), 1);
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
    runtime: RwLock<Option<Runtime>>,
    workers: usize,
    name: String,
}

impl WorkerPool {
    /// Builds the runtime described by `config`.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Spawn`] if the runtime cannot start its threads.
    pub fn new(config: &PoolConfig) -> Result<Self, ExecutorError> {
        let config = config.normalized();
        debug!(config = ?config, "Building worker pool");

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let permits = match config.queue() {
            QueueCapacity::Unbounded => None,
            QueueCapacity::Bounded(slots) => Some(Arc::new(Semaphore::new(
                slots.saturating_add(config.worker_threads).min(Semaphore::MAX_PERMITS),
            ))),
        };

        let prefix = config.thread_name.clone();
        let index = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads)
            .thread_name_fn(move || {
                format!("{prefix}-{}", index.fetch_add(1, Ordering::Relaxed))
            })
            .thread_stack_size(config.stack_size)
            .thread_keep_alive(THREAD_KEEP_ALIVE)
            .on_thread_start(move || WORKER_OF.with(|owner| owner.set(id)))
            .build()
            .context(format!("Failed to start worker pool '{}'", config.thread_name))?;

        let pool = Self {
            shared: Arc::new(Shared {
                id,
                permits,
                capacity: config.queue(),
                overflow: config.overflow,
                closed: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                idle: Notify::new(),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                panicked: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            runtime: RwLock::new(Some(runtime)),
            workers: config.worker_threads,
            name: config.thread_name,
        };

        info!(
            pool = %pool.name,
            workers = pool.workers,
            capacity = ?pool.shared.capacity,
            overflow = ?pool.shared.overflow,
            "Worker pool started"
        );
        Ok(pool)
    }

    /// Stops accepting tasks, lets the workers drain every accepted task and
    /// shuts the runtime down.
    ///
    /// Submitters blocked on a full queue wake up with [`ExecutorError::ShutDown`].
    /// Called from one of the pool's own tasks, or from inside any Tokio
    /// runtime, the drain continues on a separate thread and this returns
    /// right away.
    pub fn shutdown(&self) {
        if let Some(permits) = &self.shared.permits {
            permits.close();
        }
        let runtime = {
            let mut runtime = self.runtime.write();
            self.shared.closed.store(true, Ordering::Release);
            runtime.take()
        };
        let Some(runtime) = runtime else {
            return;
        };

        if self.shared.on_own_worker() || Handle::try_current().is_ok() {
            let shared = Arc::clone(&self.shared);
            let name = self.name.clone();
            let reaper = thread::Builder::new()
                .name(format!("{}-shutdown", self.name))
                .spawn(move || drain_and_stop(&shared, runtime, &name));
            if let Err(err) = reaper {
                warn!(pool = %self.name, error = %err, "Failed to spawn shutdown thread");
            }
            return;
        }
        drain_and_stop(&self.shared, runtime, &self.name);
    }

    /// Number of worker threads, `0` once the pool is shut down.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.runtime.read().is_some() { self.workers } else { 0 }
    }

    /// Number of tasks accepted into the queue.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.shared.submitted.load(Ordering::Acquire)
    }

    /// Number of tasks that finished running, panicked ones included.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Acquire)
    }

    /// Number of tasks discarded by [`OverflowPolicy::DropNewest`].
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Acquire)
    }

    /// Number of tasks waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn shut_down_error(&self) -> ExecutorError {
        ExecutorError::ShutDown {
            message: "worker pool no longer accepts tasks".into(),
            context: Some(self.name.clone().into()),
        }
    }

    /// Takes a queue slot according to the overflow policy.
    ///
    /// `Ok(None)` means the queue is unbounded or the task is accepted past
    /// the bound.
    fn reserve(&self) -> Result<Option<OwnedSemaphorePermit>, ExecutorError> {
        let Some(permits) = &self.shared.permits else {
            return Ok(None);
        };
        match Arc::clone(permits).try_acquire_owned() {
            Ok(permit) => return Ok(Some(permit)),
            Err(TryAcquireError::Closed) => return Err(self.shut_down_error()),
            Err(TryAcquireError::NoPermits) => {},
        }

        match self.shared.overflow {
            OverflowPolicy::Block if self.shared.on_own_worker() => {
                trace!(pool = %self.name, "Queue full; accepting task from a worker past the bound");
                Ok(None)
            },
            OverflowPolicy::Block => {
                if Handle::try_current().is_ok() {
                    return Err(ExecutorError::QueueFull {
                        message: "cannot wait for a free slot inside an async runtime".into(),
                        context: Some(self.name.clone().into()),
                    });
                }
                let Some(handle) = self.runtime.read().as_ref().map(|rt| rt.handle().clone())
                else {
                    return Err(self.shut_down_error());
                };
                trace!(pool = %self.name, "Queue full; waiting for a free slot");
                handle
                    .block_on(Arc::clone(permits).acquire_owned())
                    .map(Some)
                    .map_err(|_| self.shut_down_error())
            },
            OverflowPolicy::Reject => Err(ExecutorError::QueueFull {
                message: format!("{} tasks already queued", self.queued()).into(),
                context: Some(self.name.clone().into()),
            }),
            OverflowPolicy::DropNewest => {
                self.shared.dropped.fetch_add(1, Ordering::AcqRel);
                warn!(pool = %self.name, "Queue full; task dropped");
                Err(ExecutorError::Dropped {
                    message: "queue full".into(),
                    context: Some(self.name.clone().into()),
                })
            },
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        let permit = self.reserve()?;

        let state = self.runtime.read();
        let Some(runtime) = state.as_ref().filter(|_| !self.is_shut_down()) else {
            return Err(self.shut_down_error());
        };

        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        self.shared.submitted.fetch_add(1, Ordering::AcqRel);

        let shared = Arc::clone(&self.shared);
        drop(runtime.spawn_blocking(move || shared.run(task, permit)));
        Ok(())
    }

    fn shutdown(&self) {
        Self::shutdown(self);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("capacity", &self.shared.capacity)
            .field("overflow", &self.shared.overflow)
            .field("submitted", &self.submitted())
            .field("completed", &self.completed())
            .finish_non_exhaustive()
    }
}

/// Waits until every accepted task has run, then stops the runtime.
fn drain_and_stop(shared: &Shared, runtime: Runtime, name: &str) {
    runtime.block_on(shared.drained());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    debug!(
        pool = %name,
        completed = shared.completed.load(Ordering::Acquire),
        dropped = shared.dropped.load(Ordering::Acquire),
        "Worker pool stopped"
    );
}

/// Extracts a readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*payload), "static str");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[test]
    fn test_pool_reports_requested_workers() {
        let pool = WorkerPool::new(&PoolConfig::default().with_worker_threads(3))
            .expect("pool starts");
        assert_eq!(pool.worker_count(), 3);

        pool.shutdown();
        assert_eq!(pool.worker_count(), 0);
        assert!(pool.is_shut_down());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::new(&PoolConfig::single_threaded()).expect("pool starts");
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_shut_down());
    }

    #[test]
    fn test_workers_are_named_after_the_pool() {
        let config = PoolConfig::single_threaded().with_thread_name("orders");
        let pool = WorkerPool::new(&config).expect("pool starts");
        let (tx, rx) = mpsc::channel();

        pool.execute(Box::new(move || {
            let name = thread::current().name().map(str::to_owned);
            tx.send(name).expect("test alive");
        }))
        .expect("accepted");

        let name = rx.recv_timeout(Duration::from_secs(5)).expect("task ran").expect("named");
        assert!(name.starts_with("orders-"), "{name}");
    }

    #[test]
    fn test_worker_marker_is_per_pool() {
        let pool = WorkerPool::new(&PoolConfig::single_threaded()).expect("pool starts");
        assert!(!pool.shared.on_own_worker());

        let shared = Arc::clone(&pool.shared);
        let (tx, rx) = mpsc::channel();
        pool.execute(Box::new(move || tx.send(shared.on_own_worker()).expect("test alive")))
            .expect("accepted");

        assert!(rx.recv_timeout(Duration::from_secs(5)).expect("task ran"));
    }
}
