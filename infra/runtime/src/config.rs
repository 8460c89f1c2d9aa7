use serde::Deserialize;
use std::sync::OnceLock;
use std::thread::available_parallelism;

/// The default number of worker threads if detection fails.
const DEFAULT_WORKER_THREADS: usize = 4;
const MAX_WORKER_THREADS: usize = 1024;
/// The default stack size for runtime threads (2 `MiB`).
const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
/// Minimum allowed stack size (64 `KiB`).
const MIN_STACK_SIZE: usize = 64 * 1024;
/// Maximum allowed stack size (16 `MiB`).
const MAX_STACK_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_THREAD_NAME: &str = "courier-worker";
const WORKER_THREADS_ENV: &str = "COURIER_WORKER_THREADS";

static WORKER_THREADS: OnceLock<usize> = OnceLock::new();

/// Detects the worker count from `COURIER_WORKER_THREADS` or the hardware.
fn get_worker_threads() -> usize {
    *WORKER_THREADS.get_or_init(|| {
        parse_worker_threads(std::env::var(WORKER_THREADS_ENV).ok().as_deref()).unwrap_or_else(
            || available_parallelism().map(std::num::NonZero::get).unwrap_or(DEFAULT_WORKER_THREADS),
        )
    })
}

fn parse_worker_threads(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok()).filter(|&n| n > 0 && n <= MAX_WORKER_THREADS)
}

fn validate_stack_size(stack_size: usize) -> usize {
    stack_size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE)
}

fn normalize_thread_name(name: String) -> String {
    if name.trim().is_empty() { DEFAULT_THREAD_NAME.to_owned() } else { name }
}

/// What a bounded queue does with a task that arrives while it is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The submitter waits until a worker frees a slot.
    ///
    /// Tasks submitted by the pool's own workers are accepted past the bound
    /// instead; a submitter inside an async runtime gets
    /// [`crate::ExecutorError::QueueFull`].
    #[default]
    Block,
    /// The submission fails with [`crate::ExecutorError::QueueFull`].
    Reject,
    /// The new task is discarded and counted as dropped.
    DropNewest,
}

/// Queue sizing of a [`crate::WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    Unbounded,
    Bounded(usize),
}

/// Configuration of a [`crate::WorkerPool`].
///
/// Deserializes with defaults for every missing field, so a partial
/// `[pool]` table in a config file is enough.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub worker_threads: usize,
    pub stack_size: usize,
    pub thread_name: String,
    /// Maximum number of queued tasks; `0` means unbounded.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: get_worker_threads(),
            stack_size: DEFAULT_STACK_SIZE,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
        }
    }
}

impl PoolConfig {
    /// Preset with one worker, which keeps handler executions in submission order.
    #[must_use = "Use this configuration when handlers must run in FIFO order"]
    pub fn single_threaded() -> Self {
        Self { worker_threads: 1, thread_name: "courier-serial".to_owned(), ..Self::default() }
    }

    #[must_use = "Customize the number of worker threads"]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.clamp(1, MAX_WORKER_THREADS);
        self
    }

    #[must_use = "Customize the stack size for worker threads"]
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = validate_stack_size(size);
        self
    }

    #[must_use = "Customize the thread name prefix"]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = normalize_thread_name(name.into());
        self
    }

    #[must_use = "Customize the queue capacity"]
    pub const fn with_queue(mut self, capacity: QueueCapacity) -> Self {
        self.queue_capacity = match capacity {
            QueueCapacity::Unbounded => 0,
            QueueCapacity::Bounded(n) => if n == 0 { 1 } else { n },
        };
        self
    }

    #[must_use = "Customize the overflow policy of a bounded queue"]
    pub const fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Queue sizing derived from `queue_capacity`.
    #[must_use]
    pub const fn queue(&self) -> QueueCapacity {
        match self.queue_capacity {
            0 => QueueCapacity::Unbounded,
            n => QueueCapacity::Bounded(n),
        }
    }

    /// Returns a copy with every field clamped to its valid range.
    ///
    /// Values read from files or the environment skip the `with_*` setters,
    /// so the pool normalizes again before spawning threads.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            worker_threads: self.worker_threads.clamp(1, MAX_WORKER_THREADS),
            stack_size: validate_stack_size(self.stack_size),
            thread_name: normalize_thread_name(self.thread_name.clone()),
            queue_capacity: self.queue_capacity,
            overflow: self.overflow,
        }
    }
}
