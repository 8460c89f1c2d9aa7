use crate::error::ExecutorError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// A zero-argument unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs tasks on some thread, eventually.
///
/// Implementations must not block the submitter beyond enqueueing, except
/// where a bounded queue is explicitly configured to block.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Hands `task` over for execution.
    ///
    /// # Errors
    /// Returns an [`ExecutorError`] if the task was not accepted; the task is
    /// dropped without running in that case.
    fn execute(&self, task: Task) -> Result<(), ExecutorError>;

    /// Stops accepting new tasks. Tasks already accepted may still run.
    fn shutdown(&self) {}
}

/// Runs tasks on the blocking thread pool of a Tokio runtime.
///
/// Handlers are synchronous, so they go through `spawn_blocking` rather than
/// occupying the async workers.
pub struct TokioExecutor {
    handle: Handle,
    closed: AtomicBool,
}

impl TokioExecutor {
    /// Wraps an existing runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle, closed: AtomicBool::new(false) }
    }

    /// Wraps the runtime the caller is currently running on.
    ///
    /// # Errors
    /// Returns [`ExecutorError::NoRuntime`] when called outside a Tokio runtime.
    pub fn current() -> Result<Self, ExecutorError> {
        Handle::try_current().map(Self::new).map_err(|e| ExecutorError::NoRuntime {
            message: e.to_string().into(),
            context: Some("TokioExecutor::current".into()),
        })
    }

    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl fmt::Debug for TokioExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioExecutor")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecutorError::ShutDown {
                message: "tokio executor no longer accepts tasks".into(),
                context: None,
            });
        }
        trace!("Spawning blocking task");
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Tokio executor closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_current_outside_runtime_fails() {
        let result = TokioExecutor::current();
        assert!(matches!(result, Err(ExecutorError::NoRuntime { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_executor_runs_task() {
        let executor = TokioExecutor::current().expect("inside runtime");
        let (tx, rx) = mpsc::channel();

        executor
            .execute(Box::new(move || {
                tx.send(7).expect("receiver alive");
            }))
            .expect("task accepted");

        let value = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .expect("join")
            .expect("task ran");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_tokio_executor_rejects_after_shutdown() {
        let executor = TokioExecutor::current().expect("inside runtime");
        executor.shutdown();

        let result = executor.execute(Box::new(|| {}));
        assert!(matches!(result, Err(ExecutorError::ShutDown { .. })));
    }
}
