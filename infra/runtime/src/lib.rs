//! # Runtime
//!
//! Executors that run event handlers away from the thread that posted the event.
//!
//! The event bus only needs one contract from this crate: [`Executor`], which
//! accepts a zero-argument [`Task`] and runs it on some thread, eventually.
//!
//! ## Executors
//! * [`WorkerPool`]: an owned Tokio runtime whose blocking threads are the
//!   workers. The queue is either unbounded or bounded by a semaphore with an
//!   explicit [`OverflowPolicy`] (block, reject, drop), configured through
//!   [`PoolConfig`].
//! * [`TokioExecutor`]: forwards tasks to `spawn_blocking` on an existing
//!   Tokio runtime.
//!
//! ## Example
//!
//! ```rust
//! use courier_runtime::{Executor, PoolConfig, WorkerPool};
//! use std::sync::mpsc;
//!
//! # fn main() -> Result<(), courier_runtime::ExecutorError> {
//! let pool = WorkerPool::new(&PoolConfig::single_threaded())?;
//! let (tx, rx) = mpsc::channel();
//!
//! pool.execute(Box::new(move || tx.send("done").unwrap()))?;
//! assert_eq!(rx.recv().unwrap(), "done");
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod executor;
mod pool;

pub use config::{OverflowPolicy, PoolConfig, QueueCapacity};
pub use error::{ExecutorError, ExecutorErrorExt};
pub use executor::{Executor, Task, TokioExecutor};
pub use pool::{WorkerPool, panic_message};
