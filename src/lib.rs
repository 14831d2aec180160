//! # Rust Priority Pool
//!
//! An in-process worker pool that hands each free worker the smallest queued
//! item, as ranked by a comparison function, rather than the oldest one.
//!
//! ## Features
//!
//! - **Priority Dispatch**: Binary min-heap ordered by any `Fn(&T, &T) -> Ordering`
//! - **Pause/Resume**: Pool-wide, never preempting an item in flight
//! - **Two Ways Down**: Immediate `stop` that hands back queued items, or drained `shutdown`
//! - **First-Error Capture**: The first consumer failure or panic surfaces once on the producer side
//! - **Worker Statistics**: Per-worker processed/failed/requeued counters
//! - **Thread Watcher**: Run a callback once a thread has finished
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_priority_pool::prelude::*;
//!
//! # fn main() -> Result<()> {
//! // Smallest number first
//! let pool = PriorityPool::natural(4, |job: u32| {
//!     println!("Processing job {}", job);
//!     Ok(())
//! })?;
//!
//! for job in [5, 3, 8, 1] {
//!     pool.produce(job)?;
//! }
//! pool.start()?;
//!
//! // Drain the queue and join the workers
//! pool.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Ordering and Configuration
//!
//! ```rust
//! use rust_priority_pool::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Task {
//!     urgency: u8,
//!     name: String,
//! }
//!
//! # fn main() -> Result<()> {
//! let config = PoolConfig::new(2)
//!     .with_thread_name_prefix("tasks")
//!     .with_priority(ThreadPriority::MAX);
//!
//! // Most urgent first
//! let pool = PriorityPool::with_config(
//!     config,
//!     |a: &Task, b: &Task| b.urgency.cmp(&a.urgency),
//!     |task: Task| {
//!         println!("{} ({})", task.name, task.urgency);
//!         Ok(())
//!     },
//! )?;
//! pool.start()?;
//! pool.produce(Task { urgency: 9, name: "page on-call".into() })?;
//! pool.wait_until_queue_empty()?;
//! # pool.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Consumers
//!
//! ```rust
//! use rust_priority_pool::prelude::*;
//!
//! struct Indexer;
//!
//! impl Consumer<u64> for Indexer {
//!     fn consume(&self, doc_id: u64) -> ConsumeResult<u64> {
//!         if doc_id == 0 {
//!             return Err(ConsumeError::failed("document 0 is reserved"));
//!         }
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "Indexer"
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let pool = PriorityPool::with_consumer(PoolConfig::new(2), |a: &u64, b: &u64| a.cmp(b), Indexer)?;
//! pool.start()?;
//! pool.produce(0)?;
//!
//! // The failure is raised once, at the next checkpoint
//! assert!(pool.shutdown().is_err());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod watcher;

pub use core::{
    BoxError, ClosureConsumer, ConsumeError, ConsumeResult, Consumer, PoolError, Result,
    ThreadPriority,
};
pub use pool::{PoolConfig, PriorityPool, WorkerState, WorkerStats};
