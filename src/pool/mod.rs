//! Priority pool, its workers and configuration

pub mod config;
pub mod error_sink;
pub mod priority_pool;
pub mod worker;

pub use config::PoolConfig;
pub use error_sink::ErrorSink;
pub use priority_pool::PriorityPool;
pub use worker::{Worker, WorkerFlags, WorkerState, WorkerStats};
