//! Convenient re-exports for common types and traits

pub use crate::core::{
    ClosureConsumer, ConsumeError, ConsumeResult, Consumer, PoolError, Result, ThreadPriority,
};
pub use crate::pool::{PoolConfig, PriorityPool, WorkerStats};
