//! Core types and traits for the priority pool

pub mod consumer;
pub mod error;
pub mod priority;

pub use consumer::{ClosureConsumer, ConsumeError, ConsumeResult, Consumer};
pub use error::{BoxError, PoolError, Result};
pub use priority::ThreadPriority;
