//! Priority queue used by the pool.
//!
//! - [`PriorityHeap`]: array-backed binary min-heap ordered by a comparison function
//! - [`SharedQueue`]: the heap behind the single mutex/condition pair that a
//!   pool's controller and workers synchronize on

mod heap;
mod shared;

pub use heap::{OrderingFn, PriorityHeap, DEFAULT_CAPACITY};
pub use shared::{QueueState, SharedQueue};
