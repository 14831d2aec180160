//! Consumer trait and related types

use crate::core::error::BoxError;
use std::fmt;

/// Outcome of consuming one item
pub type ConsumeResult<T> = std::result::Result<(), ConsumeError<T>>;

/// Why a consumer did not finish an item
pub enum ConsumeError<T> {
    /// Processing was interrupted before the item was fully claimed.
    ///
    /// The item is handed back and returned to the queue; this never
    /// surfaces to the pool's caller.
    Interrupted(T),
    /// Processing failed. The first failure in a pool is captured and
    /// raised at the next synchronization call; the failing worker stops.
    Failed(BoxError),
}

impl<T> ConsumeError<T> {
    /// Create a failure from anything convertible into a boxed error
    pub fn failed(error: impl Into<BoxError>) -> Self {
        ConsumeError::Failed(error.into())
    }

    /// Whether the item was handed back
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ConsumeError::Interrupted(_))
    }
}

impl<T, E> From<E> for ConsumeError<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        ConsumeError::Failed(Box::new(error))
    }
}

impl<T> fmt::Debug for ConsumeError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumeError::Interrupted(_) => f.write_str("Interrupted(..)"),
            ConsumeError::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Processes items dequeued by the pool's workers
///
/// `consume` runs on a worker thread, outside every pool lock, once per
/// dequeued item.
pub trait Consumer<T>: Send + Sync {
    /// Process one item
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::Failed`] to end the calling worker and record
    /// the error, or [`ConsumeError::Interrupted`] to put the item back.
    fn consume(&self, item: T) -> ConsumeResult<T>;

    /// Name used in logs
    fn name(&self) -> &str {
        "Consumer"
    }
}

/// Helper to create a consumer from a closure
pub struct ClosureConsumer<F> {
    closure: F,
    name: String,
}

impl<F> ClosureConsumer<F> {
    /// Create a new closure consumer
    pub fn new<T>(closure: F) -> Self
    where
        F: Fn(T) -> ConsumeResult<T> + Send + Sync,
    {
        Self {
            closure,
            name: "ClosureConsumer".to_string(),
        }
    }

    /// Create a new closure consumer with a custom name
    pub fn with_name<T, S: Into<String>>(closure: F, name: S) -> Self
    where
        F: Fn(T) -> ConsumeResult<T> + Send + Sync,
    {
        Self {
            closure,
            name: name.into(),
        }
    }
}

impl<T, F> Consumer<T> for ClosureConsumer<F>
where
    F: Fn(T) -> ConsumeResult<T> + Send + Sync,
{
    fn consume(&self, item: T) -> ConsumeResult<T> {
        (self.closure)(item)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
