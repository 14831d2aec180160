//! Error types for the priority pool

/// Boxed error returned by consumers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in the priority pool
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// A consumer returned an error while processing an item
    #[error("Consumer failed on worker #{worker_id}: {source}")]
    CallbackFailed {
        /// ID of the worker that ran the consumer
        worker_id: usize,
        /// Error returned by the consumer
        #[source]
        source: BoxError,
    },

    /// A consumer panicked while processing an item
    #[error("Consumer panicked on worker #{worker_id}: {message}")]
    CallbackPanicked {
        /// ID of the worker that ran the consumer
        worker_id: usize,
        /// Panic message
        message: String,
    },

    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker thread #{thread_id}: {message}")]
    SpawnError {
        /// ID of the thread that failed to spawn
        thread_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{thread_id}: {message}")]
    JoinError {
        /// ID of the thread that failed to join
        thread_id: usize,
        /// Error message
        message: String,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Waiting on a pool that has no workers to drain it
    #[error("Pool is not started ({pending} items queued)")]
    NotStarted {
        /// Number of queued items
        pending: usize,
    },

    /// Waiting on a started pool whose workers have all ended
    #[error("No live workers left ({pending} items queued)")]
    NoLiveWorkers {
        /// Number of queued items
        pending: usize,
    },

    /// A thread watcher could not be set up
    #[error("Thread watcher failed: {message}")]
    WatcherFailed {
        /// Error message
        message: String,
    },
}

impl PoolError {
    /// Create a callback failure error
    pub fn callback_failed(worker_id: usize, source: impl Into<BoxError>) -> Self {
        PoolError::CallbackFailed {
            worker_id,
            source: source.into(),
        }
    }

    /// Create a callback panic error
    pub fn callback_panicked(worker_id: usize, message: impl Into<String>) -> Self {
        PoolError::CallbackPanicked {
            worker_id,
            message: message.into(),
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        thread_id: usize,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        PoolError::SpawnError {
            thread_id,
            message: message.into(),
            source,
        }
    }

    /// Create a join error
    pub fn join(thread_id: usize, message: impl Into<String>) -> Self {
        PoolError::JoinError {
            thread_id,
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a not started error
    pub fn not_started(pending: usize) -> Self {
        PoolError::NotStarted { pending }
    }

    /// Create a no live workers error
    pub fn no_live_workers(pending: usize) -> Self {
        PoolError::NoLiveWorkers { pending }
    }

    /// Create a watcher error
    pub fn watcher(message: impl Into<String>) -> Self {
        PoolError::WatcherFailed {
            message: message.into(),
        }
    }

    /// Whether this error was produced by a consumer callback
    pub fn is_callback_error(&self) -> bool {
        matches!(
            self,
            PoolError::CallbackFailed { .. } | PoolError::CallbackPanicked { .. }
        )
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
