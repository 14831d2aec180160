//! Configuration for the priority pool

use crate::core::{PoolError, Result, ThreadPriority};
use crate::queue::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`PriorityPool`](crate::PriorityPool)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads (0 = number of CPUs)
    pub num_threads: usize,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Scheduling priority given to workers on the next start
    pub priority: ThreadPriority,
    /// Pause between polls in controller-side waits.
    ///
    /// `pause`, `wait_until_queue_empty` and `wait_until_idle` poll worker and
    /// queue state rather than waiting on a condition. With a zero interval
    /// (the default) they spin briefly and then yield the scheduler on every
    /// pass; a non-zero interval sleeps that long between passes instead,
    /// trading latency for CPU.
    pub poll_interval: Duration,
    /// Starting capacity of the queue's backing storage
    pub initial_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            thread_name_prefix: "pool-worker".to_string(),
            priority: ThreadPriority::default(),
            poll_interval: Duration::ZERO,
            initial_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with specified number of threads
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: if num_threads == 0 {
                num_cpus::get()
            } else {
                num_threads
            },
            ..Default::default()
        }
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: PoolConfig = serde_json::from_str(json)
            .map_err(|e| PoolError::invalid_config("json", e.to_string()))?;
        if config.num_threads == 0 {
            config.num_threads = num_cpus::get();
        }
        config.validate()?;
        Ok(config)
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set worker scheduling priority
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the controller-side poll interval.
    ///
    /// # Trade-offs
    ///
    /// - **Zero** (default): spin-then-yield; lowest latency, busiest CPU
    /// - **Short intervals** (1-10ms): modest latency, little CPU
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the queue's starting capacity
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(PoolError::invalid_config(
                "num_threads",
                "Number of threads must be greater than 0",
            ));
        }
        if self.initial_capacity == 0 {
            return Err(PoolError::invalid_config(
                "initial_capacity",
                "Queue capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}
