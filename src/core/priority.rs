//! Worker thread scheduling priority

use crate::core::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling priority for worker threads (higher number = higher priority)
///
/// Values range from [`ThreadPriority::MIN`] to [`ThreadPriority::MAX`].
/// The pool applies the configured priority to every worker it creates in
/// [`start`](crate::PriorityPool::start); changing it later affects the next start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ThreadPriority(u8);

impl ThreadPriority {
    /// Lowest priority - background workers
    pub const MIN: ThreadPriority = ThreadPriority(1);
    /// Normal priority - default for most pools
    pub const NORM: ThreadPriority = ThreadPriority(5);
    /// Highest priority
    pub const MAX: ThreadPriority = ThreadPriority(10);

    /// Create a priority, validating the range
    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Ok(ThreadPriority(value))
        } else {
            Err(PoolError::invalid_config(
                "priority",
                format!(
                    "priority {} outside {}..={}",
                    value,
                    Self::MIN.0,
                    Self::MAX.0
                ),
            ))
        }
    }

    /// Get the numeric value of the priority
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for ThreadPriority {
    fn default() -> Self {
        Self::NORM
    }
}

impl TryFrom<u8> for ThreadPriority {
    type Error = PoolError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ThreadPriority> for u8 {
    fn from(priority: ThreadPriority) -> u8 {
        priority.0
    }
}

impl fmt::Display for ThreadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(ThreadPriority::MAX > ThreadPriority::NORM);
        assert!(ThreadPriority::NORM > ThreadPriority::MIN);
    }

    #[test]
    fn test_priority_value() {
        assert_eq!(ThreadPriority::MIN.value(), 1);
        assert_eq!(ThreadPriority::NORM.value(), 5);
        assert_eq!(ThreadPriority::MAX.value(), 10);
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(ThreadPriority::default(), ThreadPriority::NORM);
    }

    #[test]
    fn test_priority_range() {
        assert!(ThreadPriority::new(0).is_err());
        assert!(ThreadPriority::new(11).is_err());
        assert_eq!(ThreadPriority::new(7).unwrap().value(), 7);
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&ThreadPriority::MAX).unwrap();
        assert_eq!(json, "10");

        let parsed: ThreadPriority = serde_json::from_str("3").unwrap();
        assert_eq!(parsed.value(), 3);

        assert!(serde_json::from_str::<ThreadPriority>("42").is_err());
    }
}
