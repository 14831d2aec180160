//! First-error capture shared by a pool's workers and controller

use crate::core::{PoolError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

enum SinkState {
    Empty,
    Pending(PoolError),
    Reported,
}

/// Holds the first consumer error raised in a pool.
///
/// Only the first [`record`](Self::record) lands; later errors are dropped.
/// [`check`](Self::check) hands the captured error out exactly once.
pub struct ErrorSink {
    state: Mutex<SinkState>,
    failed: AtomicBool,
}

impl ErrorSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState::Empty),
            failed: AtomicBool::new(false),
        }
    }

    /// Record an error if none was recorded before.
    ///
    /// Hands the error back when the sink already held one.
    pub fn record(&self, error: PoolError) -> std::result::Result<(), PoolError> {
        let mut state = self.state.lock();
        match *state {
            SinkState::Empty => {
                *state = SinkState::Pending(error);
                self.failed.store(true, Ordering::Release);
                Ok(())
            }
            _ => Err(error),
        }
    }

    /// Raise the captured error if it has not been raised yet
    pub fn check(&self) -> Result<()> {
        if !self.failed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SinkState::Reported) {
            SinkState::Pending(error) => Err(error),
            SinkState::Empty => {
                *state = SinkState::Empty;
                Ok(())
            }
            SinkState::Reported => Ok(()),
        }
    }

    /// Whether any error was ever recorded
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Whether a recorded error is still waiting to be raised
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), SinkState::Pending(_))
    }
}

impl Default for ErrorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.state.lock() {
            SinkState::Empty => "empty",
            SinkState::Pending(_) => "pending",
            SinkState::Reported => "reported",
        };
        f.debug_struct("ErrorSink").field("state", &state).finish()
    }
}
