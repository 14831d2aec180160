//! Run a callback once a thread has finished.
//!
//! Both functions start a detached watcher thread. The callback runs exactly
//! once, on the watcher thread, after the watched thread is done.
//!
//! ```rust
//! use rust_priority_pool::watcher;
//! use std::sync::mpsc;
//! use std::thread;
//!
//! # fn main() -> rust_priority_pool::Result<()> {
//! let (tx, rx) = mpsc::channel();
//! let worker = thread::spawn(|| 6 * 7);
//! watcher::watch(worker, move || tx.send("finished").unwrap())?;
//! assert_eq!(rx.recv().unwrap(), "finished");
//! # Ok(())
//! # }
//! ```

use crate::core::error::panic_message;
use crate::core::{PoolError, Result};
use crossbeam_channel::{bounded, Sender};
use log::{debug, warn};
use std::cell::RefCell;
use std::thread::{self, JoinHandle};

thread_local! {
    /// Never sent on; dropping them at thread exit disconnects the watchers
    static EXIT_SIGNALS: RefCell<Vec<Sender<()>>> = const { RefCell::new(Vec::new()) };
}

/// Call `callback` once `target` has finished.
///
/// A target that panicked has finished too: the panic is logged and the
/// callback still runs.
///
/// # Errors
///
/// Returns [`PoolError::WatcherFailed`] if the watcher thread cannot be created.
pub fn watch<R, F>(target: JoinHandle<R>, callback: F) -> Result<()>
where
    R: Send + 'static,
    F: FnOnce() + Send + 'static,
{
    let watched = describe(target.thread());
    spawn_watcher(move || {
        if let Err(payload) = target.join() {
            warn!(
                "watched thread {} panicked: {}",
                watched,
                panic_message(payload.as_ref())
            );
        }
        debug!("watched thread {} finished", watched);
        callback();
    })
}

/// Call `callback` once the calling thread has finished.
///
/// The watcher is released when the calling thread's thread-locals are torn
/// down, after its closure has returned. Threads whose thread-locals are never
/// destroyed, such as the main thread at process exit, never fire it.
///
/// The callback can start while the thread is still running its remaining
/// thread-local destructors, so it must not rely on state those destructors
/// touch. Use [`watch`] with the thread's [`JoinHandle`] when the callback has
/// to run strictly after the thread has ended.
///
/// # Errors
///
/// Returns [`PoolError::WatcherFailed`] if the calling thread is already
/// tearing down or the watcher thread cannot be created.
pub fn on_thread_exit<F>(callback: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let (signal, exited) = bounded::<()>(0);
    EXIT_SIGNALS
        .try_with(|signals| signals.borrow_mut().push(signal))
        .map_err(|_| PoolError::watcher("calling thread is already exiting"))?;

    let watched = describe(&thread::current());
    spawn_watcher(move || {
        // only ever returns on disconnect
        let _ = exited.recv();
        debug!("watched thread {} finished", watched);
        callback();
    })
}

fn spawn_watcher<F>(body: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name("thread-watcher".to_string())
        .spawn(body)
        .map(drop)
        .map_err(|e| PoolError::watcher(format!("cannot create watcher thread: {}", e)))
}

fn describe(thread: &thread::Thread) -> String {
    match thread.name() {
        Some(name) => format!("'{}'", name),
        None => format!("{:?}", thread.id()),
    }
}
