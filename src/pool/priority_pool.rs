//! Priority pool implementation

use crate::core::{ClosureConsumer, ConsumeResult, Consumer, PoolError, Result, ThreadPriority};
use crate::pool::config::PoolConfig;
use crate::pool::error_sink::ErrorSink;
use crate::pool::worker::{Worker, WorkerContext, WorkerState, WorkerStats};
use crate::queue::SharedQueue;
use crossbeam_utils::Backoff;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// A pool of worker threads that always take the smallest queued item next.
///
/// Items are ordered by a comparison function rather than by arrival. Every
/// method takes `&self`, so a pool can be shared through an [`Arc`], including
/// with its own consumer.
///
/// # Shutdown
///
/// - [`stop`](Self::stop) is immediate: workers finish the item in hand and
///   leave, and whatever is still queued is handed back to the caller.
/// - [`shutdown`](Self::shutdown) is drained: workers empty the queue first.
///
/// # Errors
///
/// The first failure or panic raised by the consumer ends the worker that hit
/// it and is captured. It is raised once, at the next call to
/// [`produce`](Self::produce), [`wait_until_queue_empty`](Self::wait_until_queue_empty),
/// [`wait_until_idle`](Self::wait_until_idle) or [`shutdown`](Self::shutdown).
/// Other workers keep going.
pub struct PriorityPool<T: Send + 'static> {
    config: PoolConfig,
    priority: Mutex<ThreadPriority>,
    queue: Arc<SharedQueue<T>>,
    consumer: Arc<dyn Consumer<T>>,
    errors: Arc<ErrorSink>,
    workers: RwLock<Vec<Arc<Worker>>>,
    started: AtomicBool,
    lifecycle: Mutex<()>,
}

impl<T: Send + 'static> std::fmt::Debug for PriorityPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityPool")
            .field("config", &self.config)
            .field("consumer", &self.consumer.name())
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("queue", &self.queue)
            .field("errors", &self.errors)
            .finish()
    }
}

impl<T: Send + 'static> PriorityPool<T> {
    /// Create a pool of `num_threads` workers (0 = number of CPUs)
    ///
    /// # Arguments
    ///
    /// * `num_threads` - Number of workers started by [`start`](Self::start)
    /// * `ordering` - Ranks items; the smallest is dispatched first
    /// * `consumer` - Called once per dequeued item on a worker thread
    pub fn new<O, F>(num_threads: usize, ordering: O, consumer: F) -> Result<Self>
    where
        O: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static,
        F: Fn(T) -> ConsumeResult<T> + Send + Sync + 'static,
    {
        Self::with_config(PoolConfig::new(num_threads), ordering, consumer)
    }

    /// Create a pool with custom configuration and a closure consumer
    pub fn with_config<O, F>(config: PoolConfig, ordering: O, consumer: F) -> Result<Self>
    where
        O: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static,
        F: Fn(T) -> ConsumeResult<T> + Send + Sync + 'static,
    {
        Self::with_consumer(config, ordering, ClosureConsumer::new(consumer))
    }

    /// Create a pool with custom configuration and a [`Consumer`] implementation
    pub fn with_consumer<O, C>(config: PoolConfig, ordering: O, consumer: C) -> Result<Self>
    where
        O: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static,
        C: Consumer<T> + 'static,
    {
        config.validate()?;

        Ok(Self {
            priority: Mutex::new(config.priority),
            queue: Arc::new(SharedQueue::new(config.initial_capacity, ordering)),
            consumer: Arc::new(consumer),
            errors: Arc::new(ErrorSink::new()),
            workers: RwLock::new(Vec::with_capacity(config.num_threads)),
            started: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            config,
        })
    }

    /// Start the workers. Does nothing if the pool is already started.
    ///
    /// Workers are started at the current [`priority`](Self::priority). If the
    /// pool was paused before starting, they start paused. A pool can be
    /// started again after [`stop`](Self::stop) or [`shutdown`](Self::shutdown).
    pub fn start(&self) -> Result<()> {
        let Some(_lifecycle) = self.lifecycle_guard() else {
            return Ok(());
        };
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let priority = *self.priority.lock();
        let paused = self.queue.is_paused();
        let context = WorkerContext {
            queue: Arc::clone(&self.queue),
            consumer: Arc::clone(&self.consumer),
            errors: Arc::clone(&self.errors),
        };

        let mut workers = Vec::with_capacity(self.config.num_threads);
        for id in 0..self.config.num_threads {
            match Worker::spawn(
                id,
                &self.config.thread_name_prefix,
                priority,
                paused,
                context.clone(),
            ) {
                Ok(worker) => workers.push(Arc::new(worker)),
                Err(e) => {
                    // take down the workers that did start
                    for worker in &workers {
                        worker.exit();
                    }
                    self.queue.broadcast();
                    let _ = self.join_workers(&workers);
                    return Err(e);
                }
            }
        }

        *self.workers.write() = workers;
        self.started.store(true, Ordering::Release);

        info!(
            "pool '{}' started: {} workers, priority {}, {} items queued",
            self.config.thread_name_prefix,
            self.config.num_threads,
            priority,
            self.queue.len()
        );
        Ok(())
    }

    /// Stop immediately.
    ///
    /// Every worker finishes the item in hand, if any, and leaves without
    /// taking another, even when paused. Workers are joined, except the
    /// calling thread when it is one of them. Items still queued are removed
    /// and returned, and the pool-level pause is cleared.
    pub fn stop(&self) -> Result<Vec<T>> {
        let Some(_lifecycle) = self.lifecycle_guard() else {
            return Ok(Vec::new());
        };
        if !self.started.load(Ordering::Acquire) {
            return Ok(Vec::new());
        }

        let workers = self.snapshot();
        for worker in &workers {
            worker.exit();
        }
        self.queue.broadcast();
        let joined = self.join_workers(&workers);
        self.workers.write().clear();

        let abandoned = self.queue.drain();
        self.queue.set_paused(false);
        self.started.store(false, Ordering::Release);

        if !abandoned.is_empty() {
            warn!(
                "pool '{}' stopped with {} queued items abandoned",
                self.config.thread_name_prefix,
                abandoned.len()
            );
        }
        info!("pool '{}' stopped", self.config.thread_name_prefix);

        joined.map(|()| abandoned)
    }

    /// Drain the queue, then stop.
    ///
    /// Clears any pause and tells every worker that no more work will arrive;
    /// workers empty the queue and leave. Once they are joined, any captured
    /// consumer error that has not been raised yet is returned.
    ///
    /// If every worker ended on an error, items can remain queued; they stay
    /// there for a later [`start`](Self::start).
    pub fn shutdown(&self) -> Result<()> {
        if let Some(_lifecycle) = self.lifecycle_guard() {
            if self.started.load(Ordering::Acquire) {
                let workers = self.snapshot();
                self.queue.set_paused(false);
                for worker in &workers {
                    worker.finish();
                }
                self.queue.broadcast();
                let joined = self.join_workers(&workers);
                self.workers.write().clear();
                self.started.store(false, Ordering::Release);

                let remaining = self.queue.len();
                if remaining > 0 {
                    warn!(
                        "pool '{}' shut down with {} items still queued",
                        self.config.thread_name_prefix, remaining
                    );
                }
                info!("pool '{}' shut down", self.config.thread_name_prefix);
                joined?;
            }
        }

        self.errors.check()
    }

    /// Pause every worker and wait until they are all blocked.
    ///
    /// Pause is not preemptive: an item already being consumed runs to
    /// completion first. Called from one of this pool's own workers, that
    /// worker is neither paused nor waited on. Does nothing if already paused.
    pub fn pause(&self) {
        if self.queue.set_paused(true) {
            return;
        }

        let workers: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|w| !w.is_current())
            .collect();
        for worker in &workers {
            worker.pause(true);
        }
        debug!("pausing {} workers", workers.len());

        self.poll_until(|| workers.iter().all(|w| w.is_idle()));
        debug!("pool '{}' paused", self.config.thread_name_prefix);
    }

    /// Clear the pause on every worker and wake them. Does nothing if not paused.
    pub fn resume(&self) {
        if !self.queue.set_paused(false) {
            return;
        }

        for worker in self.snapshot().iter().filter(|w| !w.is_current()) {
            worker.pause(false);
        }
        self.queue.broadcast();
        debug!("pool '{}' resumed", self.config.thread_name_prefix);
    }

    /// Whether the pool is paused
    pub fn is_paused(&self) -> bool {
        self.queue.is_paused()
    }

    /// Queue an item and wake one waiting worker.
    ///
    /// # Errors
    ///
    /// Returns the captured consumer error, once, instead of queueing the item.
    pub fn produce(&self, item: T) -> Result<()> {
        self.errors.check()?;
        self.queue.push(item);
        Ok(())
    }

    /// Remove every queued item equal to `value`.
    ///
    /// Items already taken by a worker are not affected.
    pub fn remove_matching(&self, value: &T) -> Vec<T>
    where
        T: PartialEq,
    {
        let removed = self.queue.remove_matching(value);
        debug!("removed {} matching items", removed.len());
        removed
    }

    /// Wait until the queue is empty.
    ///
    /// Items may still be in the hands of workers when this returns.
    ///
    /// # Errors
    ///
    /// Returns the captured consumer error. Returns [`PoolError::NotStarted`]
    /// if items are queued before [`start`](Self::start), and
    /// [`PoolError::NoLiveWorkers`] if every worker has ended with items
    /// still queued.
    pub fn wait_until_queue_empty(&self) -> Result<()> {
        let backoff = Backoff::new();
        loop {
            self.errors.check()?;
            let pending = self.queue.len();
            if pending == 0 {
                return Ok(());
            }
            if !self.is_started() {
                return Err(PoolError::not_started(pending));
            }
            if self.live_consumers() == 0 {
                // a worker records its error before it ends
                self.errors.check()?;
                return Err(PoolError::no_live_workers(pending));
            }
            self.pause_between_polls(&backoff);
        }
    }

    /// Wait until no worker is running.
    ///
    /// Each blocked worker found on the way is told to stop accepting work,
    /// so it leaves for good once it next finds the queue empty. The calling
    /// thread is not waited on if it is one of this pool's workers.
    ///
    /// # Errors
    ///
    /// Returns the captured consumer error.
    pub fn wait_until_idle(&self) -> Result<()> {
        let backoff = Backoff::new();
        loop {
            let idle = self.sweep_idle();
            self.errors.check()?;
            if idle {
                return Ok(());
            }
            self.pause_between_polls(&backoff);
        }
    }

    /// Whether no worker is running.
    ///
    /// Like [`wait_until_idle`](Self::wait_until_idle), blocked workers are
    /// told to stop accepting work as they are observed.
    pub fn is_idle(&self) -> bool {
        self.sweep_idle()
    }

    /// Number of queued items
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Whether no items are queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of workers whose loop has not ended
    pub fn live_consumers(&self) -> usize {
        self.workers.read().iter().filter(|w| w.is_alive()).count()
    }

    /// Scheduling priority for workers
    pub fn priority(&self) -> ThreadPriority {
        *self.priority.lock()
    }

    /// Set the scheduling priority; applies from the next [`start`](Self::start)
    pub fn set_priority(&self, priority: ThreadPriority) {
        *self.priority.lock() = priority;
    }

    /// Statistics of the current workers
    pub fn get_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.workers.read().iter().map(|w| w.stats()).collect()
    }

    /// Total items processed by the current workers
    pub fn total_items_processed(&self) -> u64 {
        self.get_stats()
            .iter()
            .map(|s| s.get_items_processed())
            .sum()
    }

    /// Number of workers started by [`start`](Self::start)
    pub fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    /// Whether the pool has been started and not stopped since
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The pool's configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn snapshot(&self) -> Vec<Arc<Worker>> {
        self.workers.read().clone()
    }

    fn on_worker_thread(&self) -> bool {
        self.workers.read().iter().any(|w| w.is_current())
    }

    /// A worker must not block on the lifecycle lock: whoever holds it may be
    /// joining that very worker. It only tries, and the holder deals with it.
    fn lifecycle_guard(&self) -> Option<MutexGuard<'_, ()>> {
        if self.on_worker_thread() {
            self.lifecycle.try_lock()
        } else {
            Some(self.lifecycle.lock())
        }
    }

    fn join_workers(&self, workers: &[Arc<Worker>]) -> Result<()> {
        let mut outcome = Ok(());
        for worker in workers {
            if worker.is_current() {
                debug!("worker {} is stopping its own pool; not joined", worker.id());
                continue;
            }
            if let Err(e) = worker.join() {
                warn!("failed to join worker {}: {}", worker.id(), e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    fn sweep_idle(&self) -> bool {
        let mut idle = true;
        for worker in self.workers.read().iter().filter(|w| !w.is_current()) {
            match worker.state() {
                WorkerState::Waiting => worker.stop_accepting(),
                WorkerState::Terminated => {}
                WorkerState::Starting | WorkerState::Running => idle = false,
            }
        }
        idle
    }

    fn pause_between_polls(&self, backoff: &Backoff) {
        if self.config.poll_interval.is_zero() {
            backoff.snooze();
        } else {
            thread::sleep(self.config.poll_interval);
        }
    }

    fn poll_until(&self, mut done: impl FnMut() -> bool) {
        let backoff = Backoff::new();
        while !done() {
            self.pause_between_polls(&backoff);
        }
    }
}

impl<T: Ord + Send + 'static> PriorityPool<T> {
    /// Create a pool that orders items by their [`Ord`] implementation
    pub fn natural<F>(num_threads: usize, consumer: F) -> Result<Self>
    where
        F: Fn(T) -> ConsumeResult<T> + Send + Sync + 'static,
    {
        Self::new(num_threads, |a: &T, b: &T| a.cmp(b), consumer)
    }
}

impl<T: Send + 'static> Drop for PriorityPool<T> {
    fn drop(&mut self) {
        if self.started.load(Ordering::Acquire) {
            if let Err(e) = self.stop() {
                error!(
                    "failed to stop pool '{}' during drop: {}",
                    self.config.thread_name_prefix, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConsumeError;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_pool_creation() {
        let pool = PriorityPool::natural(3, |_: u32| Ok(())).expect("Failed to create pool");
        assert!(!pool.is_started());
        assert_eq!(pool.num_threads(), 3);
        assert_eq!(pool.size(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.live_consumers(), 0);
        assert_eq!(pool.priority(), ThreadPriority::NORM);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PoolConfig::new(2).with_initial_capacity(0);
        let result = PriorityPool::with_config(config, |a: &u32, b: &u32| a.cmp(b), |_| Ok(()));
        assert!(matches!(result, Err(PoolError::InvalidConfig { .. })));
    }

    #[test]
    fn test_size_counts_items_before_start() {
        let pool = PriorityPool::natural(2, |_: u32| Ok(())).unwrap();
        for x in 0..7 {
            pool.produce(x).unwrap();
        }
        assert_eq!(pool.size(), 7);
    }

    #[test]
    fn test_start_is_idempotent() {
        let pool = PriorityPool::natural(2, |_: u32| Ok(())).unwrap();
        pool.start().expect("Failed to start pool");
        pool.start().expect("second start is a no-op");
        assert!(pool.is_started());
        assert!(wait_for(|| pool.live_consumers() == 2));
        pool.stop().expect("Failed to stop pool");
        assert_eq!(pool.live_consumers(), 0);
        assert!(!pool.is_started());
    }

    #[test]
    fn test_single_worker_follows_ordering() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        // reverse ordering: largest first
        let pool = PriorityPool::new(
            1,
            |a: &u32, b: &u32| b.cmp(a),
            move |x| {
                seen_clone.lock().push(x);
                Ok(())
            },
        )
        .unwrap();

        for x in [3, 9, 1, 7, 5] {
            pool.produce(x).unwrap();
        }
        pool.start().unwrap();
        pool.wait_until_queue_empty().unwrap();
        pool.shutdown().unwrap();

        assert_eq!(*seen.lock(), vec![9, 7, 5, 3, 1]);
    }

    #[test]
    fn test_stop_returns_abandoned_items() {
        let pool = PriorityPool::natural(2, |_: u32| Ok(())).unwrap();
        pool.pause();
        pool.start().unwrap();
        for x in 0..5 {
            pool.produce(x).unwrap();
        }

        let mut abandoned = pool.stop().unwrap();
        abandoned.sort();
        assert_eq!(abandoned, vec![0, 1, 2, 3, 4]);
        assert!(pool.is_empty());
        assert!(!pool.is_paused());
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let pool = PriorityPool::natural(3, move |_: u32| {
            counter_clone.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        pool.start().unwrap();
        for x in 0..100 {
            pool.produce(x).unwrap();
        }
        pool.shutdown().expect("Failed to shut down pool");

        assert_eq!(counter.load(Ordering::Relaxed), 100);
        assert!(pool.is_empty());
        assert!(!pool.is_started());
    }

    #[test]
    fn test_pause_and_resume() {
        let pool = PriorityPool::natural(2, |_: u32| Ok(())).unwrap();
        pool.start().unwrap();
        pool.pause();
        assert!(pool.is_paused());

        for x in 0..10 {
            pool.produce(x).unwrap();
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(pool.size(), 10);

        pool.resume();
        assert!(!pool.is_paused());
        pool.wait_until_queue_empty().unwrap();
        pool.wait_until_idle().unwrap();
        assert_eq!(pool.total_items_processed(), 10);
        pool.stop().unwrap();
    }

    #[test]
    fn test_produce_raises_captured_error_once() {
        let pool = PriorityPool::natural(1, |x: u32| {
            if x == 2 {
                return Err(ConsumeError::failed("two"));
            }
            Ok(())
        })
        .unwrap();

        pool.start().unwrap();
        pool.produce(2).unwrap();
        assert!(wait_for(|| pool.live_consumers() == 0));

        assert!(matches!(
            pool.produce(3),
            Err(PoolError::CallbackFailed { worker_id: 0, .. })
        ));
        pool.produce(4).expect("error is raised only once");
        assert_eq!(pool.size(), 1);
        pool.stop().unwrap();
    }

    #[test]
    fn test_wait_until_queue_empty_before_start() {
        let pool = PriorityPool::natural(1, |_: u32| Ok(())).unwrap();
        pool.wait_until_queue_empty().expect("nothing queued");

        pool.produce(1).unwrap();
        assert!(matches!(
            pool.wait_until_queue_empty(),
            Err(PoolError::NotStarted { pending: 1 })
        ));
    }

    #[test]
    fn test_wait_until_queue_empty_without_live_workers() {
        let pool = PriorityPool::natural(1, |x: u32| {
            if x == 1 {
                return Err(ConsumeError::failed("one"));
            }
            Ok(())
        })
        .unwrap();

        pool.start().unwrap();
        pool.produce(1).unwrap();
        assert!(wait_for(|| pool.live_consumers() == 0));
        assert!(pool.produce(2).is_err());
        pool.produce(3).expect("error is raised only once");

        assert!(matches!(
            pool.wait_until_queue_empty(),
            Err(PoolError::NoLiveWorkers { pending: 1 })
        ));
        assert!(pool.is_started());
        assert_eq!(pool.stop().unwrap(), vec![3]);
    }

    #[test]
    fn test_wait_until_queue_empty_raises_error_before_no_live_workers() {
        let pool = PriorityPool::natural(1, |_: u32| Err(ConsumeError::failed("always"))).unwrap();
        for x in 0..3 {
            pool.produce(x).unwrap();
        }
        pool.start().unwrap();
        assert!(wait_for(|| pool.live_consumers() == 0));

        assert!(matches!(
            pool.wait_until_queue_empty(),
            Err(PoolError::CallbackFailed { worker_id: 0, .. })
        ));
        assert!(matches!(
            pool.wait_until_queue_empty(),
            Err(PoolError::NoLiveWorkers { pending: 2 })
        ));
        pool.stop().unwrap();
    }

    #[test]
    fn test_set_priority_applies_on_start() {
        let pool = PriorityPool::natural(1, |_: u32| Ok(())).unwrap();
        pool.set_priority(ThreadPriority::MAX);
        assert_eq!(pool.priority(), ThreadPriority::MAX);
        pool.start().unwrap();
        assert_eq!(pool.workers.read()[0].priority(), ThreadPriority::MAX);
        pool.stop().unwrap();
    }

    #[test]
    fn test_stop_from_own_worker() {
        let slot: Arc<Mutex<Option<Arc<PriorityPool<u32>>>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));

        let slot_clone = Arc::clone(&slot);
        let stopped_clone = Arc::clone(&stopped);
        let pool = Arc::new(
            PriorityPool::natural(2, move |_: u32| {
                if let Some(pool) = slot_clone.lock().take() {
                    let abandoned = pool.stop()?;
                    assert!(abandoned.is_empty());
                    stopped_clone.store(true, Ordering::SeqCst);
                }
                Ok(())
            })
            .unwrap(),
        );
        *slot.lock() = Some(Arc::clone(&pool));

        pool.start().unwrap();
        pool.produce(1).unwrap();

        // the calling worker is skipped when joining, the other one is joined
        assert!(wait_for(|| stopped.load(Ordering::SeqCst)));
        assert!(!pool.is_started());
        assert_eq!(pool.live_consumers(), 0);
    }

    #[test]
    fn test_drop_stops_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter_clone = Arc::clone(&counter);
            let pool = PriorityPool::natural(2, move |_: u32| {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();
            pool.start().unwrap();
            pool.produce(1).unwrap();
            pool.wait_until_queue_empty().unwrap();
        }
        // the item was taken before the drop, so it ran to completion
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
