//! Worker thread implementation

use crate::core::error::panic_message;
use crate::core::{ConsumeError, Consumer, PoolError, Result, ThreadPriority};
use crate::pool::error_sink::ErrorSink;
use crate::queue::SharedQueue;
use log::{debug, error, trace, warn};
use parking_lot::{Mutex, MutexGuard};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total number of items processed
    pub items_processed: AtomicU64,
    /// Total number of items whose consumer failed or panicked
    pub items_failed: AtomicU64,
    /// Total number of interrupted items returned to the queue
    pub items_requeued: AtomicU64,
    /// Total time spent inside the consumer (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment items processed counter
    pub fn increment_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment items failed counter
    pub fn increment_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment items requeued counter
    pub fn increment_requeued(&self) {
        self.items_requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Add processing time
    pub fn add_processing_time(&self, microseconds: u64) {
        self.total_processing_time_us
            .fetch_add(microseconds, Ordering::Relaxed);
    }

    /// Get total items processed
    pub fn get_items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    /// Get total items failed
    pub fn get_items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    /// Get total items requeued
    pub fn get_items_requeued(&self) -> u64 {
        self.items_requeued.load(Ordering::Relaxed)
    }

    /// Get average processing time per item in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.items_processed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }
}

/// Lifecycle of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, loop not entered yet
    Starting,
    /// Checking the queue or running the consumer
    Running,
    /// Blocked on the queue condition
    Waiting,
    /// Loop has ended for good
    Terminated,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            2 => WorkerState::Waiting,
            _ => WorkerState::Terminated,
        }
    }
}

/// Per-worker control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerFlags {
    /// Cleared to make the worker leave after its current item
    pub running: bool,
    /// Set to hold the worker at its next wait check
    pub paused: bool,
    /// Cleared once no more work will arrive; an empty queue then ends the worker
    pub accepting_new_work: bool,
}

impl WorkerFlags {
    fn new(paused: bool) -> Self {
        Self {
            running: true,
            paused,
            accepting_new_work: true,
        }
    }

    fn must_wait(&self, queue_empty: bool) -> bool {
        self.paused || (self.accepting_new_work && queue_empty)
    }
}

/// Flags and lifecycle state shared by a worker thread and its controller.
///
/// The flag lock is never taken while the queue lock is held.
#[derive(Debug)]
struct WorkerControl {
    flags: Mutex<WorkerFlags>,
    state: AtomicU8,
}

impl WorkerControl {
    fn new(paused: bool) -> Self {
        Self {
            flags: Mutex::new(WorkerFlags::new(paused)),
            state: AtomicU8::new(WorkerState::Starting as u8),
        }
    }

    fn flags(&self) -> WorkerFlags {
        *self.flags.lock()
    }

    fn update(&self, f: impl FnOnce(&mut WorkerFlags)) {
        f(&mut self.flags.lock());
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Shared handles a worker is built with
pub(crate) struct WorkerContext<T> {
    pub(crate) queue: Arc<SharedQueue<T>>,
    pub(crate) consumer: Arc<dyn Consumer<T>>,
    pub(crate) errors: Arc<ErrorSink>,
}

impl<T> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            consumer: Arc::clone(&self.consumer),
            errors: Arc::clone(&self.errors),
        }
    }
}

/// A worker thread that repeatedly takes the minimum item from a shared queue
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    thread_id: ThreadId,
    control: Arc<WorkerControl>,
    stats: Arc<WorkerStats>,
    priority: ThreadPriority,
}

impl Worker {
    /// Create and start a new worker
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier for this worker
    /// * `name_prefix` - Thread name prefix; the thread is named `{prefix}-{id}`
    /// * `priority` - Scheduling priority recorded for this worker
    /// * `paused` - Whether the worker starts out paused
    /// * `context` - Queue, consumer and error sink shared with the pool
    pub(crate) fn spawn<T: Send + 'static>(
        id: usize,
        name_prefix: &str,
        priority: ThreadPriority,
        paused: bool,
        context: WorkerContext<T>,
    ) -> Result<Self> {
        let control = Arc::new(WorkerControl::new(paused));
        let stats = Arc::new(WorkerStats::new());
        let runner = Runner {
            id,
            context,
            control: Arc::clone(&control),
            stats: Arc::clone(&stats),
        };

        let thread = thread::Builder::new()
            .name(format!("{}-{}", name_prefix, id))
            .spawn(move || runner.run())
            .map_err(|e| PoolError::spawn_with_source(id, "Cannot create worker thread", e))?;
        let thread_id = thread.thread().id();

        debug!("worker {} spawned (priority {})", id, priority);

        Ok(Self {
            id,
            thread: Mutex::new(Some(thread)),
            thread_id,
            control,
            stats,
            priority,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get the ID of the worker's thread
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Scheduling priority this worker was started with
    pub fn priority(&self) -> ThreadPriority {
        self.priority
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    /// Snapshot of the control flags
    pub fn flags(&self) -> WorkerFlags {
        self.control.flags()
    }

    /// Whether the worker's loop has not ended yet
    pub fn is_alive(&self) -> bool {
        self.state() != WorkerState::Terminated
    }

    /// Whether the worker is blocked waiting or gone
    pub fn is_idle(&self) -> bool {
        matches!(self.state(), WorkerState::Waiting | WorkerState::Terminated)
    }

    /// Whether the calling thread is this worker's thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Set or clear the pause flag.
    ///
    /// Does not wake the worker; it sees the flag at its next wait check,
    /// after any item in flight has finished.
    pub fn pause(&self, paused: bool) {
        self.control.update(|f| f.paused = paused);
    }

    /// Make the worker leave at its next check, abandoning queued items.
    ///
    /// Takes effect on a blocked worker once the queue condition is signalled.
    pub fn exit(&self) {
        self.control.update(|f| {
            f.running = false;
            f.accepting_new_work = false;
        });
    }

    /// Tell the worker no more work will arrive; it leaves once the queue is empty
    pub fn stop_accepting(&self) {
        self.control.update(|f| f.accepting_new_work = false);
    }

    /// Stop accepting and clear the pause flag so the worker drains the queue and leaves
    pub(crate) fn finish(&self) {
        self.control.update(|f| {
            f.accepting_new_work = false;
            f.paused = false;
        });
    }

    /// Join the worker thread; later calls return immediately
    pub fn join(&self) -> Result<()> {
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            thread
                .join()
                .map_err(|payload| PoolError::join(self.id, panic_message(payload.as_ref())))?;
        }
        Ok(())
    }
}

/// Marks the worker finished however its loop ends
struct ExitGuard<'a> {
    id: usize,
    control: &'a WorkerControl,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.control.update(|f| f.accepting_new_work = false);
        self.control.set_state(WorkerState::Terminated);
        debug!("worker {} exited", self.id);
    }
}

/// The state moved onto the worker thread
struct Runner<T> {
    id: usize,
    context: WorkerContext<T>,
    control: Arc<WorkerControl>,
    stats: Arc<WorkerStats>,
}

impl<T: Send + 'static> Runner<T> {
    /// Main worker loop
    fn run(self) {
        let _exit = ExitGuard {
            id: self.id,
            control: &self.control,
        };

        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", id = self.id);
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        self.control.set_state(WorkerState::Running);
        debug!("worker {} started", self.id);

        while let Some(item) = self.next_item() {
            if !self.process(item) {
                break;
            }
        }

        debug!(
            "worker {} shutting down (processed {}, failed {})",
            self.id,
            self.stats.get_items_processed(),
            self.stats.get_items_failed()
        );
    }

    /// Block until an item can be taken, or return `None` when this worker should end.
    ///
    /// Flags are read with the queue lock released. The epoch check catches a
    /// broadcast that arrived in that window, so no wake-up is lost.
    fn next_item(&self) -> Option<T> {
        let queue = &self.context.queue;
        let mut state = queue.lock();
        loop {
            let epoch = state.epoch();
            let flags = MutexGuard::unlocked(&mut state, || self.control.flags());
            if state.epoch() != epoch {
                continue;
            }
            if !flags.running {
                return None;
            }
            if flags.must_wait(state.is_empty()) {
                self.control.set_state(WorkerState::Waiting);
                queue.wait(&mut state);
                self.control.set_state(WorkerState::Running);
                continue;
            }
            // empty here means no more work will be accepted: graceful exit
            return state.heap_mut().pop();
        }
    }

    /// Run the consumer on one item. Returns `false` when the worker must stop.
    fn process(&self, item: T) -> bool {
        #[cfg(feature = "tracing")]
        let item_span = span!(Level::TRACE, "item", worker = self.id);
        #[cfg(feature = "tracing")]
        let _item_guard = item_span.enter();

        let consumer = &self.context.consumer;
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| consumer.consume(item)));
        self.stats
            .add_processing_time(start.elapsed().as_micros() as u64);

        match outcome {
            Ok(Ok(())) => {
                self.stats.increment_processed();
                trace!("worker {}: item processed", self.id);
                true
            }
            Ok(Err(ConsumeError::Interrupted(item))) => {
                self.context.queue.push(item);
                self.stats.increment_requeued();
                trace!("worker {}: item interrupted, returned to queue", self.id);
                true
            }
            Ok(Err(ConsumeError::Failed(source))) => {
                self.stats.increment_failed();
                warn!(
                    "worker {}: consumer '{}' failed: {}",
                    self.id,
                    consumer.name(),
                    source
                );
                self.fail(PoolError::callback_failed(self.id, source));
                false
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.stats.increment_failed();
                error!(
                    "worker {}: consumer '{}' panicked: {}",
                    self.id,
                    consumer.name(),
                    message
                );
                self.fail(PoolError::callback_panicked(self.id, message));
                false
            }
        }
    }

    fn fail(&self, error: PoolError) {
        self.control.update(|f| f.running = false);
        if let Err(discarded) = self.context.errors.record(error) {
            warn!(
                "worker {}: an earlier error is already captured, dropping: {}",
                self.id, discarded
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClosureConsumer;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn context<F>(
        queue: &Arc<SharedQueue<u32>>,
        consumer: F,
    ) -> (WorkerContext<u32>, Arc<ErrorSink>)
    where
        F: Fn(u32) -> crate::core::ConsumeResult<u32> + Send + Sync + 'static,
    {
        let errors = Arc::new(ErrorSink::new());
        let ctx = WorkerContext {
            queue: Arc::clone(queue),
            consumer: Arc::new(ClosureConsumer::new(consumer)),
            errors: Arc::clone(&errors),
        };
        (ctx, errors)
    }

    fn spawn(id: usize, ctx: WorkerContext<u32>) -> Worker {
        Worker::spawn(id, "test", ThreadPriority::NORM, false, ctx).expect("Failed to spawn")
    }

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

    fn shut_down(worker: Worker, queue: &SharedQueue<u32>) {
        worker.exit();
        queue.broadcast();
        worker.join().expect("Failed to join worker");
    }

    #[test]
    fn test_worker_creation() {
        let queue = Arc::new(SharedQueue::natural(8));
        let (ctx, _) = context(&queue, |_| Ok(()));

        let worker =
            Worker::spawn(0, "test", ThreadPriority::MAX, false, ctx).expect("Failed to spawn");
        assert_eq!(worker.id(), 0);
        assert_eq!(worker.priority(), ThreadPriority::MAX);
        assert!(!worker.is_current());

        // nothing queued: the worker parks on the condition
        assert!(wait_for(|| worker.state() == WorkerState::Waiting));
        assert!(worker.is_idle());

        shut_down(worker, &queue);
    }

    #[test]
    fn test_worker_processes_in_priority_order() {
        let queue = Arc::new(SharedQueue::natural(8));
        for x in [5, 1, 4, 2, 3] {
            queue.push(x);
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let (ctx, _) = context(&queue, move |x| {
            seen_clone.lock().push(x);
            Ok(())
        });

        let worker = spawn(0, ctx);
        let stats = worker.stats();
        assert!(wait_for(|| stats.get_items_processed() == 5));
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);

        shut_down(worker, &queue);
    }

    #[test]
    fn test_graceful_exit_when_not_accepting() {
        let queue = Arc::new(SharedQueue::natural(8));
        let (ctx, _) = context(&queue, |_| Ok(()));
        let worker = spawn(0, ctx);
        assert!(wait_for(|| worker.state() == WorkerState::Waiting));

        for x in 0..3 {
            queue.push(x);
        }
        worker.stop_accepting();
        queue.broadcast();

        // drains what is queued, then leaves on its own
        assert!(wait_for(|| worker.state() == WorkerState::Terminated));
        assert!(queue.is_empty());
        assert_eq!(worker.stats().get_items_processed(), 3);
        worker.join().expect("Failed to join worker");
    }

    #[test]
    fn test_exit_abandons_queued_items() {
        let queue = Arc::new(SharedQueue::natural(8));
        let (ctx, _) = context(&queue, |_| Ok(()));
        let worker = spawn(0, ctx);

        worker.pause(true);
        queue.broadcast();
        assert!(wait_for(|| worker.state() == WorkerState::Waiting));
        for x in 0..4 {
            queue.push(x);
        }

        // exit wins over pause and leaves the queue untouched
        worker.exit();
        queue.broadcast();
        assert!(wait_for(|| !worker.is_alive()));
        assert_eq!(queue.len(), 4);
        worker.join().expect("Failed to join worker");
    }

    #[test]
    fn test_pause_holds_items() {
        let queue = Arc::new(SharedQueue::natural(8));
        let (ctx, _) = context(&queue, |_| Ok(()));
        let worker = spawn(0, ctx);
        assert!(wait_for(|| worker.state() == WorkerState::Waiting));

        worker.pause(true);
        queue.push(1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 1);
        assert_eq!(worker.state(), WorkerState::Waiting);

        worker.pause(false);
        queue.broadcast();
        assert!(wait_for(|| queue.is_empty()));

        shut_down(worker, &queue);
    }

    #[test]
    fn test_interrupted_item_is_requeued() {
        let queue = Arc::new(SharedQueue::natural(8));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let (ctx, errors) = context(&queue, move |x| {
            if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ConsumeError::Interrupted(x));
            }
            Ok(())
        });

        queue.push(9);
        let worker = spawn(0, ctx);
        let stats = worker.stats();
        assert!(wait_for(|| stats.get_items_processed() == 1));
        assert_eq!(stats.get_items_requeued(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(errors.check().is_ok());

        shut_down(worker, &queue);
    }

    #[test]
    fn test_failure_ends_only_this_worker() {
        let queue = Arc::new(SharedQueue::natural(8));
        let (ctx, errors) = context(&queue, |x| {
            if x == 3 {
                return Err(ConsumeError::failed("three is not allowed"));
            }
            Ok(())
        });

        for x in 1..=5 {
            queue.push(x);
        }
        let failing = spawn(0, ctx.clone());
        assert!(wait_for(|| !failing.is_alive()));
        assert!(!failing.flags().running);
        assert!(matches!(
            errors.check(),
            Err(PoolError::CallbackFailed { worker_id: 0, .. })
        ));

        // items after the failure are still queued for others
        assert_eq!(queue.len(), 2);
        let survivor = spawn(1, ctx);
        assert!(wait_for(|| queue.is_empty()));

        failing.join().expect("Failed to join worker");
        shut_down(survivor, &queue);
    }

    #[test]
    fn test_worker_panic_is_captured() {
        let queue = Arc::new(SharedQueue::natural(8));
        let (ctx, errors) = context(&queue, |_| panic!("Intentional panic for testing"));

        queue.push(1);
        let worker = spawn(0, ctx);
        assert!(wait_for(|| !worker.is_alive()));
        assert_eq!(worker.stats().get_items_failed(), 1);

        match errors.check() {
            Err(PoolError::CallbackPanicked { message, .. }) => {
                assert_eq!(message, "Intentional panic for testing")
            }
            other => panic!("expected captured panic, got {:?}", other),
        }
        worker.join().expect("worker thread itself must not panic");
    }
}
