//! The pool's shared work queue.
//!
//! One [`parking_lot::Mutex`] guards the heap together with the pool-level
//! pause flag, and one [`parking_lot::Condvar`] carries every cross-thread
//! notification: new work, resume, and shutdown. Workers never hold this lock
//! while taking their own flag lock; instead they compare the wake-up epoch
//! before and after reading their flags (see [`QueueState::epoch`]).

use super::heap::PriorityHeap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;

/// State guarded by the queue lock
pub struct QueueState<T> {
    heap: PriorityHeap<T>,
    paused: bool,
    epoch: u64,
}

impl<T> QueueState<T> {
    /// The heap holding queued items
    pub fn heap(&self) -> &PriorityHeap<T> {
        &self.heap
    }

    /// Mutable access to the heap
    pub fn heap_mut(&mut self) -> &mut PriorityHeap<T> {
        &mut self.heap
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no items are queued
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pool-level pause flag
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Counter bumped by every [`SharedQueue::broadcast`].
    ///
    /// A waiter that reads state outside the lock records the epoch first;
    /// if it changed by the time the lock is retaken, a broadcast was missed
    /// and the state must be read again.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Priority queue shared by a pool's controller and workers
pub struct SharedQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

impl<T> SharedQueue<T> {
    /// Create a queue with the given starting capacity and ordering
    pub fn new<F>(capacity: usize, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(QueueState {
                heap: PriorityHeap::with_capacity(capacity, compare),
                paused: false,
                epoch: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Acquire the queue lock
    pub fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock()
    }

    /// Block on the queue condition, releasing the lock while parked.
    ///
    /// Wakes may be spurious; callers re-check their predicate.
    pub fn wait(&self, guard: &mut MutexGuard<'_, QueueState<T>>) {
        self.ready.wait(guard);
    }

    /// Enqueue an item and wake one waiting worker
    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        state.heap.push(item);
        self.ready.notify_one();
    }

    /// Remove every queued item equal to `value`
    pub fn remove_matching(&self, value: &T) -> Vec<T>
    where
        T: PartialEq,
    {
        self.state.lock().heap.remove_matching(value)
    }

    /// Remove and return every queued item
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().heap.drain()
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Whether no items are queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    /// Pool-level pause flag
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Set the pool-level pause flag, returning the previous value
    pub fn set_paused(&self, paused: bool) -> bool {
        std::mem::replace(&mut self.state.lock().paused, paused)
    }

    /// Bump the wake-up epoch and wake every waiter
    pub fn broadcast(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        self.ready.notify_all();
    }
}

impl<T: Ord> SharedQueue<T> {
    /// Create a queue using the natural ordering of `T`
    pub fn natural(capacity: usize) -> Self {
        Self::new(capacity, |a: &T, b: &T| a.cmp(b))
    }
}

impl<T> std::fmt::Debug for SharedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SharedQueue")
            .field("len", &state.len())
            .field("paused", &state.paused)
            .field("epoch", &state.epoch)
            .finish()
    }
}
