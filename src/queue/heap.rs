//! Array-backed binary min-heap ordered by a comparison function.

use std::cmp::Ordering;
use std::fmt;

/// Comparison function deciding which item is dequeued first.
///
/// The item ranked [`Ordering::Less`] comes out earlier.
pub type OrderingFn<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Default starting capacity of the backing storage
pub const DEFAULT_CAPACITY: usize = 32;

/// A binary min-heap over a dense vector.
///
/// Slot `k` has children `2k + 1` and `2k + 2`. The backing storage doubles
/// when full. Items that compare equal may come out in either order.
pub struct PriorityHeap<T> {
    items: Vec<T>,
    compare: OrderingFn<T>,
}

impl<T> PriorityHeap<T> {
    /// Create an empty heap ordered by `compare`
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self::with_capacity(DEFAULT_CAPACITY, compare)
    }

    /// Create an empty heap with pre-allocated capacity
    pub fn with_capacity<F>(capacity: usize, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self {
            items: Vec::with_capacity(capacity.max(1)),
            compare: Box::new(compare),
        }
    }

    /// Insert an item. Amortized O(log n).
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.items.capacity() {
            let grow_by = self.items.capacity().max(1);
            self.items.reserve_exact(grow_by);
        }
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// The item the comparison ranks smallest, without removing it
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove and return the smallest item. O(log n).
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let min = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(min)
    }

    /// Remove every queued item equal to `value`. O(n).
    ///
    /// Each match is replaced by the last item, which is then sifted into
    /// place so the heap order holds when this returns.
    pub fn remove_matching(&mut self, value: &T) -> Vec<T>
    where
        T: PartialEq,
    {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.items.len() {
            if self.items[i] != *value {
                i += 1;
                continue;
            }
            removed.push(self.items.swap_remove(i));
            // a replacement that also matches goes on the next pass, unmoved
            if i < self.items.len() && self.items[i] != *value {
                self.restore(i);
            }
        }
        removed
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current capacity of the backing storage
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Remove every item
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove every item, returning them in storage order
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Whether every parent ranks no greater than its children
    pub fn is_valid(&self) -> bool {
        (1..self.items.len()).all(|k| self.le((k - 1) / 2, k))
    }

    fn le(&self, a: usize, b: usize) -> bool {
        (self.compare)(&self.items[a], &self.items[b]) != Ordering::Greater
    }

    fn restore(&mut self, k: usize) {
        if k > 0 && !self.le((k - 1) / 2, k) {
            self.sift_up(k);
        } else {
            self.sift_down(k);
        }
    }

    fn sift_up(&mut self, mut k: usize) {
        while k > 0 {
            let parent = (k - 1) / 2;
            if self.le(parent, k) {
                break;
            }
            self.items.swap(parent, k);
            k = parent;
        }
    }

    fn sift_down(&mut self, mut k: usize) {
        let len = self.items.len();
        loop {
            let mut child = 2 * k + 1;
            if child >= len {
                break;
            }
            // pick the smaller child
            if child + 1 < len && !self.le(child, child + 1) {
                child += 1;
            }
            if self.le(k, child) {
                break;
            }
            self.items.swap(k, child);
            k = child;
        }
    }
}

impl<T: Ord> PriorityHeap<T> {
    /// Create an empty heap using the natural ordering of `T`
    pub fn natural() -> Self {
        Self::new(|a: &T, b: &T| a.cmp(b))
    }
}

impl<T: fmt::Debug> fmt::Debug for PriorityHeap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityHeap")
            .field("len", &self.items.len())
            .field("capacity", &self.items.capacity())
            .field("min", &self.peek())
            .finish()
    }
}
