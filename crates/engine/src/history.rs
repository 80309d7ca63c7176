//! Fixed-capacity sample history.
//!
//! Ring buffer behind every tracked value. Creation writes only the first
//! slot; the rest of the buffer stays uninitialized until the write cursor
//! reaches it, which keeps record creation O(1) regardless of capacity.

use std::fmt;
use std::mem::MaybeUninit;

use crate::stats::variance;

/// Ring capacity.
///
/// Fixed at compile time: the compiled strategy's record layout depends on
/// the history width being stable.
pub const HISTORY_CAPACITY: usize = 100;

/// Chronological ring of the most recent samples.
///
/// Invariant: slots `0..len` are initialized. `next` is the next write index
/// and equals `len` until the ring wraps, so a write never lands outside
/// `0..len + 1`.
#[derive(Clone, Copy)]
pub struct History {
    slots: [MaybeUninit<f64>; HISTORY_CAPACITY],
    len: u32,
    next: u32,
}

impl History {
    /// Create a history holding a single sample. O(1): the remaining slots
    /// are left unspecified and are unreachable until written.
    pub fn new(initial: f64) -> Self {
        let mut slots = [MaybeUninit::uninit(); HISTORY_CAPACITY];
        slots[0] = MaybeUninit::new(initial);
        Self {
            slots,
            len: 1,
            next: 1 % HISTORY_CAPACITY as u32,
        }
    }

    /// Record a sample, silently dropping the oldest once at capacity.
    pub fn record(&mut self, sample: f64) {
        self.slots[self.next as usize] = MaybeUninit::new(sample);
        self.next = (self.next + 1) % HISTORY_CAPACITY as u32;
        self.len = (self.len + 1).min(HISTORY_CAPACITY as u32);
    }

    /// Number of retained samples, never more than [`HISTORY_CAPACITY`].
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sample recorded `age` steps ago (0 = newest).
    fn sample_at_age(&self, age: usize) -> f64 {
        debug_assert!(age < self.len());
        let cap = HISTORY_CAPACITY;
        let index = (self.next as usize + cap - 1 - age) % cap;
        debug_assert!(index < self.len() || self.len() == cap);
        // SAFETY: `record` initializes a slot before it becomes reachable:
        // while len < capacity only indices 0..len have been written and the
        // modular arithmetic above stays within them; once len == capacity
        // every slot has been written.
        unsafe { self.slots[index].assume_init() }
    }

    /// The last `min(window, len)` samples in chronological order
    /// (oldest first).
    pub fn recent(&self, window: usize) -> impl Iterator<Item = f64> + Clone + '_ {
        let count = window.min(self.len());
        (0..count).rev().map(move |age| self.sample_at_age(age))
    }

    /// Consecutive differences over the last `min(window, len)` samples,
    /// oldest first. These are the per-step gradients of the retained window.
    pub fn recent_deltas(&self, window: usize) -> impl Iterator<Item = f64> + Clone + '_ {
        let count = window.min(self.len());
        (1..count)
            .rev()
            .map(move |age| self.sample_at_age(age - 1) - self.sample_at_age(age))
    }

    /// Variance of the last `min(window, len)` samples.
    pub fn variance(&self, window: usize) -> f64 {
        variance(self.recent(window))
    }

    /// Newest `n` samples for diagnostics, oldest first.
    pub fn tail(&self, n: usize) -> Vec<f64> {
        self.recent(n).collect()
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("len", &self.len)
            .field("tail", &self.tail(5))
            .finish()
    }
}
