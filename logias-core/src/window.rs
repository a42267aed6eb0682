//! Sliding Window Queue
//!
//! A bounded buffer of numeric samples kept in insertion order. Once the
//! configured capacity is exceeded the oldest samples are dropped.

use std::collections::VecDeque;

/// Window capacity used when a threshold does not override it.
pub const DEFAULT_WINDOW_CAPACITY: usize = 32;

/// Fixed-capacity window of recent numeric samples.
///
/// A capacity of `0` means unbounded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlidingWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl SlidingWindow {
    /// Create an empty window with the given capacity (0 = unbounded)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample, then keep only the `capacity` most recent ones.
    pub fn put(&mut self, value: f64) {
        self.samples.push_back(value);
        if self.capacity > 0 {
            while self.samples.len() > self.capacity {
                self.samples.pop_front();
            }
        }
    }

    /// 1-based access from the front for positive indexes, from the back for
    /// negative ones (`-1` is the most recent sample). `0` and out-of-range
    /// indexes yield `None`.
    pub fn at(&self, index: i64) -> Option<f64> {
        let len = self.samples.len() as i64;
        let position = if index < 0 { len + index + 1 } else { index };
        if position < 1 || position > len {
            return None;
        }
        self.samples.get((position - 1) as usize).copied()
    }

    /// Remove and return the most recent sample.
    pub fn pop(&mut self) -> Option<f64> {
        self.samples.pop_back()
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}
