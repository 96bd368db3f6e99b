// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Bounded history of completed sweeps.
//!
//! The history never blocks its producer: when it is full, pushing a new
//! sweep evicts the oldest one. A slow consumer therefore loses the oldest
//! unread sweeps rather than stalling the pipeline.
//!
//! # Example
//!
//! ```
//! use edgefirst_velodyne::history::HistoryBuffer;
//!
//! let mut history = HistoryBuffer::new(2);
//! history.push("a");
//! history.push("b");
//! history.push("c");
//!
//! // "a" was evicted
//! assert_eq!(history.iter().copied().collect::<Vec<_>>(), ["b", "c"]);
//!
//! // Draining read: newest entry, everything else discarded
//! assert_eq!(history.take_latest(), Some("c"));
//! assert!(history.is_empty());
//! ```
//!
//! # Thread Safety
//!
//! `HistoryBuffer` does no internal locking. Producers and consumers on
//! different threads must wrap it in a mutex.

use std::collections::VecDeque;

/// FIFO of completed sweeps with capacity-driven eviction.
#[derive(Clone, Debug)]
pub struct HistoryBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    /// Create a history holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of retained entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest entries that no longer fit.
    ///
    /// A capacity of zero is ignored. Returns the number of evicted entries.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        if capacity == 0 {
            return 0;
        }
        self.capacity = capacity;
        let excess = self.entries.len().saturating_sub(capacity);
        self.entries.drain(..excess);
        excess
    }

    /// Append an entry, evicting the oldest one if the history is full.
    ///
    /// Returns the evicted entry, if any.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Remove and return the newest entry, discarding all older ones.
    ///
    /// Returns `None` if the history is empty.
    pub fn take_latest(&mut self) -> Option<T> {
        let latest = self.entries.pop_back();
        self.entries.clear();
        latest
    }

    /// Remove and return all entries, oldest first.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.entries.drain(..).collect()
    }

    /// Discard all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over the entries, oldest first, without removing them.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.entries.iter()
    }

    /// Newest entry, without removing it.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> HistoryBuffer<T> {
    /// Copy of all entries, oldest first, leaving the history intact.
    pub fn peek_all(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a HistoryBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
