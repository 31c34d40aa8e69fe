//! Ring Buffer Implementation

use crate::StoreError;

/// Default buffer capacity (matches the single-turbine firmware batch)
pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity circular buffer with overwrite-oldest semantics
///
/// Index `0` is the oldest retained element and index `-1` the most recently
/// appended one. Capacity never changes after construction.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Backing storage, grows up to `capacity` and is then reused in place
    storage: Vec<T>,
    /// Capacity of the buffer
    capacity: usize,
    /// Next slot to overwrite once the buffer is full (also the oldest element)
    head: usize,
    /// Total values appended (for statistics, survives `clear`)
    total_written: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be > 0");
        Self {
            storage: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            total_written: 0,
        }
    }

    /// Create a buffer with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Append a value, evicting the oldest one if the buffer is full
    pub fn append(&mut self, value: T) {
        if self.storage.len() < self.capacity {
            self.storage.push(value);
        } else {
            self.storage[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
        self.total_written += 1;
    }

    /// Get an element by logical index
    ///
    /// Valid indices are `[-len, len)`; negative indices count back from the
    /// newest element.
    pub fn get(&self, index: isize) -> Result<&T, StoreError> {
        let len = self.len();
        let logical = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else if (index as usize) < len {
            Some(index as usize)
        } else {
            None
        };

        logical
            .map(|i| &self.storage[self.physical(i)])
            .ok_or(StoreError::IndexOutOfRange { index, len })
    }

    /// Oldest retained element
    pub fn first(&self) -> Option<&T> {
        self.get(0).ok()
    }

    /// Most recently appended element
    pub fn last(&self) -> Option<&T> {
        self.get(-1).ok()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).map(move |i| &self.storage[self.physical(i)])
    }

    /// Get the number of elements currently in the buffer
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.storage.len() == self.capacity
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Get total values ever appended
    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Clear the buffer, keeping its allocation
    pub fn clear(&mut self) {
        self.storage.clear();
        self.head = 0;
    }

    fn physical(&self, logical: usize) -> usize {
        (self.head + logical) % self.capacity
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Read the last N elements (most recent first)
    pub fn read_last(&self, count: usize) -> Vec<T> {
        let len = self.len();
        let count = count.min(len);
        (0..count)
            .map(|i| self.storage[self.physical(len - 1 - i)].clone())
            .collect()
    }

    /// Read the last N elements in append order (oldest first)
    pub fn tail(&self, count: usize) -> Vec<T> {
        let len = self.len();
        let start = len - count.min(len);
        (start..len)
            .map(|i| self.storage[self.physical(i)].clone())
            .collect()
    }
}
