//! Restores index order for results that complete out of order.
//!
//! Workers finish blocks in whatever order the scheduler allows. [`Reorder`]
//! holds completed-but-not-yet-writable items keyed by index and releases them
//! strictly in sequence via a monotonically advancing `next` cursor.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Reorder<T> {
    next: u32,
    pending: BTreeMap<u32, T>,
    peak: usize,
}

impl<T> Default for Reorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Reorder<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
            peak: 0,
        }
    }

    /// Index of the next item to be released.
    #[inline]
    pub fn next_wanted(&self) -> u32 {
        self.next
    }

    /// Items held back waiting for a predecessor.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Largest number of items ever held back at once.
    pub fn peak_pending(&self) -> usize {
        self.peak
    }

    /// Accept a completed item.
    ///
    /// Fails if `index` was already released or is already pending.
    pub fn insert(&mut self, index: u32, item: T) -> Result<()> {
        if index < self.next {
            return Err(Error::Sequence(format!(
                "block {index} completed again after it was released"
            )));
        }
        if self.pending.contains_key(&index) {
            return Err(Error::Sequence(format!("block {index} completed twice")));
        }
        self.pending.insert(index, item);
        self.peak = self.peak.max(self.pending.len());
        Ok(())
    }

    /// Release the item at the cursor, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(u32, T)> {
        let item = self.pending.remove(&self.next)?;
        let index = self.next;
        self.next += 1;
        Some((index, item))
    }
}
