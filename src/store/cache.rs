//! In-memory arena store

use std::cell::RefCell;
use std::fmt;
use std::ops::Range;

use super::{AccessMode, HandleTracker, NodeStore, StoreError};

enum Slots<'a, T> {
    Borrowed(&'a [T]),
    Owned(Vec<T>),
}

impl<T> Slots<'_, T> {
    fn as_slice(&self) -> &[T] {
        match self {
            Slots::Borrowed(items) => items,
            Slots::Owned(items) => items,
        }
    }
}

/// Arena-backed store addressed by absolute index
///
/// Read-mode caches usually borrow a tree's node arena or a point vector;
/// write/overwrite caches own their records (e.g. per-query results).
pub struct ArenaCache<'a, T> {
    slots: Slots<'a, T>,
    /// Absolute index of `slots[0]`
    offset: usize,
    /// Indices this cache may serve
    open: Range<usize>,
    mode: AccessMode,
    tracker: RefCell<HandleTracker>,
}

impl<'a, T> ArenaCache<'a, T> {
    /// Read-only cache over borrowed records, open over all of them
    pub fn borrowed(items: &'a [T]) -> Self {
        Self {
            open: 0..items.len(),
            slots: Slots::Borrowed(items),
            offset: 0,
            mode: AccessMode::Read,
            tracker: RefCell::new(HandleTracker::new()),
        }
    }

    /// Read-write cache owning existing records (indices start at `offset`)
    pub fn writable(items: Vec<T>, offset: usize) -> Self {
        Self {
            open: offset..offset + items.len(),
            slots: Slots::Owned(items),
            offset,
            mode: AccessMode::Write,
            tracker: RefCell::new(HandleTracker::new()),
        }
    }

    /// Fresh cache over `range`, every record produced by `fill(index)`
    pub fn overwrite(range: Range<usize>, mut fill: impl FnMut(usize) -> T) -> Self {
        let items = range.clone().map(&mut fill).collect();
        Self {
            offset: range.start,
            open: range,
            slots: Slots::Owned(items),
            mode: AccessMode::Overwrite,
            tracker: RefCell::new(HandleTracker::new()),
        }
    }

    /// Restrict the cache to a sub-range of its current open range
    pub fn restrict(mut self, range: Range<usize>) -> Result<Self, StoreError> {
        self.check_range(&range)?;
        self.open = range;
        Ok(self)
    }

    /// Mode this cache was opened in
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), StoreError> {
        if range.start > range.end || range.start < self.open.start || range.end > self.open.end {
            return Err(StoreError::RangeOutOfBounds {
                begin: range.start,
                end: range.end,
                open_begin: self.open.start,
                open_end: self.open.end,
            });
        }
        Ok(())
    }

    fn owned_mut(&mut self, operation: &'static str) -> Result<&mut Vec<T>, StoreError> {
        match (&mut self.slots, self.mode.is_writable()) {
            (Slots::Owned(items), true) => Ok(items),
            _ => Err(StoreError::ModeViolation {
                mode: self.mode,
                operation,
            }),
        }
    }

    /// Mutable access to one record
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, StoreError> {
        if !self.open.contains(&index) {
            return Err(StoreError::IndexOutOfRange {
                index,
                begin: self.open.start,
                end: self.open.end,
            });
        }
        let offset = self.offset;
        Ok(&mut self.owned_mut("write")?[index - offset])
    }

    /// Mutable access to a contiguous range of records
    pub fn slice_mut(&mut self, range: Range<usize>) -> Result<&mut [T], StoreError> {
        self.check_range(&range)?;
        let offset = self.offset;
        Ok(&mut self.owned_mut("write")?[range.start - offset..range.end - offset])
    }

    /// Records in the open range
    pub fn as_slice(&self) -> &[T] {
        &self.slots.as_slice()[self.open.start - self.offset..self.open.end - self.offset]
    }

    /// Take ownership of the records in the open range
    pub fn into_vec(self) -> Result<Vec<T>, StoreError> {
        let mode = self.mode;
        match self.slots {
            Slots::Owned(mut items) => {
                items.truncate(self.open.end - self.offset);
                items.drain(..self.open.start - self.offset);
                Ok(items)
            }
            Slots::Borrowed(_) => Err(StoreError::ModeViolation {
                mode,
                operation: "take ownership",
            }),
        }
    }
}

impl<T> NodeStore<T> for ArenaCache<'_, T> {
    fn open_range(&self) -> Range<usize> {
        self.open.clone()
    }

    fn start_read_range(&self, range: Range<usize>) -> Result<&[T], StoreError> {
        self.check_range(&range)?;
        self.tracker.borrow_mut().acquire(&range);
        Ok(&self.slots.as_slice()[range.start - self.offset..range.end - self.offset])
    }

    fn stop_read_range(&self, range: Range<usize>) -> Result<(), StoreError> {
        self.tracker.borrow_mut().release(&range)
    }

    fn open_handles(&self) -> usize {
        self.tracker.borrow().open_handles()
    }

    fn max_open_handles(&self) -> usize {
        self.tracker.borrow().max_open_handles()
    }
}

impl<T> fmt::Debug for ArenaCache<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaCache")
            .field("open", &self.open)
            .field("mode", &self.mode)
            .field("tracker", &self.tracker)
            .finish()
    }
}
