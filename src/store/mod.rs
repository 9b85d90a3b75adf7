//! Node and point stores with scoped acquisition
//!
//! Every node or point the engine dereferences is acquired with
//! `start_read` and released with `stop_read`. Stores are addressed by
//! absolute index; an open store may be restricted to an index range.
//! `CacheRead` / `CacheReadRange` pair the two calls as a scope guard.

mod cache;
mod tracker;

pub use cache::ArenaCache;
pub use tracker::HandleTracker;

use std::fmt;
use std::ops::{Deref, Range};

use thiserror::Error;

/// Errors raised by a node or point store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested index lies outside the store's open range
    #[error("index {index} outside open range [{begin}, {end})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Open range start
        begin: usize,
        /// Open range end
        end: usize,
    },

    /// Requested range is not contained in the store's open range
    #[error("range [{begin}, {end}) outside open range [{open_begin}, {open_end})")]
    RangeOutOfBounds {
        /// Requested start
        begin: usize,
        /// Requested end
        end: usize,
        /// Open range start
        open_begin: usize,
        /// Open range end
        open_end: usize,
    },

    /// Operation not permitted in the store's access mode
    #[error("{operation} not permitted on a store opened in {mode} mode")]
    ModeViolation {
        /// Mode the store was opened with
        mode: AccessMode,
        /// Rejected operation
        operation: &'static str,
    },

    /// `stop_read` without a matching `start_read`
    #[error("release of [{begin}, {end}) without a matching acquire")]
    NotOpen {
        /// Released range start
        begin: usize,
        /// Released range end
        end: usize,
    },
}

/// Open mode of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessMode {
    /// Read-only access to existing records
    Read,

    /// Read-write access to existing records
    Write,

    /// Records are freshly initialised at open time, then read-write
    Overwrite,
}

impl AccessMode {
    /// Whether records may be mutated
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::Read)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
            AccessMode::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Index-addressed store of nodes or points
///
/// Implementations decide where records live (memory arena, block cache,
/// remote pages); the traversal only relies on this contract.
pub trait NodeStore<T> {
    /// Absolute index range this store was opened over
    fn open_range(&self) -> Range<usize>;

    /// Acquire read access to a contiguous range of records
    fn start_read_range(&self, range: Range<usize>) -> Result<&[T], StoreError>;

    /// Release a range previously acquired with `start_read_range`
    fn stop_read_range(&self, range: Range<usize>) -> Result<(), StoreError>;

    /// Acquire read access to a single record
    fn start_read(&self, index: usize) -> Result<&T, StoreError> {
        let open = self.open_range();
        self.start_read_range(index..index + 1)?
            .first()
            .ok_or(StoreError::IndexOutOfRange {
                index,
                begin: open.start,
                end: open.end,
            })
    }

    /// Release a single record
    fn stop_read(&self, index: usize) -> Result<(), StoreError> {
        self.stop_read_range(index..index + 1)
    }

    /// Handles currently held open (0 if the store does not track them)
    fn open_handles(&self) -> usize {
        0
    }

    /// Most handles held open at once (0 if the store does not track them)
    fn max_open_handles(&self) -> usize {
        0
    }
}

/// Scoped read of one record; released on drop
pub struct CacheRead<'a, T> {
    store: &'a dyn NodeStore<T>,
    index: usize,
    item: &'a T,
}

impl<'a, T> CacheRead<'a, T> {
    /// Acquire `index` from `store`
    pub fn new(store: &'a dyn NodeStore<T>, index: usize) -> Result<Self, StoreError> {
        let item = store.start_read(index)?;
        Ok(Self { store, index, item })
    }

    /// Index of the held record
    pub fn index(&self) -> usize {
        self.index
    }

    /// Borrow the held record; the borrow cannot outlive the guard
    ///
    /// ```compile_fail
    /// use dualtree::store::CacheRead;
    /// use dualtree::ArenaCache;
    ///
    /// let items = vec![1, 2];
    /// let cache = ArenaCache::borrowed(&items);
    /// let value = CacheRead::new(&cache, 0)?.get();
    /// assert_eq!(*value, 1);
    /// # Ok::<(), dualtree::StoreError>(())
    /// ```
    pub fn get(&self) -> &T {
        self.item
    }
}

impl<T> Deref for CacheRead<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item
    }
}

impl<T> Drop for CacheRead<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.store.stop_read(self.index) {
            tracing::warn!(index = self.index, %err, "unbalanced record release");
        }
    }
}

impl<T> fmt::Debug for CacheRead<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRead").field("index", &self.index).finish()
    }
}

/// Scoped read of a contiguous record range; released on drop
pub struct CacheReadRange<'a, T> {
    store: &'a dyn NodeStore<T>,
    range: Range<usize>,
    items: &'a [T],
}

impl<'a, T> CacheReadRange<'a, T> {
    /// Acquire `range` from `store`
    pub fn new(store: &'a dyn NodeStore<T>, range: Range<usize>) -> Result<Self, StoreError> {
        let items = store.start_read_range(range.clone())?;
        Ok(Self { store, range, items })
    }

    /// Absolute index range held
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
}

impl<T> Deref for CacheReadRange<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.items
    }
}

impl<T> Drop for CacheReadRange<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.store.stop_read_range(self.range.clone()) {
            tracing::warn!(begin = self.range.start, end = self.range.end, %err, "unbalanced range release");
        }
    }
}

impl<T> fmt::Debug for CacheReadRange<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheReadRange").field("range", &self.range).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let items = vec![10, 20, 30, 40];
        let cache = ArenaCache::borrowed(&items);
        {
            let one = CacheRead::new(&cache, 2).unwrap();
            assert_eq!(*one, 30);
            let span = CacheReadRange::new(&cache, 1..3).unwrap();
            assert_eq!(&*span, &[20, 30]);
            assert_eq!(cache.open_handles(), 2);
        }
        assert_eq!(cache.open_handles(), 0);
        assert_eq!(cache.max_open_handles(), 2);
    }

    #[test]
    fn test_borrow_keeps_handle_open() {
        let items = vec![1.5, 2.5];
        let cache = ArenaCache::borrowed(&items);
        let guard = CacheRead::new(&cache, 1).unwrap();
        let value = guard.get();
        assert_eq!(*value, 2.5);
        assert_eq!(guard.index(), 1);
        assert_eq!(cache.open_handles(), 1);
        drop(guard);
        assert_eq!(cache.open_handles(), 0);
    }

    #[test]
    fn test_out_of_range_read_fails() {
        let items = vec![1, 2, 3];
        let cache = ArenaCache::borrowed(&items);
        assert!(matches!(
            CacheRead::new(&cache, 3),
            Err(StoreError::RangeOutOfBounds { begin: 3, end: 4, .. })
        ));
        assert_eq!(cache.open_handles(), 0);
    }
}
