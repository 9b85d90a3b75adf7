//! Handle accounting for scoped node/point reads

use std::collections::HashMap;
use std::ops::Range;

use super::StoreError;

/// Tracks outstanding read handles on a store
#[derive(Debug, Default)]
pub struct HandleTracker {
    /// Handles currently open
    current: usize,

    /// Maximum seen
    max: usize,

    /// Total acquisitions over the tracker's lifetime
    acquired: usize,

    /// Open count per acquired range, for matching releases
    open: HashMap<(usize, usize), usize>,
}

impl HandleTracker {
    /// Create new tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `start_read` over `range`
    pub fn acquire(&mut self, range: &Range<usize>) {
        *self.open.entry((range.start, range.end)).or_insert(0) += 1;
        self.current += 1;
        self.acquired += 1;
        self.max = self.max.max(self.current);
    }

    /// Record a `stop_read` over `range`
    pub fn release(&mut self, range: &Range<usize>) -> Result<(), StoreError> {
        let key = (range.start, range.end);
        match self.open.get_mut(&key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.open.remove(&key);
                }
                self.current -= 1;
                Ok(())
            }
            _ => Err(StoreError::NotOpen {
                begin: range.start,
                end: range.end,
            }),
        }
    }

    /// Handles currently open
    pub fn open_handles(&self) -> usize {
        self.current
    }

    /// Maximum simultaneously open handles
    pub fn max_open_handles(&self) -> usize {
        self.max
    }

    /// Total acquisitions
    pub fn total_acquired(&self) -> usize {
        self.acquired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_acquire_release() {
        let mut tracker = HandleTracker::new();
        tracker.acquire(&(0..1));
        tracker.acquire(&(0..1));
        tracker.acquire(&(4..8));
        assert_eq!(tracker.open_handles(), 3);

        tracker.release(&(0..1)).unwrap();
        tracker.release(&(4..8)).unwrap();
        tracker.release(&(0..1)).unwrap();

        assert_eq!(tracker.open_handles(), 0);
        assert_eq!(tracker.max_open_handles(), 3);
        assert_eq!(tracker.total_acquired(), 3);
    }

    #[test]
    fn test_release_without_acquire_fails() {
        let mut tracker = HandleTracker::new();
        tracker.acquire(&(0..4));
        assert!(matches!(
            tracker.release(&(0..2)),
            Err(StoreError::NotOpen { begin: 0, end: 2 })
        ));
        assert_eq!(tracker.open_handles(), 1);
    }
}
