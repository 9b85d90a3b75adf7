//! Postponed-flush ledger
//!
//! One bit per query node in the traversal's node range, set when the
//! node's postponed contribution is pushed down. Every node must be
//! flushed exactly once per traversal.

use bitvec::prelude::*;

/// Flush tracking for a contiguous range of query nodes
#[derive(Debug)]
pub struct FlushLedger {
    /// Completion bits, indexed by `node - first`
    flushed: BitVec,

    /// First node index covered
    first: usize,
}

impl FlushLedger {
    /// Create ledger for nodes `[first, end)`
    pub fn new(first: usize, end: usize) -> Self {
        Self {
            flushed: bitvec![0; end.saturating_sub(first)],
            first,
        }
    }

    /// Mark `node` flushed
    ///
    /// Returns `false` if the node is outside the ledger or was already
    /// flushed (a double delivery).
    pub fn mark_flushed(&mut self, node: usize) -> bool {
        let Some(idx) = node.checked_sub(self.first) else {
            return false;
        };
        match self.flushed.get_mut(idx) {
            Some(mut bit) if !*bit => {
                *bit = true;
                true
            }
            _ => false,
        }
    }

    /// Whether `node` has been flushed
    pub fn is_flushed(&self, node: usize) -> bool {
        node.checked_sub(self.first)
            .and_then(|idx| self.flushed.get(idx).map(|bit| *bit))
            .unwrap_or(false)
    }

    /// Number of nodes flushed so far
    pub fn flushed_count(&self) -> usize {
        self.flushed.count_ones()
    }

    /// Number of nodes covered
    pub fn len(&self) -> usize {
        self.flushed.len()
    }

    /// Whether the ledger covers no nodes
    pub fn is_empty(&self) -> bool {
        self.flushed.is_empty()
    }

    /// Verify every covered node was flushed
    pub fn all_flushed(&self) -> bool {
        self.flushed.all()
    }

    /// First node that was never flushed, if any
    pub fn first_unflushed(&self) -> Option<usize> {
        self.flushed.first_zero().map(|idx| idx + self.first)
    }
}
