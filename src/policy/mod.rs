//! Algorithm policies plugged into the traversal engine.
//!
//! A policy supplies the pruning predicates and the
//! summary/delta/postponed algebra for one generalized N-body problem;
//! the engine supplies the traversal.

mod api;
mod kernel_sum;
mod nearest;
mod range_count;
mod registry;

pub use api::{Delta, GlobalResult, Gnp, PairVisitor, Postponed, QueryResult, SummaryResult};
pub use kernel_sum::{
    DensityDelta, DensityGlobal, DensityPostponed, DensityResult, DensitySummary, DensityVisitor,
    KernelSum, KernelSumParam,
};
pub use nearest::{
    NearestNeighbor, NearestNeighborParam, NeighborDelta, NeighborGlobal, NeighborPostponed,
    NeighborResult, NeighborSummary, NeighborVisitor,
};
pub use range_count::{
    RangeCount, RangeCountParam, RangeDelta, RangeGlobal, RangePostponed, RangeResult,
    RangeSummary, RangeVisitor,
};
pub use registry::{PolicyInfo, PolicyRegistry};

/// Ledger of (query point, reference point) pairs resolved during a traversal
///
/// Every pair is either resolved by a pruning decision or visited
/// exhaustively, so after a full traversal `pruned + exact = |Q| · |R|`.
/// Integer counts keep speculative apply/undo exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairCounts {
    /// Pairs resolved by pruning (including speculative, not-yet-undone deltas)
    pub pruned: u64,

    /// Pairs visited by a base case
    pub exact: u64,
}

impl PairCounts {
    /// Speculatively mark `pairs` as resolved by pruning
    pub fn speculate(&mut self, pairs: u64) {
        self.pruned += pairs;
    }

    /// Reverse `speculate`
    pub fn retract(&mut self, pairs: u64) {
        debug_assert!(self.pruned >= pairs, "retracting more pairs than speculated");
        self.pruned -= pairs;
    }

    /// Record pairs visited exhaustively
    pub fn visit(&mut self, pairs: u64) {
        self.exact += pairs;
    }

    /// All resolved pairs
    pub fn total(&self) -> u64 {
        self.pruned + self.exact
    }

    /// Fraction of pairs resolved without visiting them
    pub fn pruned_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.pruned as f64 / total as f64
    }
}

/// Number of point pairs between two nodes
#[inline]
pub(crate) fn pair_count(q_node: &crate::tree::TreeNode, r_node: &crate::tree::TreeNode) -> u64 {
    (q_node.count() as u64) * (r_node.count() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speculate_retract_is_exact() {
        let mut counts = PairCounts { pruned: 17, exact: 4 };
        let before = counts;
        counts.speculate(1 << 40);
        counts.retract(1 << 40);
        assert_eq!(counts, before);
    }

    #[test]
    fn test_pruned_fraction() {
        let counts = PairCounts { pruned: 3, exact: 1 };
        assert_eq!(counts.total(), 4);
        assert!((counts.pruned_fraction() - 0.75).abs() < 1e-12);
        assert_eq!(PairCounts::default().pruned_fraction(), 0.0);
    }
}
