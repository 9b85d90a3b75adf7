use std::fmt;
use std::ops::Range;

use crate::policy::{Gnp, Postponed, SummaryResult};
use crate::TraversalError;

/// Traversal-time state of one query node
pub struct QMutables<G: Gnp> {
    /// Bound over every point below the node
    pub summary_result: G::SummaryResult,
    /// Contribution owed to every point below the node
    pub postponed: G::Postponed,
}

impl<G: Gnp> QMutables<G> {
    /// Identity state
    pub fn init(param: &G::Param) -> Self {
        Self {
            summary_result: G::SummaryResult::init(param),
            postponed: G::Postponed::init(param),
        }
    }

    /// Summary with the pending postponed folded in
    pub fn effective_summary(&self, param: &G::Param, q_node: &crate::tree::TreeNode) -> G::SummaryResult {
        let mut summary = self.summary_result.clone();
        summary.apply_postponed(param, &self.postponed, q_node);
        summary
    }
}

impl<G: Gnp> Clone for QMutables<G> {
    fn clone(&self) -> Self {
        Self {
            summary_result: self.summary_result.clone(),
            postponed: self.postponed.clone(),
        }
    }
}

impl<G: Gnp> fmt::Debug for QMutables<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QMutables").finish_non_exhaustive()
    }
}

/// Query-node state, index-aligned with a contiguous node range
pub struct MutableTable<G: Gnp> {
    offset: usize,
    rows: Vec<QMutables<G>>,
}

impl<G: Gnp> MutableTable<G> {
    /// One `default` row per node in `range`
    pub fn new(default: &QMutables<G>, range: Range<usize>) -> Self {
        Self {
            offset: range.start,
            rows: vec![default.clone(); range.len()],
        }
    }

    /// Node indices covered
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.rows.len()
    }

    fn slot(&self, index: usize) -> Result<usize, TraversalError> {
        if !self.range().contains(&index) {
            let range = self.range();
            return Err(TraversalError::InvariantViolation(format!(
                "query node {index} outside traversal range [{}, {})",
                range.start, range.end
            )));
        }
        Ok(index - self.offset)
    }

    /// State of node `index`
    pub fn get(&self, index: usize) -> Result<&QMutables<G>, TraversalError> {
        let slot = self.slot(index)?;
        Ok(&self.rows[slot])
    }

    /// Mutable state of node `index`
    pub fn get_mut(&mut self, index: usize) -> Result<&mut QMutables<G>, TraversalError> {
        let slot = self.slot(index)?;
        Ok(&mut self.rows[slot])
    }

    /// Parent and child state at once
    ///
    /// Pre-order layout puts every child after its parent.
    pub fn parent_and_child(
        &mut self,
        parent: usize,
        child: usize,
    ) -> Result<(&mut QMutables<G>, &mut QMutables<G>), TraversalError> {
        let parent_slot = self.slot(parent)?;
        let child_slot = self.slot(child)?;
        if child_slot <= parent_slot {
            return Err(TraversalError::InvariantViolation(format!(
                "child node {child} does not follow parent {parent} in pre-order"
            )));
        }
        let (head, tail) = self.rows.split_at_mut(child_slot);
        Ok((&mut head[parent_slot], &mut tail[0]))
    }
}

impl<G: Gnp> fmt::Debug for MutableTable<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableTable")
            .field("range", &self.range())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{RangeCount, RangeCountParam};

    #[test]
    fn test_parent_and_child_are_disjoint() {
        let param = RangeCountParam::new(1.0).unwrap();
        let mut table = MutableTable::<RangeCount>::new(&QMutables::init(&param), 3..8);
        {
            let (parent, child) = table.parent_and_child(3, 5).unwrap();
            parent.postponed.count = 2;
            child.postponed.count = 7;
        }
        assert_eq!(table.get(3).unwrap().postponed.count, 2);
        assert_eq!(table.get(5).unwrap().postponed.count, 7);
        assert!(table.parent_and_child(5, 3).is_err());
        assert!(table.get(8).is_err());
        assert!(table.get(2).is_err());
    }
}
