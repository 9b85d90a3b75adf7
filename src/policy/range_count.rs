//! Fixed-radius neighbour counting
//!
//! For every query point, count the reference points within `radius`
//! (inclusive). Node pairs entirely outside the radius are excluded and
//! node pairs entirely inside it are counted wholesale through the
//! postponed algebra, so only boundary-straddling leaves reach the base
//! case. An optional `limit` saturates counts and lets satisfied query
//! subtrees terminate early.

use super::{pair_count, Delta, GlobalResult, Gnp, PairCounts, PairVisitor, Postponed, QueryResult, SummaryResult};
use crate::tree::{distance_sq, TreeNode};
use crate::TraversalError;

/// Configuration for [`RangeCount`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeCountParam {
    radius_sq: f64,
    limit: Option<u64>,
    leave_one_out: bool,
}

impl RangeCountParam {
    /// Count neighbours within `radius`
    pub fn new(radius: f64) -> Result<Self, TraversalError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(TraversalError::InvalidParameter(format!(
                "radius must be finite and >= 0, got {radius}"
            )));
        }
        Ok(Self {
            radius_sq: radius * radius,
            limit: None,
            leave_one_out: false,
        })
    }

    /// Saturate counts at `limit`
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query and reference sets are identical; a point is not its own neighbour
    ///
    /// Must agree with the engine's leave-one-out setting.
    pub fn with_leave_one_out(mut self, enabled: bool) -> Self {
        self.leave_one_out = enabled;
        self
    }

    /// Squared radius
    pub fn radius_sq(&self) -> f64 {
        self.radius_sq
    }

    /// Saturation limit, if any
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Whether self pairs are excluded
    pub fn leave_one_out(&self) -> bool {
        self.leave_one_out
    }
}

/// Upper bound on what a reference node can add
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeDelta {
    /// Reference points that might fall in range
    pub max_count: u64,
    /// Point pairs covered by the node pair
    pub pairs: u64,
}

impl Delta<RangeCountParam> for RangeDelta {
    fn init(_param: &RangeCountParam) -> Self {
        Self::default()
    }
}

/// Neighbours owed to every point of a subtree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangePostponed {
    /// Count to add to every point
    pub count: u64,
}

impl Postponed<RangeCountParam> for RangePostponed {
    fn init(_param: &RangeCountParam) -> Self {
        Self::default()
    }

    fn apply_postponed(&mut self, _param: &RangeCountParam, other: &Self) {
        self.count += other.count;
    }

    fn reset(&mut self, _param: &RangeCountParam) {
        self.count = 0;
    }
}

/// Guaranteed neighbour count of the worst point in a subtree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSummary {
    /// Minimum count over the subtree's points
    pub min_count: u64,
}

impl SummaryResult<RangeCount> for RangeSummary {
    fn init(_param: &RangeCountParam) -> Self {
        Self::default()
    }

    fn apply_postponed(&mut self, _param: &RangeCountParam, postponed: &RangePostponed, _q_node: &TreeNode) {
        self.min_count = self.min_count.saturating_add(postponed.count);
    }

    // Unexplored reference mass never raises a guaranteed count.
    fn apply_summary_result(&mut self, _param: &RangeCountParam, _other: &Self) {}

    fn apply_delta(&mut self, _param: &RangeCountParam, _delta: &RangeDelta) {}

    fn start_reaccumulate(&mut self, _param: &RangeCountParam, _q_node: &TreeNode) {
        self.min_count = u64::MAX;
    }

    fn accumulate_child(&mut self, _param: &RangeCountParam, child: &Self, _parent_count: usize) {
        self.min_count = self.min_count.min(child.min_count);
    }

    fn accumulate_result(&mut self, _param: &RangeCountParam, result: &RangeResult) {
        self.min_count = self.min_count.min(result.count);
    }

    fn finish_reaccumulate(&mut self, _param: &RangeCountParam, _q_node: &TreeNode) {}

    fn refines(&self, _param: &RangeCountParam, previous: &Self) -> bool {
        self.min_count >= previous.min_count
    }
}

/// Neighbour count of one query point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResult {
    /// Reference points within the radius (saturated at the limit after postprocessing)
    pub count: u64,
}

impl QueryResult<RangeCount> for RangeResult {
    fn init(_param: &RangeCountParam) -> Self {
        Self::default()
    }

    fn apply_postponed(&mut self, _param: &RangeCountParam, postponed: &RangePostponed, _q_point: &Vec<f64>, _q_index: usize) {
        self.count += postponed.count;
    }

    fn postprocess(&mut self, param: &RangeCountParam, _q_point: &Vec<f64>, _q_index: usize, _r_root: &TreeNode) {
        if let Some(limit) = param.limit {
            self.count = self.count.min(limit);
        }
    }
}

/// Totals over every query point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeGlobal {
    /// Pair resolution ledger
    pub pairs: PairCounts,
    /// Sum of final counts
    pub total_neighbors: u64,
    /// Query points finalized
    pub points: u64,
}

impl GlobalResult<RangeCount> for RangeGlobal {
    fn init(_param: &RangeCountParam) -> Self {
        Self::default()
    }

    fn apply_delta(&mut self, _param: &RangeCountParam, delta: &RangeDelta) {
        self.pairs.speculate(delta.pairs);
    }

    fn undo_delta(&mut self, _param: &RangeCountParam, delta: &RangeDelta) {
        self.pairs.retract(delta.pairs);
    }

    fn apply_result(&mut self, _param: &RangeCountParam, _q_point: &Vec<f64>, _q_index: usize, result: &RangeResult) {
        self.total_neighbors += result.count;
        self.points += 1;
    }
}

/// Base-case counter
#[derive(Debug, Default)]
pub struct RangeVisitor {
    radius_sq: f64,
    count: u64,
}

impl PairVisitor<RangeCount> for RangeVisitor {
    fn init(param: &RangeCountParam) -> Self {
        Self {
            radius_sq: param.radius_sq,
            count: 0,
        }
    }

    fn start_visiting_query_point(
        &mut self,
        param: &RangeCountParam,
        _q_point: &Vec<f64>,
        _q_index: usize,
        r_node: &TreeNode,
        _unvisited: &RangeSummary,
        q_result: &mut RangeResult,
        global: &mut RangeGlobal,
    ) -> bool {
        if param.limit.is_some_and(|limit| q_result.count >= limit) {
            global.pairs.speculate(r_node.count() as u64);
            return false;
        }
        self.count = 0;
        true
    }

    fn visit_pair(&mut self, _param: &RangeCountParam, q_point: &Vec<f64>, _q_index: usize, r_point: &Vec<f64>, _r_index: usize) {
        if distance_sq(q_point, r_point) <= self.radius_sq {
            self.count += 1;
        }
    }

    fn finish_visiting_query_point(
        &mut self,
        _param: &RangeCountParam,
        _q_point: &Vec<f64>,
        _q_index: usize,
        r_node: &TreeNode,
        _unvisited: &RangeSummary,
        q_result: &mut RangeResult,
        global: &mut RangeGlobal,
    ) {
        q_result.count += self.count;
        global.pairs.visit(r_node.count() as u64);
    }
}

/// Fixed-radius neighbour counting policy
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeCount;

impl Gnp for RangeCount {
    type Param = RangeCountParam;
    type QPoint = Vec<f64>;
    type RPoint = Vec<f64>;
    type Delta = RangeDelta;
    type SummaryResult = RangeSummary;
    type Postponed = RangePostponed;
    type QResult = RangeResult;
    type GlobalResult = RangeGlobal;
    type Visitor = RangeVisitor;

    fn name() -> &'static str {
        "range-count"
    }

    fn description() -> &'static str {
        "Count reference points within a fixed radius of every query point."
    }

    fn consider_pair_intrinsic(
        param: &RangeCountParam,
        q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &mut RangeDelta,
        global: &mut RangeGlobal,
        q_postponed: &mut RangePostponed,
    ) -> bool {
        delta.max_count = r_node.count() as u64;
        delta.pairs = pair_count(q_node, r_node);
        global.apply_delta(param, delta);

        if q_node.bound.min_distance_sq(&r_node.bound) > param.radius_sq {
            return false;
        }
        if q_node.bound.max_distance_sq(&r_node.bound) <= param.radius_sq {
            if !param.leave_one_out || !q_node.overlaps_range(r_node) {
                q_postponed.count += delta.max_count;
                return false;
            }
            if r_node.contains_range(q_node) {
                // every query point is in the reference node; drop itself
                q_postponed.count += delta.max_count - 1;
                return false;
            }
        }
        true
    }

    fn consider_query_termination(
        param: &RangeCountParam,
        _q_node: &TreeNode,
        summary: &RangeSummary,
        _global: &RangeGlobal,
        _q_postponed: &mut RangePostponed,
    ) -> bool {
        !param.limit.is_some_and(|limit| summary.min_count >= limit)
    }

    fn consider_pair_extrinsic(
        _param: &RangeCountParam,
        _q_node: &TreeNode,
        _r_node: &TreeNode,
        _delta: &RangeDelta,
        _summary: &RangeSummary,
        _global: &RangeGlobal,
        _q_postponed: &mut RangePostponed,
    ) -> bool {
        true
    }

    fn heuristic(_param: &RangeCountParam, q_node: &TreeNode, r_node: &TreeNode, _delta: &RangeDelta) -> f64 {
        q_node.bound.min_distance_sq(&r_node.bound)
    }
}
