//! All-nearest-neighbours (k = 1)
//!
//! Summary = largest current neighbour distance in a query subtree.
//! A reference node whose minimum distance exceeds that bound cannot
//! improve any point and is pruned.

use super::{pair_count, Delta, GlobalResult, Gnp, PairCounts, PairVisitor, Postponed, QueryResult, SummaryResult};
use crate::tree::{distance_sq, TreeNode};

/// Configuration for [`NearestNeighbor`]
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NearestNeighborParam {
    leave_one_out: bool,
}

impl NearestNeighborParam {
    /// Default parameters (distinct query and reference sets)
    pub fn new() -> Self {
        Self::default()
    }

    /// Query and reference sets are identical; a point is not its own neighbour
    ///
    /// Must agree with the engine's leave-one-out setting.
    pub fn with_leave_one_out(mut self, enabled: bool) -> Self {
        self.leave_one_out = enabled;
        self
    }

    /// Whether self pairs are excluded
    pub fn leave_one_out(&self) -> bool {
        self.leave_one_out
    }
}

/// Distance bounds between a query node and a reference node
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborDelta {
    /// No query point is closer than this to the reference node
    pub min_distance_sq: f64,
    /// Every query point has some reference point at most this far (∞ if unknown)
    pub max_distance_sq: f64,
    /// Point pairs covered by the node pair
    pub pairs: u64,
}

impl Delta<NearestNeighborParam> for NeighborDelta {
    fn init(_param: &NearestNeighborParam) -> Self {
        Self {
            min_distance_sq: 0.0,
            max_distance_sq: f64::INFINITY,
            pairs: 0,
        }
    }
}

/// Nearest-neighbour search defers nothing
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NeighborPostponed;

impl Postponed<NearestNeighborParam> for NeighborPostponed {
    fn init(_param: &NearestNeighborParam) -> Self {
        NeighborPostponed
    }

    fn apply_postponed(&mut self, _param: &NearestNeighborParam, _other: &Self) {}

    fn reset(&mut self, _param: &NearestNeighborParam) {}
}

/// Worst neighbour distance over a subtree
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborSummary {
    /// Upper bound on every point's neighbour distance
    pub max_distance_sq: f64,
}

impl SummaryResult<NearestNeighbor> for NeighborSummary {
    fn init(_param: &NearestNeighborParam) -> Self {
        Self {
            max_distance_sq: f64::INFINITY,
        }
    }

    fn apply_postponed(&mut self, _param: &NearestNeighborParam, _postponed: &NeighborPostponed, _q_node: &TreeNode) {}

    fn apply_summary_result(&mut self, _param: &NearestNeighborParam, other: &Self) {
        self.max_distance_sq = self.max_distance_sq.min(other.max_distance_sq);
    }

    fn apply_delta(&mut self, _param: &NearestNeighborParam, delta: &NeighborDelta) {
        self.max_distance_sq = self.max_distance_sq.min(delta.max_distance_sq);
    }

    fn start_reaccumulate(&mut self, _param: &NearestNeighborParam, _q_node: &TreeNode) {
        self.max_distance_sq = 0.0;
    }

    fn accumulate_child(&mut self, _param: &NearestNeighborParam, child: &Self, _parent_count: usize) {
        self.max_distance_sq = self.max_distance_sq.max(child.max_distance_sq);
    }

    fn accumulate_result(&mut self, _param: &NearestNeighborParam, result: &NeighborResult) {
        self.max_distance_sq = self.max_distance_sq.max(result.distance_sq);
    }

    fn finish_reaccumulate(&mut self, _param: &NearestNeighborParam, _q_node: &TreeNode) {}

    fn refines(&self, _param: &NearestNeighborParam, previous: &Self) -> bool {
        self.max_distance_sq <= previous.max_distance_sq
    }
}

/// Nearest reference point of one query point
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborResult {
    /// Squared distance to the neighbour (∞ if none)
    pub distance_sq: f64,
    /// Tree-order index of the neighbour
    pub index: Option<usize>,
}

impl NeighborResult {
    /// Euclidean distance to the neighbour
    pub fn distance(&self) -> f64 {
        self.distance_sq.sqrt()
    }
}

impl QueryResult<NearestNeighbor> for NeighborResult {
    fn init(_param: &NearestNeighborParam) -> Self {
        Self {
            distance_sq: f64::INFINITY,
            index: None,
        }
    }

    fn apply_postponed(&mut self, _param: &NearestNeighborParam, _postponed: &NeighborPostponed, _q_point: &Vec<f64>, _q_index: usize) {}

    fn postprocess(&mut self, _param: &NearestNeighborParam, _q_point: &Vec<f64>, _q_index: usize, _r_root: &TreeNode) {}
}

/// Totals over every query point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborGlobal {
    /// Pair resolution ledger
    pub pairs: PairCounts,
    /// Largest neighbour distance over all points
    pub max_distance_sq: f64,
    /// Sum of neighbour distances
    pub total_distance: f64,
    /// Query points finalized
    pub points: u64,
}

impl GlobalResult<NearestNeighbor> for NeighborGlobal {
    fn init(_param: &NearestNeighborParam) -> Self {
        Self::default()
    }

    fn apply_delta(&mut self, _param: &NearestNeighborParam, delta: &NeighborDelta) {
        self.pairs.speculate(delta.pairs);
    }

    fn undo_delta(&mut self, _param: &NearestNeighborParam, delta: &NeighborDelta) {
        self.pairs.retract(delta.pairs);
    }

    fn apply_result(&mut self, _param: &NearestNeighborParam, _q_point: &Vec<f64>, _q_index: usize, result: &NeighborResult) {
        if result.index.is_some() {
            self.max_distance_sq = self.max_distance_sq.max(result.distance_sq);
            self.total_distance += result.distance();
        }
        self.points += 1;
    }
}

/// Base-case scan for a closer reference point
#[derive(Debug)]
pub struct NeighborVisitor {
    best_distance_sq: f64,
    best_index: Option<usize>,
}

impl PairVisitor<NearestNeighbor> for NeighborVisitor {
    fn init(_param: &NearestNeighborParam) -> Self {
        Self {
            best_distance_sq: f64::INFINITY,
            best_index: None,
        }
    }

    fn start_visiting_query_point(
        &mut self,
        _param: &NearestNeighborParam,
        q_point: &Vec<f64>,
        _q_index: usize,
        r_node: &TreeNode,
        _unvisited: &NeighborSummary,
        q_result: &mut NeighborResult,
        global: &mut NeighborGlobal,
    ) -> bool {
        if r_node.bound.min_distance_sq_to_point(q_point) > q_result.distance_sq {
            global.pairs.speculate(r_node.count() as u64);
            return false;
        }
        self.best_distance_sq = q_result.distance_sq;
        self.best_index = q_result.index;
        true
    }

    fn visit_pair(&mut self, _param: &NearestNeighborParam, q_point: &Vec<f64>, _q_index: usize, r_point: &Vec<f64>, r_index: usize) {
        let d = distance_sq(q_point, r_point);
        // equidistant candidates resolve to the lowest reference index
        let closer = d < self.best_distance_sq
            || (d == self.best_distance_sq && self.best_index.map_or(true, |best| r_index < best));
        if closer {
            self.best_distance_sq = d;
            self.best_index = Some(r_index);
        }
    }

    fn finish_visiting_query_point(
        &mut self,
        _param: &NearestNeighborParam,
        _q_point: &Vec<f64>,
        _q_index: usize,
        r_node: &TreeNode,
        _unvisited: &NeighborSummary,
        q_result: &mut NeighborResult,
        global: &mut NeighborGlobal,
    ) {
        q_result.distance_sq = self.best_distance_sq;
        q_result.index = self.best_index;
        global.pairs.visit(r_node.count() as u64);
    }
}

/// All-nearest-neighbours policy
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbor;

impl Gnp for NearestNeighbor {
    type Param = NearestNeighborParam;
    type QPoint = Vec<f64>;
    type RPoint = Vec<f64>;
    type Delta = NeighborDelta;
    type SummaryResult = NeighborSummary;
    type Postponed = NeighborPostponed;
    type QResult = NeighborResult;
    type GlobalResult = NeighborGlobal;
    type Visitor = NeighborVisitor;

    fn name() -> &'static str {
        "neighbors"
    }

    fn description() -> &'static str {
        "Find the nearest reference point of every query point."
    }

    fn consider_pair_intrinsic(
        param: &NearestNeighborParam,
        q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &mut NeighborDelta,
        global: &mut NeighborGlobal,
        _q_postponed: &mut NeighborPostponed,
    ) -> bool {
        delta.min_distance_sq = q_node.bound.min_distance_sq(&r_node.bound);
        delta.max_distance_sq = if param.leave_one_out && r_node.count() == 1 && q_node.overlaps_range(r_node) {
            // the only reference point may be the query point itself
            f64::INFINITY
        } else {
            q_node.bound.max_distance_sq(&r_node.bound)
        };
        delta.pairs = pair_count(q_node, r_node);
        global.apply_delta(param, delta);
        true
    }

    fn consider_query_termination(
        _param: &NearestNeighborParam,
        _q_node: &TreeNode,
        _summary: &NeighborSummary,
        _global: &NeighborGlobal,
        _q_postponed: &mut NeighborPostponed,
    ) -> bool {
        true
    }

    fn consider_pair_extrinsic(
        _param: &NearestNeighborParam,
        _q_node: &TreeNode,
        _r_node: &TreeNode,
        delta: &NeighborDelta,
        summary: &NeighborSummary,
        _global: &NeighborGlobal,
        _q_postponed: &mut NeighborPostponed,
    ) -> bool {
        delta.min_distance_sq <= summary.max_distance_sq
    }

    fn heuristic(_param: &NearestNeighborParam, _q_node: &TreeNode, _r_node: &TreeNode, delta: &NeighborDelta) -> f64 {
        delta.min_distance_sq
    }
}
