use std::fmt::Debug;

use crate::tree::TreeNode;

/// Bounded change a reference node could contribute to a query node
///
/// Computed once per (query node, reference node) pair, before any result
/// is applied.
pub trait Delta<P>: Clone {
    /// Identity delta
    fn init(param: &P) -> Self;
}

/// Contribution owed to every point of a subtree but not yet applied
pub trait Postponed<P>: Clone {
    /// Identity (nothing owed)
    fn init(param: &P) -> Self;

    /// Vertical composition: absorb `other` (associative)
    fn apply_postponed(&mut self, param: &P, other: &Self);

    /// Back to identity
    fn reset(&mut self, param: &P);
}

/// Per-node aggregate bound over every point in a subtree
pub trait SummaryResult<G: Gnp>: Clone {
    /// Identity summary (also the empty "unvisited" snapshot)
    fn init(param: &G::Param) -> Self;

    /// Fold in the node's pending postponed contribution
    fn apply_postponed(&mut self, param: &G::Param, postponed: &G::Postponed, q_node: &TreeNode);

    /// Horizontal join with unexplored (or sibling) mass
    fn apply_summary_result(&mut self, param: &G::Param, other: &Self);

    /// Fold in a pair's delta
    fn apply_delta(&mut self, param: &G::Param, delta: &G::Delta);

    /// Begin rebuilding from children or points
    fn start_reaccumulate(&mut self, param: &G::Param, q_node: &TreeNode);

    /// Join a child's finalized summary (children of a node with `parent_count` points)
    fn accumulate_child(&mut self, param: &G::Param, child: &Self, parent_count: usize);

    /// Join one point's result
    fn accumulate_result(&mut self, param: &G::Param, result: &G::QResult);

    /// Close the rebuild
    fn finish_reaccumulate(&mut self, param: &G::Param, q_node: &TreeNode);

    /// Whether `self` is at least as tight as `previous` under the policy's order
    ///
    /// Only consulted by invariant checks.
    fn refines(&self, _param: &G::Param, _previous: &Self) -> bool {
        true
    }
}

/// Per-query-point result
pub trait QueryResult<G: Gnp>: Clone {
    /// Initial (nothing visited) result
    fn init(param: &G::Param) -> Self;

    /// Apply a node's postponed contribution to this point
    fn apply_postponed(&mut self, param: &G::Param, postponed: &G::Postponed, q_point: &G::QPoint, q_index: usize);

    /// Finalize once every contribution has arrived
    fn postprocess(&mut self, param: &G::Param, q_point: &G::QPoint, q_index: usize, r_root: &TreeNode);
}

/// Process-wide accumulator for totals not owned by one query point
pub trait GlobalResult<G: Gnp> {
    /// Identity accumulator
    fn init(param: &G::Param) -> Self;

    /// Speculatively apply a pair's delta
    fn apply_delta(&mut self, param: &G::Param, delta: &G::Delta);

    /// Exactly reverse `apply_delta`
    fn undo_delta(&mut self, param: &G::Param, delta: &G::Delta);

    /// Fold in a finalized query point
    fn apply_result(&mut self, param: &G::Param, q_point: &G::QPoint, q_index: usize, result: &G::QResult);
}

/// Exhaustive leaf × leaf evaluation
pub trait PairVisitor<G: Gnp> {
    /// Fresh visitor for one base case
    fn init(param: &G::Param) -> Self;

    /// Prepare for one query point; `false` skips its reference loop
    #[allow(clippy::too_many_arguments)]
    fn start_visiting_query_point(
        &mut self,
        param: &G::Param,
        q_point: &G::QPoint,
        q_index: usize,
        r_node: &TreeNode,
        unvisited: &G::SummaryResult,
        q_result: &mut G::QResult,
        global: &mut G::GlobalResult,
    ) -> bool;

    /// Visit one (query, reference) point pair
    fn visit_pair(&mut self, param: &G::Param, q_point: &G::QPoint, q_index: usize, r_point: &G::RPoint, r_index: usize);

    /// Close out per-point aggregation
    #[allow(clippy::too_many_arguments)]
    fn finish_visiting_query_point(
        &mut self,
        param: &G::Param,
        q_point: &G::QPoint,
        q_index: usize,
        r_node: &TreeNode,
        unvisited: &G::SummaryResult,
        q_result: &mut G::QResult,
        global: &mut G::GlobalResult,
    );
}

/// Generalized N-body problem plugged into the traversal engine
///
/// The engine owns the traversal shape; implementors supply the pruning
/// predicates and the summary/delta/postponed algebra.
pub trait Gnp: Sized {
    /// Per-problem configuration, copied once per traversal
    type Param: Clone + Debug;
    /// Query point record
    type QPoint;
    /// Reference point record
    type RPoint;
    /// Pair bound
    type Delta: Delta<Self::Param>;
    /// Per-node summary
    type SummaryResult: SummaryResult<Self>;
    /// Deferred subtree contribution
    type Postponed: Postponed<Self::Param>;
    /// Per-point result
    type QResult: QueryResult<Self>;
    /// Process-wide accumulator
    type GlobalResult: GlobalResult<Self>;
    /// Base-case visitor
    type Visitor: PairVisitor<Self>;

    /// Short policy name
    fn name() -> &'static str;

    /// Human-readable description
    fn description() -> &'static str;

    /// Whether results match the exhaustive computation exactly
    /// (approximate policies only guarantee their stated tolerance)
    fn is_exact() -> bool {
        true
    }

    /// Cheap bound computation: does this pair need any further work?
    ///
    /// Fills `delta`. May speculatively apply it to `global` (undone by the
    /// engine when the pair is explored) and may record an exact
    /// contribution into `q_postponed`.
    fn consider_pair_intrinsic(
        param: &Self::Param,
        q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &mut Self::Delta,
        global: &mut Self::GlobalResult,
        q_postponed: &mut Self::Postponed,
    ) -> bool;

    /// `false` when the query subtree is already satisfied given `summary`
    fn consider_query_termination(
        param: &Self::Param,
        q_node: &TreeNode,
        summary: &Self::SummaryResult,
        global: &Self::GlobalResult,
        q_postponed: &mut Self::Postponed,
    ) -> bool;

    /// `false` when this particular pair can be pruned
    #[allow(clippy::too_many_arguments)]
    fn consider_pair_extrinsic(
        param: &Self::Param,
        q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &Self::Delta,
        summary: &Self::SummaryResult,
        global: &Self::GlobalResult,
        q_postponed: &mut Self::Postponed,
    ) -> bool;

    /// Traversal-order score; the lower-scored reference child is explored first
    fn heuristic(param: &Self::Param, q_node: &TreeNode, r_node: &TreeNode, delta: &Self::Delta) -> f64;
}
