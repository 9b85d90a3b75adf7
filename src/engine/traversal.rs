use std::fmt;
use std::ops::Range;

use tracing::{debug, trace};

use super::{EngineConfig, MutableTable, QMutables, TraversalStats};
use crate::ledger::FlushLedger;
use crate::policy::{Delta, GlobalResult, Gnp, PairVisitor, Postponed, QueryResult, SummaryResult};
use crate::store::{ArenaCache, CacheRead, CacheReadRange, NodeStore};
use crate::tree::{KdTree, TreeError, TreeNode};
use crate::TraversalError;

/// The four read-only stores a traversal reads from
pub struct TreeStores<'s, G: Gnp> {
    /// Query tree nodes (pre-order)
    pub q_nodes: &'s dyn NodeStore<TreeNode>,
    /// Query points in tree order
    pub q_points: &'s dyn NodeStore<G::QPoint>,
    /// Reference tree nodes (pre-order, root at index 0)
    pub r_nodes: &'s dyn NodeStore<TreeNode>,
    /// Reference points in tree order
    pub r_points: &'s dyn NodeStore<G::RPoint>,
}

impl<G: Gnp> Clone for TreeStores<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: Gnp> Copy for TreeStores<'_, G> {}

impl<G: Gnp> fmt::Debug for TreeStores<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeStores")
            .field("q_nodes", &self.q_nodes.open_range())
            .field("q_points", &self.q_points.open_range())
            .field("r_nodes", &self.r_nodes.open_range())
            .field("r_points", &self.r_points.open_range())
            .finish()
    }
}

/// Everything one `doit` call produces
pub struct TraversalOutput<G: Gnp> {
    /// Per-query-point results, in tree order over `point_range`
    pub results: Vec<G::QResult>,
    /// Process-wide accumulator
    pub global: G::GlobalResult,
    /// Traversal counters
    pub stats: TraversalStats,
    /// Query point indices `results` covers
    pub point_range: Range<usize>,
}

impl<G: Gnp> fmt::Debug for TraversalOutput<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalOutput")
            .field("point_range", &self.point_range)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<G: Gnp> TraversalOutput<G> {
    /// Result of query point `index` (tree order)
    pub fn result(&self, index: usize) -> Option<&G::QResult> {
        index
            .checked_sub(self.point_range.start)
            .and_then(|offset| self.results.get(offset))
    }
}

/// Depth-first dual-tree solver for one algorithm policy
///
/// Holds its own copy of the policy parameters; each `doit` call runs a
/// complete, independent traversal.
#[derive(Debug, Clone)]
pub struct DualTreeEngine<G: Gnp> {
    param: G::Param,
    config: EngineConfig,
}

impl<G: Gnp> DualTreeEngine<G> {
    /// Engine for `param` under `config`
    pub fn new(param: G::Param, config: EngineConfig) -> Self {
        Self { param, config }
    }

    /// Policy parameters
    pub fn param(&self) -> &G::Param {
        &self.param
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Solve the query subtree occupying nodes `[q_root, q_end)` against
    /// the whole reference tree.
    ///
    /// Results cover exactly the root's point range. Every point is
    /// postprocessed and folded into the global result once.
    pub fn doit(
        &self,
        q_root: usize,
        q_end: usize,
        stores: &TreeStores<'_, G>,
    ) -> Result<TraversalOutput<G>, TraversalError> {
        let open = stores.q_nodes.open_range();
        if q_root >= q_end || q_root < open.start || q_end > open.end {
            return Err(TraversalError::InvalidQueryRange { root: q_root, end: q_end });
        }

        let param = &self.param;
        let point_range = {
            let q_root_node = CacheRead::new(stores.q_nodes, q_root)?;
            q_root_node.range()
        };
        let r_root = CacheRead::new(stores.r_nodes, 0)?;

        let mut traversal = Traversal::<G> {
            param,
            config: &self.config,
            q_nodes: stores.q_nodes,
            q_points: stores.q_points,
            r_nodes: stores.r_nodes,
            r_points: stores.r_points,
            q_results: ArenaCache::overwrite(point_range.clone(), |_| G::QResult::init(param)),
            mutables: MutableTable::new(&QMutables::init(param), q_root..q_end),
            global: G::GlobalResult::init(param),
            r_root: r_root.get(),
            ledger: FlushLedger::new(q_root, q_end),
            stats: TraversalStats::default(),
            depth: 0,
        };

        debug!(
            policy = G::name(),
            q_root,
            q_end,
            points = point_range.len(),
            naive = self.config.naive,
            "starting dual-tree traversal"
        );
        traversal.begin(q_root)?;

        let Traversal {
            q_results,
            global,
            stats,
            ledger,
            ..
        } = traversal;
        drop(r_root);

        if self.config.check_invariants {
            check_complete(&ledger, &q_results, stores)?;
        }
        debug!(policy = G::name(), %stats, "traversal finished");

        Ok(TraversalOutput {
            results: q_results.into_vec()?,
            global,
            stats,
            point_range,
        })
    }

    /// Solve a whole query tree against a whole reference tree
    ///
    /// Points must already be in tree order (as left by [`KdTree::build`]).
    pub fn run_trees(
        &self,
        q_tree: &KdTree,
        q_points: &[G::QPoint],
        r_tree: &KdTree,
        r_points: &[G::RPoint],
    ) -> Result<TraversalOutput<G>, TraversalError> {
        if q_points.len() != q_tree.num_points() {
            return Err(TreeError::LengthMismatch {
                expected: q_tree.num_points(),
                found: q_points.len(),
            }
            .into());
        }
        if r_points.len() != r_tree.num_points() {
            return Err(TreeError::LengthMismatch {
                expected: r_tree.num_points(),
                found: r_points.len(),
            }
            .into());
        }

        let q_nodes = q_tree.node_cache();
        let r_nodes = r_tree.node_cache();
        let q_point_cache = ArenaCache::borrowed(q_points);
        let r_point_cache = ArenaCache::borrowed(r_points);
        let stores = TreeStores::<G> {
            q_nodes: &q_nodes,
            q_points: &q_point_cache,
            r_nodes: &r_nodes,
            r_points: &r_point_cache,
        };
        self.doit(0, q_tree.len(), &stores)
    }
}

/// One call's working state; `r_root` borrows the reference-root guard held by `doit`
struct Traversal<'a, 'r, G: Gnp> {
    param: &'a G::Param,
    config: &'a EngineConfig,
    q_nodes: &'a dyn NodeStore<TreeNode>,
    q_points: &'a dyn NodeStore<G::QPoint>,
    r_nodes: &'a dyn NodeStore<TreeNode>,
    r_points: &'a dyn NodeStore<G::RPoint>,
    q_results: ArenaCache<'a, G::QResult>,
    mutables: MutableTable<G>,
    global: G::GlobalResult,
    r_root: &'r TreeNode,
    ledger: FlushLedger,
    stats: TraversalStats,
    depth: usize,
}

impl<G: Gnp> Traversal<'_, '_, G> {
    fn begin(&mut self, q_root: usize) -> Result<(), TraversalError> {
        let param = self.param;
        let r_root = self.r_root;
        let q_guard = CacheRead::new(self.q_nodes, q_root)?;
        let q_node = q_guard.get();

        let mut delta = G::Delta::init(param);
        let explore = {
            let q_mut = self.mutables.get_mut(q_root)?;
            G::consider_pair_intrinsic(param, q_node, r_root, &mut delta, &mut self.global, &mut q_mut.postponed)
        };

        if explore {
            let empty = G::SummaryResult::init(param);
            if self.config.naive {
                self.global.undo_delta(param, &delta);
                self.base_case(q_root, q_node, r_root, &empty)?;
            } else {
                self.pair(q_root, q_node, r_root, &delta, &empty)?;
            }
        } else {
            self.stats.intrinsic_prunes += 1;
            trace!(q = %q_node, "root pair pruned");
        }

        drop(q_guard);
        self.push_down_postprocess(q_root)
    }

    fn pair(
        &mut self,
        q_index: usize,
        q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &G::Delta,
        unvisited: &G::SummaryResult,
    ) -> Result<(), TraversalError> {
        self.stats.recursions += 1;
        self.depth += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.depth);
        let outcome = self.pair_inner(q_index, q_node, r_node, delta, unvisited);
        self.depth -= 1;
        outcome
    }

    fn pair_inner(
        &mut self,
        q_index: usize,
        q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &G::Delta,
        unvisited: &G::SummaryResult,
    ) -> Result<(), TraversalError> {
        let param = self.param;
        trace!(q = %q_node, r = %r_node, "checking pair");

        let q_mut = self.mutables.get_mut(q_index)?;
        let own = q_mut.effective_summary(param, q_node);
        let mut mu = own.clone();
        mu.apply_summary_result(param, unvisited);
        mu.apply_delta(param, delta);

        if !G::consider_query_termination(param, q_node, &mu, &self.global, &mut q_mut.postponed) {
            // the delta stays applied to the global result
            q_mut.summary_result.apply_delta(param, delta);
            self.stats.termination_prunes += 1;
            trace!(q = %q_node, "termination prune");
            if self.config.check_invariants && !q_mut.effective_summary(param, q_node).refines(param, &own) {
                return Err(TraversalError::InvariantViolation(format!(
                    "summary of query node {q_index} loosened by a termination prune"
                )));
            }
            return Ok(());
        }

        if !G::consider_pair_extrinsic(param, q_node, r_node, delta, &mu, &self.global, &mut q_mut.postponed) {
            self.stats.extrinsic_prunes += 1;
            trace!(q = %q_node, r = %r_node, "extrinsic prune");
            return Ok(());
        }

        self.global.undo_delta(param, delta);

        if q_node.is_leaf() && r_node.is_leaf() {
            trace!(q = %q_node, r = %r_node, "base case");
            self.base_case(q_index, q_node, r_node, unvisited)
        } else if r_node.is_leaf() || (q_node.count() >= r_node.count() && !q_node.is_leaf()) {
            trace!(q = %q_node, "splitting query");
            self.split_query(q_index, q_node, r_node, unvisited)
        } else {
            trace!(r = %r_node, "splitting reference");
            self.split_reference(q_index, q_node, r_node, unvisited)
        }
    }

    fn split_query(
        &mut self,
        q_index: usize,
        q_node: &TreeNode,
        r_node: &TreeNode,
        unvisited: &G::SummaryResult,
    ) -> Result<(), TraversalError> {
        let param = self.param;
        self.stats.query_splits += 1;
        let before = self.snapshot(q_index, q_node)?;

        self.mutables
            .get_mut(q_index)?
            .summary_result
            .start_reaccumulate(param, q_node);

        for k in 0..2 {
            let child_index = q_node.child(k);
            let child_guard = CacheRead::new(self.q_nodes, child_index)?;
            let q_child = child_guard.get();

            let mut child_delta = G::Delta::init(param);
            let explore = {
                let (parent, child) = self.mutables.parent_and_child(q_index, child_index)?;
                child.postponed.apply_postponed(param, &parent.postponed);
                G::consider_pair_intrinsic(param, q_child, r_node, &mut child_delta, &mut self.global, &mut child.postponed)
            };
            if explore {
                self.pair(child_index, q_child, r_node, &child_delta, unvisited)?;
            } else {
                self.stats.intrinsic_prunes += 1;
            }

            let (parent, child) = self.mutables.parent_and_child(q_index, child_index)?;
            let joined = child.effective_summary(param, q_child);
            parent
                .summary_result
                .accumulate_child(param, &joined, q_node.count());
        }

        let q_mut = self.mutables.get_mut(q_index)?;
        q_mut.summary_result.finish_reaccumulate(param, q_node);
        q_mut.postponed.reset(param);

        self.check_refines(q_index, before)
    }

    fn split_reference(
        &mut self,
        q_index: usize,
        q_node: &TreeNode,
        r_node: &TreeNode,
        unvisited: &G::SummaryResult,
    ) -> Result<(), TraversalError> {
        let param = self.param;
        self.stats.reference_splits += 1;

        let r1_guard = CacheRead::new(self.r_nodes, r_node.child(0))?;
        let r2_guard = CacheRead::new(self.r_nodes, r_node.child(1))?;
        let (r1, r2) = (r1_guard.get(), r2_guard.get());

        let mut delta1 = G::Delta::init(param);
        let mut delta2 = G::Delta::init(param);
        let q_mut = self.mutables.get_mut(q_index)?;
        let explore1 = G::consider_pair_intrinsic(param, q_node, r1, &mut delta1, &mut self.global, &mut q_mut.postponed);
        let explore2 = G::consider_pair_intrinsic(param, q_node, r2, &mut delta2, &mut self.global, &mut q_mut.postponed);

        match (explore1, explore2) {
            (false, false) => {
                self.stats.intrinsic_prunes += 2;
            }
            (false, true) => {
                self.stats.intrinsic_prunes += 1;
                self.pair(q_index, q_node, r2, &delta2, unvisited)?;
            }
            (true, false) => {
                self.stats.intrinsic_prunes += 1;
                self.pair(q_index, q_node, r1, &delta1, unvisited)?;
            }
            (true, true) => {
                let h1 = G::heuristic(param, q_node, r1, &delta1);
                let h2 = G::heuristic(param, q_node, r2, &delta2);
                // ties and NaN keep label order
                #[allow(clippy::neg_cmp_op_on_partial_ord)]
                let first_label_first = !(h1 > h2);
                if first_label_first {
                    let mut unvisited_r1 = unvisited.clone();
                    unvisited_r1.apply_delta(param, &delta2);
                    self.pair(q_index, q_node, r1, &delta1, &unvisited_r1)?;
                    self.pair(q_index, q_node, r2, &delta2, unvisited)?;
                } else {
                    let mut unvisited_r2 = unvisited.clone();
                    unvisited_r2.apply_delta(param, &delta1);
                    self.pair(q_index, q_node, r2, &delta2, &unvisited_r2)?;
                    self.pair(q_index, q_node, r1, &delta1, unvisited)?;
                }
            }
        }

        Ok(())
    }

    fn base_case(
        &mut self,
        q_index: usize,
        q_node: &TreeNode,
        r_node: &TreeNode,
        unvisited: &G::SummaryResult,
    ) -> Result<(), TraversalError> {
        let param = self.param;
        let leave_one_out = self.config.leave_one_out;
        self.stats.base_cases += 1;
        let before = self.snapshot(q_index, q_node)?;

        let q_points = CacheReadRange::new(self.q_points, q_node.range())?;
        let r_points = CacheReadRange::new(self.r_points, r_node.range())?;
        let q_results = self.q_results.slice_mut(q_node.range())?;
        let q_mut = self.mutables.get_mut(q_index)?;

        q_mut.summary_result.start_reaccumulate(param, q_node);
        let mut visitor = G::Visitor::init(param);
        let mut visits = 0u64;

        for (offset, (q_point, q_result)) in q_points.iter().zip(q_results.iter_mut()).enumerate() {
            let q_i = q_node.begin + offset;
            q_result.apply_postponed(param, &q_mut.postponed, q_point, q_i);

            if visitor.start_visiting_query_point(param, q_point, q_i, r_node, unvisited, q_result, &mut self.global) {
                for (r_offset, r_point) in r_points.iter().enumerate() {
                    let r_i = r_node.begin + r_offset;
                    if leave_one_out && r_i == q_i {
                        continue;
                    }
                    visitor.visit_pair(param, q_point, q_i, r_point, r_i);
                    visits += 1;
                }
                visitor.finish_visiting_query_point(param, q_point, q_i, r_node, unvisited, q_result, &mut self.global);
            }

            q_mut.summary_result.accumulate_result(param, q_result);
        }

        q_mut.summary_result.finish_reaccumulate(param, q_node);
        q_mut.postponed.reset(param);
        self.stats.pair_visits += visits;

        drop(q_points);
        drop(r_points);
        self.check_refines(q_index, before)
    }

    fn push_down_postprocess(&mut self, q_index: usize) -> Result<(), TraversalError> {
        let param = self.param;
        if !self.ledger.mark_flushed(q_index) && self.config.check_invariants {
            return Err(TraversalError::InvariantViolation(format!(
                "query node {q_index} flushed twice"
            )));
        }

        let q_guard = CacheRead::new(self.q_nodes, q_index)?;
        let q_node = q_guard.get();

        if q_node.is_leaf() {
            let q_points = CacheReadRange::new(self.q_points, q_node.range())?;
            let q_results = self.q_results.slice_mut(q_node.range())?;
            let q_mut = self.mutables.get(q_index)?;
            for (offset, (q_point, q_result)) in q_points.iter().zip(q_results.iter_mut()).enumerate() {
                let q_i = q_node.begin + offset;
                q_result.apply_postponed(param, &q_mut.postponed, q_point, q_i);
                q_result.postprocess(param, q_point, q_i, self.r_root);
                self.global.apply_result(param, q_point, q_i, q_result);
            }
        } else {
            for k in 0..2 {
                let child_index = q_node.child(k);
                {
                    let (parent, child) = self.mutables.parent_and_child(q_index, child_index)?;
                    child.postponed.apply_postponed(param, &parent.postponed);
                }
                self.push_down_postprocess(child_index)?;
            }
        }

        Ok(())
    }

    /// Summary with postponed folded in, taken before a reaccumulation
    fn snapshot(&self, q_index: usize, q_node: &TreeNode) -> Result<Option<G::SummaryResult>, TraversalError> {
        if !self.config.check_invariants {
            return Ok(None);
        }
        Ok(Some(self.mutables.get(q_index)?.effective_summary(self.param, q_node)))
    }

    fn check_refines(&self, q_index: usize, before: Option<G::SummaryResult>) -> Result<(), TraversalError> {
        let Some(before) = before else {
            return Ok(());
        };
        if !self.mutables.get(q_index)?.summary_result.refines(self.param, &before) {
            return Err(TraversalError::InvariantViolation(format!(
                "summary of query node {q_index} loosened after reaccumulation"
            )));
        }
        Ok(())
    }
}

/// Every query node flushed and every handle released
fn check_complete<G: Gnp>(
    ledger: &FlushLedger,
    q_results: &ArenaCache<'_, G::QResult>,
    stores: &TreeStores<'_, G>,
) -> Result<(), TraversalError> {
    if let Some(node) = ledger.first_unflushed() {
        return Err(TraversalError::InvariantViolation(format!(
            "query node {node} never flushed ({} of {} flushed)",
            ledger.flushed_count(),
            ledger.len()
        )));
    }

    let held = [
        ("query nodes", stores.q_nodes.open_handles()),
        ("query points", stores.q_points.open_handles()),
        ("reference nodes", stores.r_nodes.open_handles()),
        ("reference points", stores.r_points.open_handles()),
        ("query results", q_results.open_handles()),
    ];
    for (store, open) in held {
        if open != 0 {
            return Err(TraversalError::InvariantViolation(format!(
                "{open} {store} handle(s) still held after traversal"
            )));
        }
    }
    Ok(())
}
