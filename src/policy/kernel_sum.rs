//! Gaussian kernel summation with relative error control
//!
//! density(q) = 1 / (|R| (2πh²)^{D/2}) · Σ_r exp(-|q - r|² / 2h²)
//!
//! A reference node contributes between |R_node|·K(d_max) and
//! |R_node|·K(d_min) to every query point of a node pair. When half that
//! gap fits in the node's share of the error budget,
//!   (hi - lo) / 2 ≤ ε · lower_bound · |R_node| / |R|,
//! the midpoint is recorded as a postponed contribution instead of
//! recursing. Summed over all pruned nodes the error per point stays
//! within ε times its true density.

use std::f64::consts::PI;

use super::{pair_count, Delta, GlobalResult, Gnp, PairCounts, PairVisitor, Postponed, QueryResult, SummaryResult};
use crate::tree::{distance_sq, TreeNode};
use crate::TraversalError;

/// Configuration for [`KernelSum`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KernelSumParam {
    bandwidth: f64,
    epsilon: f64,
    reference_count: usize,
    inv_two_bandwidth_sq: f64,
}

impl KernelSumParam {
    /// Gaussian kernel of width `bandwidth`, relative error `epsilon`, over
    /// `reference_count` reference points
    pub fn new(bandwidth: f64, epsilon: f64, reference_count: usize) -> Result<Self, TraversalError> {
        if !bandwidth.is_finite() || bandwidth <= 0.0 {
            return Err(TraversalError::InvalidParameter(format!(
                "bandwidth must be finite and > 0, got {bandwidth}"
            )));
        }
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(TraversalError::InvalidParameter(format!(
                "epsilon must be finite and >= 0, got {epsilon}"
            )));
        }
        if reference_count == 0 {
            return Err(TraversalError::InvalidParameter(
                "reference count must be > 0".to_string(),
            ));
        }
        Ok(Self {
            bandwidth,
            epsilon,
            reference_count,
            inv_two_bandwidth_sq: 1.0 / (2.0 * bandwidth * bandwidth),
        })
    }

    /// Kernel bandwidth
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Relative error tolerance
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Number of reference points
    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    /// Unnormalised kernel value at squared distance `d_sq`
    #[inline]
    pub fn kernel(&self, d_sq: f64) -> f64 {
        (-d_sq * self.inv_two_bandwidth_sq).exp()
    }

    /// Normalising constant for `reference_count` points in `dim` dimensions
    pub fn normalizer(&self, reference_count: usize, dim: usize) -> f64 {
        let volume = (2.0 * PI * self.bandwidth * self.bandwidth).powf(dim as f64 / 2.0);
        1.0 / (reference_count as f64 * volume)
    }
}

/// Contribution bounds of a reference node to each point of a query node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DensityDelta {
    /// Lower bound (farthest distance)
    pub density_lo: f64,
    /// Upper bound (nearest distance)
    pub density_hi: f64,
    /// Point pairs covered by the node pair
    pub pairs: u64,
}

impl Delta<KernelSumParam> for DensityDelta {
    fn init(_param: &KernelSumParam) -> Self {
        Self::default()
    }
}

/// Approximated contributions owed to every point of a subtree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DensityPostponed {
    /// Estimate to add
    pub density: f64,
    /// Lower bound of that estimate
    pub density_lo: f64,
}

impl Postponed<KernelSumParam> for DensityPostponed {
    fn init(_param: &KernelSumParam) -> Self {
        Self::default()
    }

    fn apply_postponed(&mut self, _param: &KernelSumParam, other: &Self) {
        self.density += other.density;
        self.density_lo += other.density_lo;
    }

    fn reset(&mut self, _param: &KernelSumParam) {
        self.density = 0.0;
        self.density_lo = 0.0;
    }
}

/// Guaranteed density of the worst point in a subtree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DensitySummary {
    /// Lower bound on every point's (unnormalised) density
    pub density_lo: f64,
}

impl SummaryResult<KernelSum> for DensitySummary {
    fn init(_param: &KernelSumParam) -> Self {
        Self::default()
    }

    fn apply_postponed(&mut self, _param: &KernelSumParam, postponed: &DensityPostponed, _q_node: &TreeNode) {
        self.density_lo += postponed.density_lo;
    }

    fn apply_summary_result(&mut self, _param: &KernelSumParam, other: &Self) {
        self.density_lo += other.density_lo;
    }

    fn apply_delta(&mut self, _param: &KernelSumParam, delta: &DensityDelta) {
        self.density_lo += delta.density_lo;
    }

    fn start_reaccumulate(&mut self, _param: &KernelSumParam, _q_node: &TreeNode) {
        self.density_lo = f64::INFINITY;
    }

    fn accumulate_child(&mut self, _param: &KernelSumParam, child: &Self, _parent_count: usize) {
        self.density_lo = self.density_lo.min(child.density_lo);
    }

    fn accumulate_result(&mut self, _param: &KernelSumParam, result: &DensityResult) {
        self.density_lo = self.density_lo.min(result.density_lo);
    }

    fn finish_reaccumulate(&mut self, _param: &KernelSumParam, _q_node: &TreeNode) {}

    fn refines(&self, _param: &KernelSumParam, previous: &Self) -> bool {
        // sums regrouped across nodes may differ in the last bits
        self.density_lo >= previous.density_lo * (1.0 - 1e-9)
    }
}

/// Density at one query point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DensityResult {
    /// Estimated density (normalised after postprocessing)
    pub density: f64,
    /// Guaranteed lower bound (normalised after postprocessing)
    pub density_lo: f64,
}

impl QueryResult<KernelSum> for DensityResult {
    fn init(_param: &KernelSumParam) -> Self {
        Self::default()
    }

    fn apply_postponed(&mut self, _param: &KernelSumParam, postponed: &DensityPostponed, _q_point: &Vec<f64>, _q_index: usize) {
        self.density += postponed.density;
        self.density_lo += postponed.density_lo;
    }

    fn postprocess(&mut self, param: &KernelSumParam, _q_point: &Vec<f64>, _q_index: usize, r_root: &TreeNode) {
        let norm = param.normalizer(r_root.count(), r_root.bound.dim());
        self.density *= norm;
        self.density_lo *= norm;
    }
}

/// Totals over every query point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DensityGlobal {
    /// Pair resolution ledger
    pub pairs: PairCounts,
    /// Sum of normalised densities
    pub total_density: f64,
    /// Query points finalized
    pub points: u64,
}

impl DensityGlobal {
    /// Mean normalised density over the query points
    pub fn mean_density(&self) -> f64 {
        if self.points == 0 {
            return 0.0;
        }
        self.total_density / self.points as f64
    }
}

impl GlobalResult<KernelSum> for DensityGlobal {
    fn init(_param: &KernelSumParam) -> Self {
        Self::default()
    }

    fn apply_delta(&mut self, _param: &KernelSumParam, delta: &DensityDelta) {
        self.pairs.speculate(delta.pairs);
    }

    fn undo_delta(&mut self, _param: &KernelSumParam, delta: &DensityDelta) {
        self.pairs.retract(delta.pairs);
    }

    fn apply_result(&mut self, _param: &KernelSumParam, _q_point: &Vec<f64>, _q_index: usize, result: &DensityResult) {
        self.total_density += result.density;
        self.points += 1;
    }
}

/// Base-case kernel sum
#[derive(Debug)]
pub struct DensityVisitor {
    inv_two_bandwidth_sq: f64,
    sum: f64,
}

impl PairVisitor<KernelSum> for DensityVisitor {
    fn init(param: &KernelSumParam) -> Self {
        Self {
            inv_two_bandwidth_sq: param.inv_two_bandwidth_sq,
            sum: 0.0,
        }
    }

    fn start_visiting_query_point(
        &mut self,
        _param: &KernelSumParam,
        _q_point: &Vec<f64>,
        _q_index: usize,
        _r_node: &TreeNode,
        _unvisited: &DensitySummary,
        _q_result: &mut DensityResult,
        _global: &mut DensityGlobal,
    ) -> bool {
        self.sum = 0.0;
        true
    }

    fn visit_pair(&mut self, _param: &KernelSumParam, q_point: &Vec<f64>, _q_index: usize, r_point: &Vec<f64>, _r_index: usize) {
        self.sum += (-distance_sq(q_point, r_point) * self.inv_two_bandwidth_sq).exp();
    }

    fn finish_visiting_query_point(
        &mut self,
        _param: &KernelSumParam,
        _q_point: &Vec<f64>,
        _q_index: usize,
        r_node: &TreeNode,
        _unvisited: &DensitySummary,
        q_result: &mut DensityResult,
        global: &mut DensityGlobal,
    ) {
        q_result.density += self.sum;
        q_result.density_lo += self.sum;
        global.pairs.visit(r_node.count() as u64);
    }
}

/// Gaussian kernel density estimation policy
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelSum;

impl Gnp for KernelSum {
    type Param = KernelSumParam;
    type QPoint = Vec<f64>;
    type RPoint = Vec<f64>;
    type Delta = DensityDelta;
    type SummaryResult = DensitySummary;
    type Postponed = DensityPostponed;
    type QResult = DensityResult;
    type GlobalResult = DensityGlobal;
    type Visitor = DensityVisitor;

    fn name() -> &'static str {
        "kde"
    }

    fn description() -> &'static str {
        "Gaussian kernel density estimate at every query point, within relative error epsilon."
    }

    fn is_exact() -> bool {
        false
    }

    fn consider_pair_intrinsic(
        param: &KernelSumParam,
        q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &mut DensityDelta,
        global: &mut DensityGlobal,
        _q_postponed: &mut DensityPostponed,
    ) -> bool {
        let r_count = r_node.count() as f64;
        delta.density_lo = r_count * param.kernel(q_node.bound.max_distance_sq(&r_node.bound));
        delta.density_hi = r_count * param.kernel(q_node.bound.min_distance_sq(&r_node.bound));
        delta.pairs = pair_count(q_node, r_node);
        global.apply_delta(param, delta);

        // kernel underflows to exactly zero: nothing to add
        delta.density_hi > 0.0
    }

    fn consider_query_termination(
        _param: &KernelSumParam,
        _q_node: &TreeNode,
        _summary: &DensitySummary,
        _global: &DensityGlobal,
        _q_postponed: &mut DensityPostponed,
    ) -> bool {
        true
    }

    fn consider_pair_extrinsic(
        param: &KernelSumParam,
        _q_node: &TreeNode,
        r_node: &TreeNode,
        delta: &DensityDelta,
        summary: &DensitySummary,
        _global: &DensityGlobal,
        q_postponed: &mut DensityPostponed,
    ) -> bool {
        let error = 0.5 * (delta.density_hi - delta.density_lo);
        let share = r_node.count() as f64 / param.reference_count as f64;
        if error <= param.epsilon * summary.density_lo * share {
            q_postponed.density += 0.5 * (delta.density_hi + delta.density_lo);
            q_postponed.density_lo += delta.density_lo;
            return false;
        }
        true
    }

    fn heuristic(_param: &KernelSumParam, q_node: &TreeNode, r_node: &TreeNode, _delta: &DensityDelta) -> f64 {
        q_node.bound.min_distance_sq(&r_node.bound)
    }
}
