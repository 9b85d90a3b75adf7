//! Property tests for the traversal contract

mod common;

use std::ops::Range;

use common::*;
use dualtree::policy::{
    Delta, GlobalResult, Gnp, NeighborDelta, NeighborGlobal, PairVisitor, Postponed, QueryResult,
    RangeDelta, RangeGlobal, RangePostponed, SummaryResult,
};
use dualtree::{
    EngineConfig, KdTree, KernelSum, KernelSumParam, NearestNeighbor, NearestNeighborParam,
    RangeCount, RangeCountParam, TreeNode,
};
use proptest::prelude::*;

fn point_set(max: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    proptest::collection::vec(proptest::collection::vec(-10.0f64..10.0, 2), 1..max)
}

/// Tags every pruned pair with a fresh token recorded in the query node's postponed
#[derive(Debug, Clone, Copy, Default)]
struct TokenPolicy;

#[derive(Debug, Clone)]
struct TokenParam {
    cutoff_sq: f64,
}

#[derive(Debug, Clone, Default)]
struct Unit;

impl Delta<TokenParam> for Unit {
    fn init(_param: &TokenParam) -> Self {
        Unit
    }
}

#[derive(Debug, Clone, Default)]
struct Tokens(Vec<u64>);

impl Postponed<TokenParam> for Tokens {
    fn init(_param: &TokenParam) -> Self {
        Tokens(Vec::new())
    }

    fn apply_postponed(&mut self, _param: &TokenParam, other: &Self) {
        self.0.extend_from_slice(&other.0);
    }

    fn reset(&mut self, _param: &TokenParam) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, Default)]
struct NoBound;

impl SummaryResult<TokenPolicy> for NoBound {
    fn init(_param: &TokenParam) -> Self {
        NoBound
    }
    fn apply_postponed(&mut self, _param: &TokenParam, _postponed: &Tokens, _q_node: &TreeNode) {}
    fn apply_summary_result(&mut self, _param: &TokenParam, _other: &Self) {}
    fn apply_delta(&mut self, _param: &TokenParam, _delta: &Unit) {}
    fn start_reaccumulate(&mut self, _param: &TokenParam, _q_node: &TreeNode) {}
    fn accumulate_child(&mut self, _param: &TokenParam, _child: &Self, _parent_count: usize) {}
    fn accumulate_result(&mut self, _param: &TokenParam, _result: &Received) {}
    fn finish_reaccumulate(&mut self, _param: &TokenParam, _q_node: &TreeNode) {}
}

#[derive(Debug, Clone, Default)]
struct Received(Vec<u64>);

impl QueryResult<TokenPolicy> for Received {
    fn init(_param: &TokenParam) -> Self {
        Received(Vec::new())
    }

    fn apply_postponed(&mut self, _param: &TokenParam, postponed: &Tokens, _q_point: &Vec<f64>, _q_index: usize) {
        self.0.extend_from_slice(&postponed.0);
    }

    fn postprocess(&mut self, _param: &TokenParam, _q_point: &Vec<f64>, _q_index: usize, _r_root: &TreeNode) {
        self.0.sort_unstable();
    }
}

#[derive(Debug, Default)]
struct Issued {
    next: u64,
    ranges: Vec<(u64, Range<usize>)>,
}

impl GlobalResult<TokenPolicy> for Issued {
    fn init(_param: &TokenParam) -> Self {
        Issued::default()
    }
    fn apply_delta(&mut self, _param: &TokenParam, _delta: &Unit) {}
    fn undo_delta(&mut self, _param: &TokenParam, _delta: &Unit) {}
    fn apply_result(&mut self, _param: &TokenParam, _q_point: &Vec<f64>, _q_index: usize, _result: &Received) {}
}

struct Silent;

impl PairVisitor<TokenPolicy> for Silent {
    fn init(_param: &TokenParam) -> Self {
        Silent
    }

    fn start_visiting_query_point(
        &mut self,
        _param: &TokenParam,
        _q_point: &Vec<f64>,
        _q_index: usize,
        _r_node: &TreeNode,
        _unvisited: &NoBound,
        _q_result: &mut Received,
        _global: &mut Issued,
    ) -> bool {
        true
    }

    fn visit_pair(&mut self, _param: &TokenParam, _q_point: &Vec<f64>, _q_index: usize, _r_point: &Vec<f64>, _r_index: usize) {}

    fn finish_visiting_query_point(
        &mut self,
        _param: &TokenParam,
        _q_point: &Vec<f64>,
        _q_index: usize,
        _r_node: &TreeNode,
        _unvisited: &NoBound,
        _q_result: &mut Received,
        _global: &mut Issued,
    ) {
    }
}

impl Gnp for TokenPolicy {
    type Param = TokenParam;
    type QPoint = Vec<f64>;
    type RPoint = Vec<f64>;
    type Delta = Unit;
    type SummaryResult = NoBound;
    type Postponed = Tokens;
    type QResult = Received;
    type GlobalResult = Issued;
    type Visitor = Silent;

    fn name() -> &'static str {
        "tokens"
    }

    fn description() -> &'static str {
        "Records one token per pruned node pair."
    }

    fn consider_pair_intrinsic(
        param: &TokenParam,
        q_node: &TreeNode,
        r_node: &TreeNode,
        _delta: &mut Unit,
        global: &mut Issued,
        q_postponed: &mut Tokens,
    ) -> bool {
        if q_node.bound.min_distance_sq(&r_node.bound) <= param.cutoff_sq {
            return true;
        }
        let token = global.next;
        global.next += 1;
        global.ranges.push((token, q_node.range()));
        q_postponed.0.push(token);
        false
    }

    fn consider_query_termination(_param: &TokenParam, _q_node: &TreeNode, _summary: &NoBound, _global: &Issued, _q_postponed: &mut Tokens) -> bool {
        true
    }

    fn consider_pair_extrinsic(
        _param: &TokenParam,
        _q_node: &TreeNode,
        _r_node: &TreeNode,
        _delta: &Unit,
        _summary: &NoBound,
        _global: &Issued,
        _q_postponed: &mut Tokens,
    ) -> bool {
        true
    }

    fn heuristic(_param: &TokenParam, q_node: &TreeNode, r_node: &TreeNode, _delta: &Unit) -> f64 {
        q_node.bound.min_distance_sq(&r_node.bound)
    }
}

fn node_pairs<'a>(q_tree: &'a KdTree, r_tree: &'a KdTree) -> impl Iterator<Item = (TreeNode, TreeNode)> + 'a {
    q_tree
        .nodes()
        .iter()
        .flat_map(move |q| r_tree.nodes().iter().map(move |r| (q.clone(), r.clone())))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pruned_range_count_equals_naive(
        refs in point_set(60),
        queries in point_set(40),
        leaf_size in 1usize..6,
        radius in 0.0f64..6.0,
    ) {
        let (mut refs, mut queries) = (refs, queries);
        let r_tree = build(&mut refs, leaf_size);
        let q_tree = build(&mut queries, leaf_size);
        let param = RangeCountParam::new(radius).unwrap();

        let pruned = run::<RangeCount>(param.clone(), EngineConfig::new(), &q_tree, &queries, &r_tree, &refs);
        let naive = run::<RangeCount>(param, EngineConfig::naive(), &q_tree, &queries, &r_tree, &refs);
        prop_assert_eq!(&pruned.results, &naive.results);

        let counts: Vec<u64> = pruned.results.iter().map(|r| r.count).collect();
        prop_assert_eq!(counts, brute_range_counts(&queries, &refs, radius, false));
        prop_assert_eq!(pruned.global.pairs.total(), (queries.len() * refs.len()) as u64);
    }

    #[test]
    fn pruned_nearest_equals_naive(
        points in point_set(80),
        leaf_size in 1usize..6,
    ) {
        let mut points = points;
        let tree = build(&mut points, leaf_size);
        let param = NearestNeighborParam::new().with_leave_one_out(true);
        let config = EngineConfig::new().with_leave_one_out(true);

        let pruned = run::<NearestNeighbor>(param.clone(), config.clone(), &tree, &points, &tree, &points);
        let naive = run::<NearestNeighbor>(param, config.with_naive(true), &tree, &points, &tree, &points);
        let expected = brute_nearest(&points, &points, true);
        prop_assert_eq!(&pruned.results, &naive.results);
        for (result, best) in pruned.results.iter().zip(&expected) {
            prop_assert_eq!(result.distance_sq, *best);
        }
    }

    #[test]
    fn kernel_sum_error_within_epsilon(
        refs in point_set(50),
        queries in point_set(30),
        bandwidth in 0.3f64..4.0,
        epsilon in 0.0f64..0.2,
    ) {
        let (mut refs, mut queries) = (refs, queries);
        let r_tree = build(&mut refs, 3);
        let q_tree = build(&mut queries, 3);
        let param = KernelSumParam::new(bandwidth, epsilon, refs.len()).unwrap();

        let approx = run::<KernelSum>(param.clone(), EngineConfig::new(), &q_tree, &queries, &r_tree, &refs);
        let exact = run::<KernelSum>(param, EngineConfig::naive(), &q_tree, &queries, &r_tree, &refs);
        for (a, e) in approx.results.iter().zip(&exact.results) {
            prop_assert!((a.density - e.density).abs() <= (epsilon + 1e-12) * e.density);
        }
    }

    #[test]
    fn child_labels_do_not_change_results(
        refs in point_set(60),
        queries in point_set(30),
        leaf_size in 1usize..5,
        radius in 0.0f64..5.0,
    ) {
        let (mut refs, mut queries) = (refs, queries);
        let r_tree = build(&mut refs, leaf_size);
        let q_tree = build(&mut queries, leaf_size);
        let r_mirror = r_tree.mirrored();
        let q_mirror = q_tree.mirrored();
        let param = RangeCountParam::new(radius).unwrap();

        let straight = run::<RangeCount>(param.clone(), EngineConfig::new(), &q_tree, &queries, &r_tree, &refs);
        let swapped = run::<RangeCount>(param, EngineConfig::new(), &q_mirror, &queries, &r_mirror, &refs);
        prop_assert_eq!(straight.results, swapped.results);

        let straight = run::<NearestNeighbor>(NearestNeighborParam::new(), EngineConfig::new(), &q_tree, &queries, &r_tree, &refs);
        let swapped = run::<NearestNeighbor>(NearestNeighborParam::new(), EngineConfig::new(), &q_mirror, &queries, &r_mirror, &refs);
        prop_assert_eq!(straight.results, swapped.results);
    }

    #[test]
    fn postponed_tokens_delivered_exactly_once(
        refs in point_set(50),
        queries in point_set(50),
        leaf_size in 1usize..5,
        cutoff in 0.0f64..8.0,
        naive in any::<bool>(),
    ) {
        let (mut refs, mut queries) = (refs, queries);
        let r_tree = build(&mut refs, leaf_size);
        let q_tree = build(&mut queries, leaf_size);
        let param = TokenParam { cutoff_sq: cutoff * cutoff };

        let output = run::<TokenPolicy>(param, EngineConfig::new().with_naive(naive), &q_tree, &queries, &r_tree, &refs);
        for (q_index, received) in output.results.iter().enumerate() {
            let mut expected: Vec<u64> = output
                .global
                .ranges
                .iter()
                .filter(|(_, range)| range.contains(&q_index))
                .map(|(token, _)| *token)
                .collect();
            expected.sort_unstable();
            prop_assert_eq!(&received.0, &expected, "query point {}", q_index);
        }
    }

    #[test]
    fn delta_apply_undo_round_trips(
        points in point_set(30),
        leaf_size in 1usize..4,
        radius in 0.0f64..5.0,
        pruned in 0u64..1_000_000,
        exact in 0u64..1_000_000,
    ) {
        let mut points = points;
        let tree = build(&mut points, leaf_size);
        let range_param = RangeCountParam::new(radius).unwrap();
        let neighbor_param = NearestNeighborParam::new();

        for (q, r) in node_pairs(&tree, &tree) {
            let mut delta = RangeDelta::init(&range_param);
            let mut scratch = RangeGlobal::init(&range_param);
            RangeCount::consider_pair_intrinsic(&range_param, &q, &r, &mut delta, &mut scratch, &mut RangePostponed::init(&range_param));

            let mut global = RangeGlobal::init(&range_param);
            global.pairs.pruned = pruned;
            global.pairs.exact = exact;
            global.total_neighbors = exact / 3;
            let before = global.clone();
            global.apply_delta(&range_param, &delta);
            global.undo_delta(&range_param, &delta);
            prop_assert_eq!(&global, &before);

            let mut delta = NeighborDelta::init(&neighbor_param);
            let mut scratch = NeighborGlobal::init(&neighbor_param);
            NearestNeighbor::consider_pair_intrinsic(&neighbor_param, &q, &r, &mut delta, &mut scratch, &mut dualtree::policy::NeighborPostponed);

            let mut global = NeighborGlobal::init(&neighbor_param);
            global.pairs.pruned = pruned;
            global.total_distance = radius;
            let before = global.clone();
            global.apply_delta(&neighbor_param, &delta);
            global.undo_delta(&neighbor_param, &delta);
            prop_assert_eq!(&global, &before);
        }
    }

    #[test]
    fn raising_the_limit_never_lowers_counts(
        points in point_set(60),
        leaf_size in 1usize..5,
        radius in 0.5f64..5.0,
        limit in 1u64..8,
    ) {
        let mut points = points;
        let tree = build(&mut points, leaf_size);
        let base = RangeCountParam::new(radius).unwrap();

        let tight = run::<RangeCount>(base.clone().with_limit(limit), EngineConfig::new(), &tree, &points, &tree, &points);
        let loose = run::<RangeCount>(base.clone().with_limit(limit + 3), EngineConfig::new(), &tree, &points, &tree, &points);
        let naive = run::<RangeCount>(base.clone().with_limit(limit), EngineConfig::naive(), &tree, &points, &tree, &points);
        let unlimited = run::<RangeCount>(base, EngineConfig::new(), &tree, &points, &tree, &points);
        prop_assert_eq!(&tight.results, &naive.results);

        for ((t, l), u) in tight.results.iter().zip(&loose.results).zip(&unlimited.results) {
            prop_assert!(t.count <= l.count);
            prop_assert_eq!(t.count, u.count.min(limit));
            prop_assert_eq!(l.count, u.count.min(limit + 3));
        }
        prop_assert_eq!(tight.global.pairs.total(), (points.len() * points.len()) as u64);
    }
}
