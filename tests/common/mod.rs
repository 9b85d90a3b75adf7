#![allow(dead_code)]

use dualtree::tree::distance_sq;
use dualtree::{DualTreeEngine, EngineConfig, Gnp, KdTree, TraversalOutput};

/// Deterministic pseudo-random coordinates in `[-scale, scale)`
pub fn scattered_points(n: usize, dim: usize, seed: u64, scale: f64) -> Vec<Vec<f64>> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    };
    (0..n)
        .map(|_| (0..dim).map(|_| next() * scale).collect())
        .collect()
}

/// Points in a handful of tight clusters (pruning-friendly)
pub fn clustered_points(n: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
    let centers = scattered_points(4, dim, seed ^ 0x9e37, 20.0);
    let jitter = scattered_points(n, dim, seed, 1.0);
    jitter
        .into_iter()
        .enumerate()
        .map(|(i, offset)| {
            let center = &centers[i % centers.len()];
            center.iter().zip(offset).map(|(c, o)| c + o).collect()
        })
        .collect()
}

/// Points on an integer grid (many exact distance ties)
pub fn grid_points(side: usize) -> Vec<Vec<f64>> {
    (0..side * side)
        .map(|i| vec![(i % side) as f64, (i / side) as f64])
        .collect()
}

/// Build a tree, leaving `points` in tree order
pub fn build(points: &mut Vec<Vec<f64>>, leaf_size: usize) -> KdTree {
    KdTree::build(points, leaf_size).expect("tree builds")
}

/// Run `G` over whole trees with invariant checks on
pub fn run<G>(
    param: G::Param,
    config: EngineConfig,
    q_tree: &KdTree,
    q_points: &[Vec<f64>],
    r_tree: &KdTree,
    r_points: &[Vec<f64>],
) -> TraversalOutput<G>
where
    G: Gnp<QPoint = Vec<f64>, RPoint = Vec<f64>>,
{
    DualTreeEngine::<G>::new(param, config.with_invariant_checks(true))
        .run_trees(q_tree, q_points, r_tree, r_points)
        .expect("traversal succeeds")
}

pub fn brute_range_counts(queries: &[Vec<f64>], refs: &[Vec<f64>], radius: f64, leave_one_out: bool) -> Vec<u64> {
    let radius_sq = radius * radius;
    queries
        .iter()
        .enumerate()
        .map(|(i, q)| {
            refs.iter()
                .enumerate()
                .filter(|&(j, r)| !(leave_one_out && i == j) && distance_sq(q, r) <= radius_sq)
                .count() as u64
        })
        .collect()
}

/// Squared distance to the nearest reference point (∞ if none)
pub fn brute_nearest(queries: &[Vec<f64>], refs: &[Vec<f64>], leave_one_out: bool) -> Vec<f64> {
    queries
        .iter()
        .enumerate()
        .map(|(i, q)| {
            refs.iter()
                .enumerate()
                .filter(|&(j, _)| !(leave_one_out && i == j))
                .map(|(_, r)| distance_sq(q, r))
                .fold(f64::INFINITY, f64::min)
        })
        .collect()
}

/// Normalised Gaussian density at every query point
pub fn brute_density(queries: &[Vec<f64>], refs: &[Vec<f64>], bandwidth: f64) -> Vec<f64> {
    let dim = refs[0].len() as f64;
    let norm = 1.0 / (refs.len() as f64 * (2.0 * std::f64::consts::PI * bandwidth * bandwidth).powf(dim / 2.0));
    queries
        .iter()
        .map(|q| {
            refs.iter()
                .map(|r| (-distance_sq(q, r) / (2.0 * bandwidth * bandwidth)).exp())
                .sum::<f64>()
                * norm
        })
        .collect()
}
