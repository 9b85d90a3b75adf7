//! Depth-first dual-tree traversal
//!
//! `DualTreeEngine::doit` walks a query subtree against the reference tree:
//! the root pair is checked intrinsically, `pair` recurses by splitting the
//! larger side (or the non-leaf side) until both nodes are leaves, the base
//! case evaluates every point pair, and a final push-down delivers pending
//! postponed contributions to every query point before postprocessing.
//!
//! Reference children are visited in heuristic order. While the first one
//! is explored, the second's delta is folded into the "unvisited" summary
//! so pruning decisions account for mass not yet seen.

mod config;
mod mutables;
mod stats;
mod traversal;

pub use config::EngineConfig;
pub use mutables::{MutableTable, QMutables};
pub use stats::TraversalStats;
pub use traversal::{DualTreeEngine, TraversalOutput, TreeStores};
