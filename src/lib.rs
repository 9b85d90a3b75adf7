//! # Dual-tree traversal for generalized N-body problems
//!
//! A generalized N-body problem computes, for every query point, an
//! aggregate over all reference points (nearest neighbour, range count,
//! kernel sum, ...). This library solves such problems by walking a query
//! tree and a reference tree together, pruning node pairs whose outcome is
//! already decided by cheap bounds.
//!
//! ## Pieces
//!
//! 1. **Trees**: pre-order kd-trees with bounding boxes (`tree`)
//! 2. **Stores**: index-addressed node/point access with scoped acquisition (`store`)
//! 3. **Policies**: the per-problem algebra and pruning predicates (`policy`)
//! 4. **Engine**: the depth-first dual-tree recursion (`engine`)
//!
//! ## Usage Example
//!
//! ```
//! use dualtree::{DualTreeEngine, EngineConfig, KdTree, RangeCount, RangeCountParam};
//!
//! let mut points: Vec<Vec<f64>> = (0..64).map(|i| vec![(i % 8) as f64, (i / 8) as f64]).collect();
//! let tree = KdTree::build(&mut points, 4)?;
//!
//! let engine = DualTreeEngine::<RangeCount>::new(RangeCountParam::new(1.0)?, EngineConfig::new());
//! let output = engine.run_trees(&tree, &points, &tree, &points)?;
//!
//! // the pair ledger covers every (query, reference) pair exactly once
//! assert_eq!(output.global.pairs.total(), 64 * 64);
//! # Ok::<(), dualtree::TraversalError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod engine; // Dual-tree recursion
pub mod io; // Point-set files
pub mod ledger; // Postponed-flush tracking
pub mod policy; // Problem algebra
pub mod store; // Node and point access
pub mod tree; // Space-partitioning trees

pub use engine::{DualTreeEngine, EngineConfig, TraversalOutput, TraversalStats, TreeStores};
pub use policy::{
    Gnp, KernelSum, KernelSumParam, NearestNeighbor, NearestNeighborParam, PairCounts,
    PolicyRegistry, RangeCount, RangeCountParam,
};
pub use store::{AccessMode, ArenaCache, NodeStore, StoreError};
pub use tree::{BoundingBox, KdTree, TreeError, TreeNode};

use thiserror::Error;

/// Errors that can occur during a traversal
#[derive(Error, Debug)]
pub enum TraversalError {
    /// Node or point store refused an access
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Tree construction or reordering failed
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Requested query node range is empty or outside the node store
    #[error("invalid query node range [{root}, {end})")]
    InvalidQueryRange {
        /// Query subtree root
        root: usize,
        /// One past the subtree's last node
        end: usize,
    },

    /// Policy parameter out of its domain
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Traversal bookkeeping found an inconsistency
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
