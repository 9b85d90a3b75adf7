//! Space-partitioning trees over point sets
//!
//! Trees are built once, before any traversal, and are read-only afterwards.
//! Nodes live in a flat arena in pre-order, so the subtree rooted at node `i`
//! occupies the contiguous index range `[i, subtree_end(i))`. Building a tree
//! permutes the points into tree order; `old_from_new` maps back.

mod bound;
mod node;

pub use bound::{distance_sq, BoundingBox};
pub use node::TreeNode;

use thiserror::Error;

use crate::store::ArenaCache;

/// Errors raised while building a tree
#[derive(Debug, Error)]
pub enum TreeError {
    /// No points supplied
    #[error("cannot build a tree over an empty point set")]
    EmptyPointSet,

    /// Leaf size must be positive
    #[error("leaf size must be > 0")]
    InvalidLeafSize,

    /// Points have inconsistent (or zero) dimension
    #[error("point {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        /// Offending point (original order)
        index: usize,
        /// Dimension of the first point
        expected: usize,
        /// Dimension of the offending point
        found: usize,
    },

    /// A per-point array does not match the tree size
    #[error("expected {expected} values in tree order, got {found}")]
    LengthMismatch {
        /// Number of points in the tree
        expected: usize,
        /// Number of values supplied
        found: usize,
    },
}

/// Anything with Euclidean coordinates
pub trait Coordinates {
    /// Coordinate slice (length = dimension)
    fn coords(&self) -> &[f64];
}

impl Coordinates for Vec<f64> {
    fn coords(&self) -> &[f64] {
        self
    }
}

impl Coordinates for Box<[f64]> {
    fn coords(&self) -> &[f64] {
        self
    }
}

impl<const D: usize> Coordinates for [f64; D] {
    fn coords(&self) -> &[f64] {
        self
    }
}

/// kd-tree with median splits along the widest dimension
#[derive(Debug, Clone)]
pub struct KdTree {
    /// Node arena (pre-order, root at index 0)
    nodes: Vec<TreeNode>,

    /// `old_from_new[i]` = original position of the point now at tree index `i`
    old_from_new: Vec<usize>,

    /// Maximum points per leaf
    leaf_size: usize,
}

impl KdTree {
    /// Build a tree over `points`, permuting them into tree order
    pub fn build<P: Coordinates>(points: &mut Vec<P>, leaf_size: usize) -> Result<Self, TreeError> {
        if points.is_empty() {
            return Err(TreeError::EmptyPointSet);
        }
        if leaf_size == 0 {
            return Err(TreeError::InvalidLeafSize);
        }

        let dim = points[0].coords().len();
        for (index, point) in points.iter().enumerate() {
            let found = point.coords().len();
            if found != dim || found == 0 {
                return Err(TreeError::DimensionMismatch {
                    index,
                    expected: dim,
                    found,
                });
            }
        }

        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut tree = Self {
            nodes: Vec::with_capacity(2 * points.len() / leaf_size + 1),
            old_from_new: Vec::new(),
            leaf_size,
        };
        tree.build_node(&mut order, 0, points.len(), points, dim);

        // Move points into tree order
        let mut slots: Vec<Option<P>> = points.drain(..).map(Some).collect();
        points.extend(order.iter().filter_map(|&old| slots[old].take()));
        tree.old_from_new = order;

        Ok(tree)
    }

    fn build_node<P: Coordinates>(
        &mut self,
        order: &mut [usize],
        begin: usize,
        end: usize,
        points: &[P],
        dim: usize,
    ) -> usize {
        let bound = BoundingBox::from_points(dim, order[begin..end].iter().map(|&i| points[i].coords()));
        let index = self.nodes.len();
        let count = end - begin;

        if count <= self.leaf_size {
            self.nodes.push(TreeNode::leaf(begin, end, bound));
            return index;
        }

        let axis = bound.widest_dimension();
        let half = count / 2;
        order[begin..end].select_nth_unstable_by(half, |&a, &b| {
            points[a].coords()[axis].total_cmp(&points[b].coords()[axis])
        });

        // Reserve the slot so children land after their parent
        self.nodes.push(TreeNode::leaf(begin, end, bound.clone()));
        let left = self.build_node(order, begin, begin + half, points, dim);
        let right = self.build_node(order, begin + half, end, points, dim);
        self.nodes[index] = TreeNode::internal(begin, end, bound, left, right);

        index
    }

    /// Root node
    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    /// All nodes in pre-order
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a built tree
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of points indexed by the tree
    pub fn num_points(&self) -> usize {
        self.old_from_new.len()
    }

    /// Leaf size used at build time
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// Original position of every point, in tree order
    pub fn old_from_new(&self) -> &[usize] {
        &self.old_from_new
    }

    /// One past the last node index of the subtree rooted at `index`
    pub fn subtree_end(&self, index: usize) -> usize {
        let mut node = &self.nodes[index];
        let mut last = index;
        while let Some([a, b]) = node.children {
            last = a.max(b);
            node = &self.nodes[last];
        }
        last + 1
    }

    /// Height of the tree (a single leaf has height 0)
    pub fn height(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match nodes[index].children {
                Some([a, b]) => 1 + walk(nodes, a).max(walk(nodes, b)),
                None => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Copy of the tree with every node's child labels swapped
    ///
    /// Same points, same ranges; only the order in which a traversal
    /// meets the children changes.
    pub fn mirrored(&self) -> Self {
        let mut tree = self.clone();
        for node in &mut tree.nodes {
            if let Some([a, b]) = node.children {
                node.children = Some([b, a]);
            }
        }
        tree
    }

    /// Read-only node store over this tree
    pub fn node_cache(&self) -> ArenaCache<'_, TreeNode> {
        ArenaCache::borrowed(&self.nodes)
    }

    /// Reorder per-point values from tree order back to original order
    pub fn to_original_order<T>(&self, tree_ordered: Vec<T>) -> Result<Vec<T>, TreeError> {
        if tree_ordered.len() != self.old_from_new.len() {
            return Err(TreeError::LengthMismatch {
                expected: self.old_from_new.len(),
                found: tree_ordered.len(),
            });
        }

        let mut slots: Vec<Option<T>> = Vec::with_capacity(tree_ordered.len());
        slots.resize_with(tree_ordered.len(), || None);
        for (new, value) in tree_ordered.into_iter().enumerate() {
            slots[self.old_from_new[new]] = Some(value);
        }
        Ok(slots.into_iter().flatten().collect())
    }
}
