//! Tree node representation
//!
//! Node = point range [begin, end) + bounding region + optional children
//! Children are addressed by index into the owning node arena;
//! nodes are immutable once the tree is built.

use std::fmt;
use std::ops::Range;

use super::BoundingBox;

/// Binary space-partitioning tree node
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeNode {
    /// First point index (inclusive)
    pub begin: usize,

    /// Last point index (exclusive)
    pub end: usize,

    /// Child node indices, `None` for a leaf
    pub children: Option<[usize; 2]>,

    /// Region containing every point in `[begin, end)`
    pub bound: BoundingBox,
}

impl TreeNode {
    /// Create a leaf over `[begin, end)`
    pub fn leaf(begin: usize, end: usize, bound: BoundingBox) -> Self {
        debug_assert!(begin < end, "Empty node range");
        Self {
            begin,
            end,
            children: None,
            bound,
        }
    }

    /// Create an internal node with two children
    pub fn internal(begin: usize, end: usize, bound: BoundingBox, left: usize, right: usize) -> Self {
        debug_assert!(begin < end, "Empty node range");
        Self {
            begin,
            end,
            children: Some([left, right]),
            bound,
        }
    }

    /// Check if leaf
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Number of points under this node
    #[inline]
    pub fn count(&self) -> usize {
        self.end - self.begin
    }

    /// Point index range
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    /// Child index `k` (0 or 1)
    ///
    /// Panics in debug builds when called on a leaf.
    #[inline]
    pub fn child(&self, k: usize) -> usize {
        debug_assert!(!self.is_leaf(), "Leaf has no children");
        debug_assert!(k < 2, "Binary tree has two children");
        match self.children {
            Some(children) => children[k],
            None => usize::MAX,
        }
    }

    /// Whether this node's point range fully contains `other`'s
    ///
    /// Only meaningful when both nodes index the same point set.
    pub fn contains_range(&self, other: &TreeNode) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Whether the two point ranges share any index
    pub fn overlaps_range(&self, other: &TreeNode) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_leaf() {
            write!(f, "leaf[{}, {})", self.begin, self.end)
        } else {
            write!(f, "[{}, {})", self.begin, self.end)
        }
    }
}
