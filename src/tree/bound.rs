//! Axis-aligned bounding regions
//!
//! Distance bounds between regions drive every pruning decision:
//!   min_distance_sq(A, B) ≤ |a - b|² ≤ max_distance_sq(A, B)
//! for all a ∈ A, b ∈ B.

use std::fmt;

/// Squared Euclidean distance between two coordinate slices.
#[inline]
pub fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "dimension mismatch");
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Axis-aligned bounding box over a set of points
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl BoundingBox {
    /// Empty box of the given dimension (contains nothing until expanded)
    pub fn empty(dim: usize) -> Self {
        Self {
            min: vec![f64::INFINITY; dim],
            max: vec![f64::NEG_INFINITY; dim],
        }
    }

    /// Smallest box containing every point in the iterator
    pub fn from_points<'a, I>(dim: usize, points: I) -> Self
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut bound = Self::empty(dim);
        for point in points {
            bound.expand(point);
        }
        bound
    }

    /// Grow the box to contain `point`
    pub fn expand(&mut self, point: &[f64]) {
        debug_assert_eq!(point.len(), self.dim(), "dimension mismatch");
        for (d, &x) in point.iter().enumerate() {
            if x < self.min[d] {
                self.min[d] = x;
            }
            if x > self.max[d] {
                self.max[d] = x;
            }
        }
    }

    /// Number of dimensions
    #[inline]
    pub fn dim(&self) -> usize {
        self.min.len()
    }

    /// Whether nothing has been added yet
    pub fn is_empty(&self) -> bool {
        self.min.iter().zip(&self.max).any(|(lo, hi)| lo > hi)
    }

    /// Lower corner
    pub fn min(&self) -> &[f64] {
        &self.min
    }

    /// Upper corner
    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Extent along dimension `d`
    #[inline]
    pub fn width(&self, d: usize) -> f64 {
        self.max[d] - self.min[d]
    }

    /// Dimension with the largest extent (first one on ties)
    pub fn widest_dimension(&self) -> usize {
        let mut best = 0;
        for d in 1..self.dim() {
            if self.width(d) > self.width(best) {
                best = d;
            }
        }
        best
    }

    /// Whether `point` lies inside the box (boundary inclusive)
    pub fn contains(&self, point: &[f64]) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(d, &x)| x >= self.min[d] && x <= self.max[d])
    }

    /// Smallest squared distance between any point of `self` and any point of `other`
    pub fn min_distance_sq(&self, other: &BoundingBox) -> f64 {
        debug_assert_eq!(self.dim(), other.dim(), "dimension mismatch");
        let mut sum = 0.0;
        for d in 0..self.dim() {
            let gap = (other.min[d] - self.max[d]).max(self.min[d] - other.max[d]);
            if gap > 0.0 {
                sum += gap * gap;
            }
        }
        sum
    }

    /// Largest squared distance between any point of `self` and any point of `other`
    pub fn max_distance_sq(&self, other: &BoundingBox) -> f64 {
        debug_assert_eq!(self.dim(), other.dim(), "dimension mismatch");
        let mut sum = 0.0;
        for d in 0..self.dim() {
            let span = (other.max[d] - self.min[d]).max(self.max[d] - other.min[d]);
            sum += span * span;
        }
        sum
    }

    /// Smallest squared distance from `point` to the box
    pub fn min_distance_sq_to_point(&self, point: &[f64]) -> f64 {
        let mut sum = 0.0;
        for (d, &x) in point.iter().enumerate() {
            let gap = (self.min[d] - x).max(x - self.max[d]);
            if gap > 0.0 {
                sum += gap * gap;
            }
        }
        sum
    }

    /// Largest squared distance from `point` to the box
    pub fn max_distance_sq_to_point(&self, point: &[f64]) -> f64 {
        let mut sum = 0.0;
        for (d, &x) in point.iter().enumerate() {
            let span = (x - self.min[d]).abs().max((self.max[d] - x).abs());
            sum += span * span;
        }
        sum
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for d in 0..self.dim() {
            if d > 0 {
                write!(f, " × ")?;
            }
            write!(f, "{:.3}..{:.3}", self.min[d], self.max[d])?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(offset: f64) -> BoundingBox {
        BoundingBox::from_points(2, [&[offset, 0.0][..], &[offset + 1.0, 1.0][..]])
    }

    #[test]
    fn test_disjoint_boxes() {
        let a = unit_box(0.0);
        let b = unit_box(3.0);
        // gap of 2 along x, overlap along y
        assert_eq!(a.min_distance_sq(&b), 4.0);
        // farthest corners: dx = 4, dy = 1
        assert_eq!(a.max_distance_sq(&b), 17.0);
        assert_eq!(a.min_distance_sq(&b), b.min_distance_sq(&a));
        assert_eq!(a.max_distance_sq(&b), b.max_distance_sq(&a));
    }

    #[test]
    fn test_overlapping_boxes_have_zero_min_distance() {
        let a = unit_box(0.0);
        let b = unit_box(0.5);
        assert_eq!(a.min_distance_sq(&b), 0.0);
    }

    #[test]
    fn test_point_bounds_bracket_true_distance() {
        let bound = unit_box(0.0);
        let inside = [0.25, 0.75];
        let query = [2.0, 2.0];
        let d = distance_sq(&inside, &query);
        assert!(bound.min_distance_sq_to_point(&query) <= d);
        assert!(bound.max_distance_sq_to_point(&query) >= d);
        assert!(bound.contains(&inside));
        assert!(!bound.contains(&query));
    }

    #[test]
    fn test_widest_dimension() {
        let bound = BoundingBox::from_points(3, [&[0.0, 0.0, 0.0][..], &[1.0, 5.0, 2.0][..]]);
        assert_eq!(bound.widest_dimension(), 1);
        assert!(BoundingBox::empty(3).is_empty());
        assert!(!bound.is_empty());
    }
}
