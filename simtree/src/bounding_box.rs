use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::tree::tree_types::{IndexError, IndexResult};

/// A d-dimensional axis-aligned bounding box.
///
/// `HyperBoundingBox` stores the minimum and maximum coordinate of every
/// dimension. Points are represented as degenerate boxes with `min == max`.
///
/// # Examples
///
/// ```rust
/// use simtree::HyperBoundingBox;
///
/// let bbox = HyperBoundingBox::new(vec![0.0, 0.0], vec![10.0, 5.0]).unwrap();
/// assert_eq!(bbox.volume(), 50.0);
/// assert!(bbox.contains_point(&[3.0, 4.0]));
/// ```
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct HyperBoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl Eq for HyperBoundingBox {}

impl Hash for HyperBoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for v in self.min.iter().chain(self.max.iter()) {
            v.to_bits().hash(state);
        }
    }
}

impl std::fmt::Display for HyperBoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HyperBoundingBox({:?}, {:?})", self.min, self.max)
    }
}

impl HyperBoundingBox {
    /// Creates a box from its corners.
    ///
    /// Fails if the corners differ in dimensionality or `min > max` in some
    /// dimension.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> IndexResult<Self> {
        if min.len() != max.len() {
            return Err(IndexError::InvalidArgument(format!(
                "corner dimensionality differs: {} vs {}",
                min.len(),
                max.len()
            )));
        }
        if min.iter().zip(&max).any(|(lo, hi)| !(lo <= hi)) {
            return Err(IndexError::InvalidArgument(format!(
                "min corner {:?} exceeds max corner {:?}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// The degenerate box of a single point
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Smallest box enclosing all `boxes`; `None` if there are none.
    pub fn union_all<'a>(mut boxes: impl Iterator<Item = &'a HyperBoundingBox>) -> Option<Self> {
        let mut result = boxes.next()?.clone();
        for b in boxes {
            result.extend(b);
        }
        Some(result)
    }

    pub fn dimensionality(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    pub fn center(&self) -> Vec<f64> {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| (lo + hi) / 2.0)
            .collect()
    }

    /// Product of the extents
    pub fn volume(&self) -> f64 {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    /// Sum of the extents
    pub fn margin(&self) -> f64 {
        self.min.iter().zip(&self.max).map(|(lo, hi)| hi - lo).sum()
    }

    pub fn extent(&self, dim: usize) -> f64 {
        self.max[dim] - self.min[dim]
    }

    pub fn union(&self, other: &HyperBoundingBox) -> HyperBoundingBox {
        let mut result = self.clone();
        result.extend(other);
        result
    }

    pub fn extend(&mut self, other: &HyperBoundingBox) {
        for d in 0..self.min.len() {
            self.min[d] = self.min[d].min(other.min[d]);
            self.max[d] = self.max[d].max(other.max[d]);
        }
    }

    /// Volume increase needed to enclose `other`
    pub fn enlargement(&self, other: &HyperBoundingBox) -> f64 {
        self.union(other).volume() - self.volume()
    }

    /// Volume of the intersection, 0 if the boxes are disjoint
    pub fn overlap(&self, other: &HyperBoundingBox) -> f64 {
        let mut volume = 1.0;
        for d in 0..self.min.len() {
            let lo = self.min[d].max(other.min[d]);
            let hi = self.max[d].min(other.max[d]);
            if hi < lo {
                return 0.0;
            }
            volume *= hi - lo;
        }
        volume
    }

    pub fn intersects(&self, other: &HyperBoundingBox) -> bool {
        (0..self.min.len()).all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }

    pub fn contains(&self, other: &HyperBoundingBox) -> bool {
        (0..self.min.len()).all(|d| self.min[d] <= other.min[d] && other.max[d] <= self.max[d])
    }

    pub fn contains_point(&self, point: &[f64]) -> bool {
        point.len() == self.min.len()
            && point
                .iter()
                .enumerate()
                .all(|(d, v)| self.min[d] <= *v && *v <= self.max[d])
    }
}
