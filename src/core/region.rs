//! Axis-aligned integer boxes in N-dimensional index space.
//!
//! A [`Region`] is an origin index plus a non-negative extent per axis. It is a
//! plain value: all algebra returns new regions. Axis 0 varies fastest in every
//! ordering this crate uses (buffers, cursors, splitting).

use crate::core::error::{RegionError, RegionResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest dimension a region (and therefore an image) may have.
pub const MAX_DIMENSION: usize = 8;

/// An axis-aligned box `[origin, origin + size)` in index space.
///
/// A region with `size[i] == 0` on some axis is empty: it is a valid value
/// meaning "nothing requested / nothing available". `Region::default()` is the
/// zero-dimensional empty region used for data objects that have not been
/// given any information yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    origin: Vec<i64>,
    size: Vec<usize>,
}

fn check_dimension(dimension: usize) -> RegionResult<()> {
    if dimension == 0 || dimension > MAX_DIMENSION {
        return Err(RegionError::Invalid {
            reason: format!("dimension must be in 1..={MAX_DIMENSION}, got {dimension}"),
        });
    }
    Ok(())
}

impl Region {
    /// Create a region from an origin and a size.
    pub fn new(origin: Vec<i64>, size: Vec<usize>) -> RegionResult<Self> {
        check_dimension(origin.len())?;
        if origin.len() != size.len() {
            return Err(RegionError::DimensionMismatch {
                expected: origin.len(),
                got: size.len(),
            });
        }
        Ok(Self { origin, size })
    }

    /// Create a region from signed extents, rejecting negative sizes.
    pub fn from_signed(origin: Vec<i64>, size: Vec<i64>) -> RegionResult<Self> {
        if let Some(axis) = size.iter().position(|&s| s < 0) {
            return Err(RegionError::Invalid {
                reason: format!("negative size {} on axis {}", size[axis], axis),
            });
        }
        Self::new(origin, size.into_iter().map(|s| s as usize).collect())
    }

    /// Region starting at the zero index.
    ///
    /// Sizes outside `1..=MAX_DIMENSION` axes yield the zero-dimensional region.
    pub fn from_size(size: Vec<usize>) -> Self {
        if check_dimension(size.len()).is_err() {
            return Self::default();
        }
        Self {
            origin: vec![0; size.len()],
            size,
        }
    }

    /// The canonical empty region of a dimension.
    pub fn empty(dimension: usize) -> Self {
        Self {
            origin: vec![0; dimension],
            size: vec![0; dimension],
        }
    }

    /// Build from per-axis half-open bounds; any inverted axis yields the
    /// canonical empty region.
    fn from_bounds(lower: &[i64], upper: &[i64]) -> Self {
        if lower.iter().zip(upper).any(|(lo, hi)| hi < lo) {
            return Self::empty(lower.len());
        }
        Self {
            origin: lower.to_vec(),
            size: lower
                .iter()
                .zip(upper)
                .map(|(lo, hi)| (hi - lo) as usize)
                .collect(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.origin.len()
    }

    pub fn origin(&self) -> &[i64] {
        &self.origin
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    /// Exclusive upper bound along an axis.
    pub fn upper(&self, axis: usize) -> i64 {
        self.origin[axis] + self.size[axis] as i64
    }

    /// Exclusive upper bound on every axis.
    pub fn upper_bounds(&self) -> Vec<i64> {
        (0..self.dimension()).map(|axis| self.upper(axis)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty() || self.size.iter().any(|&s| s == 0)
    }

    /// Number of index positions covered.
    pub fn num_samples(&self) -> usize {
        if self.size.is_empty() {
            return 0;
        }
        self.size.iter().product()
    }

    // ========================================================================
    // Set algebra
    // ========================================================================

    /// Per-axis clamp of both boxes.
    ///
    /// Disjoint regions intersect to the canonical empty region. Regions of
    /// different dimension share no samples and intersect to the empty region
    /// of the smaller dimension, whichever side it is on.
    pub fn intersection(&self, other: &Region) -> Region {
        if self.dimension() != other.dimension() {
            return Self::empty(self.dimension().min(other.dimension()));
        }
        let lower: Vec<i64> = self
            .origin
            .iter()
            .zip(&other.origin)
            .map(|(a, b)| *a.max(b))
            .collect();
        let upper: Vec<i64> = (0..self.dimension())
            .map(|axis| self.upper(axis).min(other.upper(axis)))
            .collect();
        Self::from_bounds(&lower, &upper)
    }

    /// Clamp this region to `bounds`.
    ///
    /// A result smaller than `self` is not an error here; callers decide
    /// whether the missing part matters.
    pub fn crop(&self, bounds: &Region) -> Region {
        self.intersection(bounds)
    }

    /// Whether `index` lies inside the region.
    pub fn contains_index(&self, index: &[i64]) -> bool {
        index.len() == self.dimension()
            && index
                .iter()
                .enumerate()
                .all(|(axis, &i)| i >= self.origin[axis] && i < self.upper(axis))
    }

    /// Whether `other` lies entirely inside the region. Empty regions of the
    /// same dimension are contained in everything.
    pub fn contains_region(&self, other: &Region) -> bool {
        if self.dimension() != other.dimension() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        (0..self.dimension()).all(|axis| {
            other.origin[axis] >= self.origin[axis] && other.upper(axis) <= self.upper(axis)
        })
    }

    /// Minkowski enlargement by a per-axis radius.
    pub fn padded_by(&self, radius: &[usize]) -> Region {
        if self.is_empty() || radius.len() != self.dimension() {
            return self.clone();
        }
        Self {
            origin: self
                .origin
                .iter()
                .zip(radius)
                .map(|(o, r)| o - *r as i64)
                .collect(),
            size: self.size.iter().zip(radius).map(|(s, r)| s + 2 * r).collect(),
        }
    }

    /// Erosion by a per-axis radius; axes too small to erode become empty.
    pub fn shrunk_by(&self, radius: &[usize]) -> Region {
        if radius.len() != self.dimension() {
            return Self::empty(self.dimension());
        }
        if self.size.iter().zip(radius).any(|(s, r)| *s < 2 * r) {
            return Self::empty(self.dimension());
        }
        Self {
            origin: self
                .origin
                .iter()
                .zip(radius)
                .map(|(o, r)| o + *r as i64)
                .collect(),
            size: self.size.iter().zip(radius).map(|(s, r)| s - 2 * r).collect(),
        }
    }

    /// The same box moved by `offset`.
    pub fn translated(&self, offset: &[i64]) -> Region {
        Self {
            origin: self.origin.iter().zip(offset).map(|(o, d)| o + d).collect(),
            size: self.size.clone(),
        }
    }

    /// Smallest region containing both. Empty operands are ignored.
    pub fn bounding_union(&self, other: &Region) -> Region {
        if other.is_empty() || self.dimension() != other.dimension() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let lower: Vec<i64> = self
            .origin
            .iter()
            .zip(&other.origin)
            .map(|(a, b)| *a.min(b))
            .collect();
        let upper: Vec<i64> = (0..self.dimension())
            .map(|axis| self.upper(axis).max(other.upper(axis)))
            .collect();
        Self::from_bounds(&lower, &upper)
    }

    /// Disjoint boxes covering `self` minus `other`.
    ///
    /// Slabs are peeled off axis by axis, lower side first, so the result is
    /// ordered by axis.
    pub fn subtract(&self, other: &Region) -> Vec<Region> {
        if self.is_empty() {
            return Vec::new();
        }
        let inner = self.intersection(other);
        if inner.is_empty() {
            return vec![self.clone()];
        }

        let mut pieces = Vec::new();
        let mut remaining = self.clone();
        for axis in 0..self.dimension() {
            let lo = remaining.origin[axis];
            let hi = remaining.upper(axis);
            let inner_lo = inner.origin[axis];
            let inner_hi = inner.upper(axis);

            if inner_lo > lo {
                let mut slab = remaining.clone();
                slab.size[axis] = (inner_lo - lo) as usize;
                pieces.push(slab);
            }
            if inner_hi < hi {
                let mut slab = remaining.clone();
                slab.origin[axis] = inner_hi;
                slab.size[axis] = (hi - inner_hi) as usize;
                pieces.push(slab);
            }
            remaining.origin[axis] = inner_lo;
            remaining.size[axis] = (inner_hi - inner_lo) as usize;
        }
        pieces
    }

    /// Every index of the region, axis 0 fastest.
    pub fn indices(&self) -> RegionIndices {
        RegionIndices::new(self)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dimension() == 0 {
            return write!(f, "{{}}");
        }
        write!(f, "{{")?;
        for axis in 0..self.dimension() {
            if axis > 0 {
                write!(f, " x ")?;
            }
            write!(f, "[{}, {})", self.origin[axis], self.upper(axis))?;
        }
        write!(f, "}}")
    }
}

/// Iterator over the indices of a region in buffer order.
#[derive(Debug, Clone)]
pub struct RegionIndices {
    lower: Vec<i64>,
    upper: Vec<i64>,
    current: Vec<i64>,
    done: bool,
}

impl RegionIndices {
    fn new(region: &Region) -> Self {
        Self {
            lower: region.origin.clone(),
            upper: region.upper_bounds(),
            current: region.origin.clone(),
            done: region.is_empty(),
        }
    }
}

impl Iterator for RegionIndices {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.current.clone();

        self.done = true;
        for axis in 0..self.current.len() {
            self.current[axis] += 1;
            if self.current[axis] < self.upper[axis] {
                self.done = false;
                break;
            }
            self.current[axis] = self.lower[axis];
        }

        Some(item)
    }
}
