//! Neighborhood cursors.
//!
//! A cursor walks an iteration region in buffer order (axis 0 fastest) and, at
//! each position, exposes the `∏(2r+1)` samples of a fixed-radius window.
//!
//! Two strategies share the [`NeighborhoodAccess`] interface so that filter
//! logic is written once:
//!
//! - [`InteriorCursor`]: every window position is known to lie inside the
//!   buffered region, so a neighbor is one add into a precomputed offset
//!   table with no per-access check.
//! - [`BoundaryCursor`]: windows may leave the buffer; out-of-range neighbors
//!   are resolved through a [`BoundaryCondition`].
//!
//! [`FaceSplit`] partitions an iteration region into the interior piece and
//! the boundary shell.

use crate::core::boundary::BoundaryCondition;
use crate::core::error::{RegionError, RegionResult};
use crate::core::image::Image;
use crate::core::region::{Region, MAX_DIMENSION};

/// Window shape: a radius per axis and the offsets it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighborhood {
    radius: Vec<usize>,
    /// Offsets of every window element, flattened `len * dimension`.
    offsets: Vec<i64>,
}

impl Neighborhood {
    pub fn new(radius: Vec<usize>) -> RegionResult<Self> {
        let window = Region::from_signed(
            radius.iter().map(|&r| -(r as i64)).collect(),
            radius.iter().map(|&r| 2 * r as i64 + 1).collect(),
        )?;
        let offsets = window.indices().flatten().collect();
        Ok(Self { radius, offsets })
    }

    /// Same radius on every axis.
    pub fn uniform(dimension: usize, radius: usize) -> RegionResult<Self> {
        Self::new(vec![radius; dimension])
    }

    pub fn dimension(&self) -> usize {
        self.radius.len()
    }

    pub fn radius(&self) -> &[usize] {
        &self.radius
    }

    /// Window extent per axis (`2r + 1`).
    pub fn size(&self) -> Vec<usize> {
        self.radius.iter().map(|r| 2 * r + 1).collect()
    }

    /// Number of window elements.
    pub fn len(&self) -> usize {
        self.offsets.len() / self.dimension().max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Position of the zero offset in element order.
    pub fn center(&self) -> usize {
        self.len() / 2
    }

    /// Offset of element `i` relative to the window center.
    pub fn offset(&self, i: usize) -> &[i64] {
        let d = self.dimension();
        &self.offsets[i * d..(i + 1) * d]
    }

    /// Element position of a relative offset, if inside the window.
    pub fn position_of(&self, offset: &[i64]) -> Option<usize> {
        if offset.len() != self.dimension() {
            return None;
        }
        let mut position = 0;
        let mut stride = 1;
        for (o, r) in offset.iter().zip(&self.radius) {
            let shifted = o + *r as i64;
            if shifted < 0 || shifted > 2 * *r as i64 {
                return None;
            }
            position += shifted as usize * stride;
            stride *= 2 * r + 1;
        }
        Some(position)
    }

    /// Linear buffer displacement of every element for the given strides.
    fn linear_offsets(&self, strides: &[usize]) -> Vec<isize> {
        (0..self.len())
            .map(|i| {
                self.offset(i)
                    .iter()
                    .zip(strides)
                    .map(|(o, s)| *o as isize * *s as isize)
                    .sum()
            })
            .collect()
    }
}

/// Indexable read access to the window at the current cursor position.
pub trait NeighborhoodAccess {
    /// Number of window elements.
    fn len(&self) -> usize;

    /// Sample of window element `i`, in [`Neighborhood`] element order.
    fn get(&self, i: usize) -> f32;

    /// Index of the window center.
    fn index(&self) -> &[i64];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn center_value(&self) -> f32 {
        self.get(self.len() / 2)
    }

    /// `Σ coefficients[i] * get(i)` over the window.
    fn inner_product(&self, coefficients: &[f32]) -> f32 {
        coefficients
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.get(i))
            .sum()
    }
}

/// Buffer-order position inside an iteration region.
#[derive(Debug, Clone)]
struct Position {
    lower: Vec<i64>,
    upper: Vec<i64>,
    index: Vec<i64>,
    at_end: bool,
}

impl Position {
    fn new(region: &Region) -> Self {
        Self {
            lower: region.origin().to_vec(),
            upper: region.upper_bounds(),
            index: region.origin().to_vec(),
            at_end: region.is_empty(),
        }
    }

    /// Step to the next index, reporting the linear displacement on a buffer
    /// with `strides`.
    fn advance(&mut self, strides: &[usize], center: &mut isize) {
        for axis in 0..self.index.len() {
            if self.index[axis] + 1 < self.upper[axis] {
                self.index[axis] += 1;
                *center += strides[axis] as isize;
                return;
            }
            *center -= (self.index[axis] - self.lower[axis]) as isize * strides[axis] as isize;
            self.index[axis] = self.lower[axis];
        }
        self.at_end = true;
    }
}

/// Signed buffer offset of `index`; negative or past the end when outside.
fn linear_index(image: &Image, index: &[i64]) -> isize {
    index
        .iter()
        .zip(image.buffered_region().origin())
        .zip(image.strides())
        .map(|((i, o), s)| (i - o) as isize * *s as isize)
        .sum()
}

// ============================================================================
// Interior strategy
// ============================================================================

/// Unchecked cursor over a region whose every window lies in the buffer.
#[derive(Debug)]
pub struct InteriorCursor<'a> {
    data: &'a [f32],
    offsets: Vec<isize>,
    strides: &'a [usize],
    position: Position,
    center: isize,
}

impl<'a> InteriorCursor<'a> {
    /// Bind a cursor to `image` over `region`.
    ///
    /// Fails with [`RegionError::OutsideBuffer`] unless `region` padded by the
    /// radius lies inside the buffered region.
    pub fn new(image: &'a Image, region: &Region, neighborhood: &Neighborhood) -> RegionResult<Self> {
        if region.dimension() != image.buffered_region().dimension()
            || neighborhood.dimension() != region.dimension()
        {
            return Err(RegionError::DimensionMismatch {
                expected: image.buffered_region().dimension(),
                got: region.dimension(),
            });
        }
        let window = region.padded_by(neighborhood.radius());
        if !image.buffered_region().contains_region(&window) {
            return Err(RegionError::OutsideBuffer {
                region: window,
                buffered: image.buffered_region().clone(),
            });
        }

        let position = Position::new(region);
        let center = if position.at_end {
            0
        } else {
            linear_index(image, &position.index)
        };
        Ok(Self {
            data: image.as_slice(),
            offsets: neighborhood.linear_offsets(image.strides()),
            strides: image.strides(),
            position,
            center,
        })
    }

    pub fn is_at_end(&self) -> bool {
        self.position.at_end
    }

    /// Move to the next position in buffer order.
    pub fn advance(&mut self) {
        if !self.position.at_end {
            self.position.advance(self.strides, &mut self.center);
        }
    }
}

impl NeighborhoodAccess for InteriorCursor<'_> {
    fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    fn get(&self, i: usize) -> f32 {
        let at = (self.center + self.offsets[i]) as usize;
        debug_assert!(at < self.data.len());
        // SAFETY: the constructor checked that the iteration region padded by
        // the radius lies inside the buffer, and `center` only visits indices
        // of the iteration region, so every window offset stays in bounds.
        unsafe { *self.data.get_unchecked(at) }
    }

    fn index(&self) -> &[i64] {
        &self.position.index
    }
}

// ============================================================================
// Boundary strategy
// ============================================================================

/// Checked cursor that resolves out-of-buffer neighbors through a boundary
/// condition.
#[derive(Debug)]
pub struct BoundaryCursor<'a> {
    image: &'a Image,
    neighborhood: &'a Neighborhood,
    condition: &'a dyn BoundaryCondition,
    offsets: Vec<isize>,
    /// Centers whose whole window is buffered.
    safe: Region,
    position: Position,
    in_bounds: bool,
    strides: &'a [usize],
    /// Linear offset of the center; a valid buffer position only while
    /// `in_bounds`.
    center: isize,
}

impl<'a> BoundaryCursor<'a> {
    pub fn new(
        image: &'a Image,
        region: &Region,
        neighborhood: &'a Neighborhood,
        condition: &'a dyn BoundaryCondition,
    ) -> RegionResult<Self> {
        if region.dimension() != image.buffered_region().dimension()
            || neighborhood.dimension() != region.dimension()
        {
            return Err(RegionError::DimensionMismatch {
                expected: image.buffered_region().dimension(),
                got: region.dimension(),
            });
        }
        let mut cursor = Self {
            image,
            neighborhood,
            condition,
            offsets: neighborhood.linear_offsets(image.strides()),
            safe: image.buffered_region().shrunk_by(neighborhood.radius()),
            position: Position::new(region),
            in_bounds: false,
            strides: image.strides(),
            center: 0,
        };
        cursor.center = linear_index(image, &cursor.position.index);
        cursor.locate();
        Ok(cursor)
    }

    pub fn is_at_end(&self) -> bool {
        self.position.at_end
    }

    /// Whether the whole window at the current position is buffered.
    pub fn in_bounds(&self) -> bool {
        self.in_bounds
    }

    pub fn advance(&mut self) {
        if self.position.at_end {
            return;
        }
        self.position.advance(self.strides, &mut self.center);
        self.locate();
    }

    fn locate(&mut self) {
        self.in_bounds = !self.position.at_end && self.safe.contains_index(&self.position.index);
    }
}

impl NeighborhoodAccess for BoundaryCursor<'_> {
    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn get(&self, i: usize) -> f32 {
        if self.in_bounds {
            return self.image.as_slice()[(self.center + self.offsets[i]) as usize];
        }

        let d = self.position.index.len();
        let mut index = [0i64; MAX_DIMENSION];
        for (axis, o) in self.neighborhood.offset(i).iter().enumerate() {
            index[axis] = self.position.index[axis] + o;
        }
        let index = &index[..d];
        match self.image.get(index) {
            Some(value) => value,
            None => self.condition.value_at(index, self.image),
        }
    }

    fn index(&self) -> &[i64] {
        &self.position.index
    }
}

// ============================================================================
// Face split
// ============================================================================

/// An iteration region partitioned by cursor strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSplit {
    /// Positions whose whole window is buffered.
    pub interior: Region,
    /// Disjoint boxes covering the rest of the iteration region.
    pub boundary: Vec<Region>,
}

impl FaceSplit {
    pub fn new(region: &Region, buffered: &Region, radius: &[usize]) -> Self {
        let interior = region.intersection(&buffered.shrunk_by(radius));
        let boundary = region.subtract(&interior);
        Self { interior, boundary }
    }
}
