//! Boundary conditions for neighborhood access outside the buffered region.
//!
//! A boundary condition maps an index that falls outside an image's buffered
//! region back to a defined value. Indices are mapped against the image's
//! largest possible region, so a window at the edge of the domain reads the
//! same samples whatever part of the domain happens to be buffered. Nodes
//! make that hold by requesting [`BoundaryMode::required_region`] from their
//! input.

use crate::core::error::RegionResult;
use crate::core::image::Image;
use crate::core::region::{Region, MAX_DIMENSION};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy producing a sample for an out-of-bounds index.
pub trait BoundaryCondition: Send + Sync + fmt::Debug {
    /// Value at `index`, which may lie outside `image`'s buffered region.
    fn value_at(&self, index: &[i64], image: &Image) -> f32;
}

/// The built-in boundary conditions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Every outside sample reads as the given constant (zero-padding with 0).
    Constant(f32),
    /// Clamp to the nearest edge sample.
    Nearest,
    /// Half-sample symmetric reflection: `... b a | a b c | c b ...`.
    Mirror,
    /// Wrap around: `... b c | a b c | a b ...`.
    Periodic,
}

impl Default for BoundaryMode {
    fn default() -> Self {
        BoundaryMode::Nearest
    }
}

impl BoundaryMode {
    /// Map one coordinate into `[lower, lower + extent)`.
    ///
    /// Returns `None` for `Constant`, which never maps back into the buffer.
    fn map_coordinate(&self, c: i64, lower: i64, extent: i64) -> Option<i64> {
        let local = c - lower;
        let mapped = match self {
            BoundaryMode::Constant(_) => return None,
            BoundaryMode::Nearest => local.clamp(0, extent - 1),
            BoundaryMode::Mirror => {
                let r = local.rem_euclid(2 * extent);
                if r < extent {
                    r
                } else {
                    2 * extent - 1 - r
                }
            }
            BoundaryMode::Periodic => local.rem_euclid(extent),
        };
        Some(lower + mapped)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoundaryMode::Constant(_) => "constant",
            BoundaryMode::Nearest => "nearest",
            BoundaryMode::Mirror => "mirror",
            BoundaryMode::Periodic => "periodic",
        }
    }

    /// Map `index` into `domain`, or `None` when the mode reads a constant.
    fn map_index(&self, index: &[i64], domain: &Region) -> Option<[i64; MAX_DIMENSION]> {
        if index.len() != domain.dimension() || domain.is_empty() {
            return None;
        }
        let mut mapped = [0i64; MAX_DIMENSION];
        for (axis, &c) in index.iter().enumerate() {
            let lower = domain.origin()[axis];
            let extent = domain.size()[axis] as i64;
            mapped[axis] = if c >= lower && c < lower + extent {
                c
            } else {
                self.map_coordinate(c, lower, extent)?
            };
        }
        Some(mapped)
    }

    /// Input region needed to evaluate windows over `padded` (an output
    /// request padded by the window radius) inside `domain`.
    ///
    /// Periodic wraps the part of `padded` outside the domain onto the far
    /// edge, so every axis that leaves the domain is widened to the whole
    /// domain extent. Mirror reflects onto samples `padded` already covers
    /// unless the overhang exceeds the domain, in which case the axis is
    /// widened too. The result is not cropped.
    pub fn required_region(&self, padded: &Region, domain: &Region) -> RegionResult<Region> {
        if padded.is_empty() || domain.is_empty() || padded.dimension() != domain.dimension() {
            return Ok(padded.clone());
        }
        let mut origin = Vec::with_capacity(padded.dimension());
        let mut size = Vec::with_capacity(padded.dimension());
        for axis in 0..padded.dimension() {
            let (mut lower, mut upper) = (padded.origin()[axis], padded.upper(axis));
            let (domain_lower, domain_upper) = (domain.origin()[axis], domain.upper(axis));
            let extent = domain_upper - domain_lower;
            let below = domain_lower - lower;
            let above = upper - domain_upper;
            let widen = match self {
                BoundaryMode::Periodic => below > 0 || above > 0,
                BoundaryMode::Mirror => below > extent || above > extent,
                _ => false,
            };
            if widen {
                lower = lower.min(domain_lower);
                upper = upper.max(domain_upper);
            }
            origin.push(lower);
            size.push((upper - lower) as usize);
        }
        Region::new(origin, size)
    }

    /// Names accepted by [`FromStr`].
    pub fn names() -> &'static [&'static str] {
        &["constant", "nearest", "mirror", "periodic"]
    }
}

impl BoundaryCondition for BoundaryMode {
    fn value_at(&self, index: &[i64], image: &Image) -> f32 {
        let outside = match self {
            BoundaryMode::Constant(value) => *value,
            _ => 0.0,
        };
        // An image whose buffer misses the mapped sample wraps within the
        // buffer instead.
        for region in [image.largest_possible_region(), image.buffered_region()] {
            let Some(mapped) = self.map_index(index, region) else {
                continue;
            };
            if let Some(value) = image.get(&mapped[..index.len()]) {
                return value;
            }
        }
        outside
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryMode::Constant(value) => write!(f, "constant({value})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    /// Parses a mode name; `constant` and `zero` both yield `Constant(0.0)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" | "zero" => Ok(BoundaryMode::Constant(0.0)),
            "nearest" | "clamp" => Ok(BoundaryMode::Nearest),
            "mirror" | "reflect" => Ok(BoundaryMode::Mirror),
            "periodic" | "wrap" => Ok(BoundaryMode::Periodic),
            other => Err(format!(
                "unknown boundary condition '{}', expected one of {:?}",
                other,
                BoundaryMode::names()
            )),
        }
    }
}
