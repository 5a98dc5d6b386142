//! Region splitting for streaming and intra-node parallelism.
//!
//! Both splitters cut along the slowest-varying axis first, so every piece of
//! a buffer-order region is a contiguous run of samples. Pieces are returned
//! in buffer order, are pairwise disjoint, and their union is exactly the
//! input region.

use crate::core::region::Region;
use serde::{Deserialize, Serialize};

/// Default streaming budget (512 MB).
pub const DEFAULT_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

/// The outermost axis along which `region` has more than one sample.
pub fn outermost_axis(region: &Region) -> Option<usize> {
    if region.is_empty() {
        return None;
    }
    (0..region.dimension()).rev().find(|&axis| region.size()[axis] > 1)
}

/// Cut `region` into at most `pieces` slabs along `axis`.
///
/// Every slab but the last has `ceil(size / pieces)` samples along the axis,
/// so fewer pieces than asked may come back.
pub fn split_along(region: &Region, axis: usize, pieces: usize) -> Vec<Region> {
    if region.is_empty() {
        return Vec::new();
    }
    let extent = region.size()[axis];
    let pieces = pieces.clamp(1, extent.max(1));
    let chunk = extent.div_ceil(pieces);

    let mut out = Vec::with_capacity(pieces);
    let mut start = 0;
    while start < extent {
        let len = chunk.min(extent - start);
        let mut origin = region.origin().to_vec();
        let mut size = region.size().to_vec();
        origin[axis] += start as i64;
        size[axis] = len;
        if let Ok(piece) = Region::new(origin, size) {
            out.push(piece);
        }
        start += len;
    }
    out
}

/// A policy turning one region into an ordered list of disjoint pieces.
pub trait SplitPolicy: Send + Sync {
    fn split(&self, region: &Region) -> Vec<Region>;
}

/// Even split into a fixed number of pieces along the outermost axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSplitter {
    pub pieces: usize,
}

impl RegionSplitter {
    pub fn new(pieces: usize) -> Self {
        Self { pieces: pieces.max(1) }
    }
}

impl SplitPolicy for RegionSplitter {
    fn split(&self, region: &Region) -> Vec<Region> {
        match outermost_axis(region) {
            Some(axis) => split_along(region, axis, self.pieces),
            None if region.is_empty() => Vec::new(),
            None => vec![region.clone()],
        }
    }
}

/// Splits a requested region so that each piece fits a memory budget.
///
/// A piece still over budget after cutting its outermost axis down to single
/// slices is split again along the next axis. A single sample is never split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingSplitter {
    /// Budget in bytes per piece.
    pub memory_limit: usize,
    /// Fixed piece count; overrides the budget when set.
    pub pieces: Option<usize>,
    /// Bytes one sample costs across the pipeline.
    pub bytes_per_sample: usize,
}

impl Default for StreamingSplitter {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            pieces: None,
            bytes_per_sample: std::mem::size_of::<f32>(),
        }
    }
}

impl StreamingSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory limit in bytes.
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit.max(1);
        self
    }

    /// Set the memory limit in megabytes.
    pub fn with_memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit = (mb * 1024 * 1024).max(1);
        self
    }

    /// Use a fixed number of pieces instead of the budget.
    pub fn with_pieces(mut self, pieces: usize) -> Self {
        self.pieces = Some(pieces.max(1));
        self
    }

    pub fn with_bytes_per_sample(mut self, bytes: usize) -> Self {
        self.bytes_per_sample = bytes.max(1);
        self
    }

    fn bytes(&self, region: &Region) -> usize {
        region.num_samples().saturating_mul(self.bytes_per_sample)
    }

    fn split_to_budget(&self, region: &Region, out: &mut Vec<Region>) {
        let bytes = self.bytes(region);
        let axis = match outermost_axis(region) {
            Some(axis) if bytes > self.memory_limit => axis,
            _ => {
                out.push(region.clone());
                return;
            }
        };
        let pieces = bytes.div_ceil(self.memory_limit);
        for piece in split_along(region, axis, pieces) {
            self.split_to_budget(&piece, out);
        }
    }
}

impl SplitPolicy for StreamingSplitter {
    fn split(&self, region: &Region) -> Vec<Region> {
        if region.is_empty() {
            return Vec::new();
        }
        if let Some(pieces) = self.pieces {
            return RegionSplitter::new(pieces).split(region);
        }
        let mut out = Vec::new();
        self.split_to_budget(region, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(origin: &[i64], size: &[usize]) -> Region {
        Region::new(origin.to_vec(), size.to_vec()).unwrap()
    }

    fn assert_exact_cover(whole: &Region, pieces: &[Region]) {
        let total: usize = pieces.iter().map(Region::num_samples).sum();
        assert_eq!(total, whole.num_samples());
        for (i, a) in pieces.iter().enumerate() {
            assert!(whole.contains_region(a));
            for b in &pieces[i + 1..] {
                assert!(a.intersection(b).is_empty());
            }
        }
    }

    #[test]
    fn test_outermost_axis_skips_unit_axes() {
        assert_eq!(outermost_axis(&region(&[0, 0, 0], &[4, 5, 1])), Some(1));
        assert_eq!(outermost_axis(&region(&[0, 0], &[1, 1])), None);
    }

    #[test]
    fn test_split_along_ceil_chunks() {
        let pieces = split_along(&region(&[0, 3], &[4, 10]), 1, 4);
        let sizes: Vec<usize> = pieces.iter().map(|p| p.size()[1]).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(pieces[1].origin(), &[0, 6]);
    }

    #[test]
    fn test_fits_in_one_piece() {
        let whole = region(&[0, 0], &[16, 16]);
        let pieces = StreamingSplitter::new().split(&whole);
        assert_eq!(pieces, vec![whole]);
    }

    #[test]
    fn test_budget_split() {
        let whole = region(&[0, 0], &[10, 7]);
        let splitter = StreamingSplitter::new()
            .with_memory_limit(25)
            .with_bytes_per_sample(1);
        let pieces = splitter.split(&whole);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.num_samples() <= 25));
        assert_exact_cover(&whole, &pieces);
    }

    #[test]
    fn test_budget_split_recurses_into_inner_axis() {
        let whole = region(&[0, 0], &[100, 2]);
        let splitter = StreamingSplitter::new()
            .with_memory_limit(30)
            .with_bytes_per_sample(1);
        let pieces = splitter.split(&whole);
        assert!(pieces.iter().all(|p| p.num_samples() <= 30));
        assert_exact_cover(&whole, &pieces);
    }

    #[test]
    fn test_fixed_pieces() {
        let whole = region(&[0], &[10]);
        let pieces = StreamingSplitter::new().with_pieces(3).split(&whole);
        assert_eq!(pieces.len(), 3);
        assert_exact_cover(&whole, &pieces);
    }
}
