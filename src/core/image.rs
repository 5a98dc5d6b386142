//! The concrete pipeline data object.
//!
//! An [`Image`] is a dense `f32` buffer over its *buffered* region together
//! with the *largest possible* and *requested* regions negotiated by the
//! pipeline. After a successful update the engine guarantees
//! `requested ⊆ buffered ⊆ largest possible`.
//!
//! Samples are stored with axis 0 varying fastest.

use crate::core::clock::{Clock, TimeStamp};
use crate::core::error::{RegionError, RegionResult};
use crate::core::region::Region;
use crate::core::splitter::{outermost_axis, split_along};

/// Dense N-dimensional `f32` image.
#[derive(Debug, Clone)]
pub struct Image {
    largest_possible_region: Region,
    buffered_region: Region,
    requested_region: Region,
    strides: Vec<usize>,
    buffer: Vec<f32>,
    modified_time: TimeStamp,
    release_data_flag: bool,
    data_released: bool,
    clock: Clock,
}

fn strides_for(region: &Region) -> Vec<usize> {
    let mut strides = Vec::with_capacity(region.dimension());
    let mut stride = 1;
    for &extent in region.size() {
        strides.push(stride);
        stride *= extent;
    }
    strides
}

impl Default for Image {
    fn default() -> Self {
        Self::new(Clock::global())
    }
}

impl Image {
    /// An image with no information and no buffer, stamped on `clock`.
    pub fn new(clock: Clock) -> Self {
        let modified_time = clock.tick();
        Self {
            largest_possible_region: Region::default(),
            buffered_region: Region::default(),
            requested_region: Region::default(),
            strides: Vec::new(),
            buffer: Vec::new(),
            modified_time,
            release_data_flag: false,
            data_released: false,
            clock,
        }
    }

    /// Wrap existing samples. All three regions are set to `region`.
    pub fn from_buffer(region: Region, data: Vec<f32>) -> RegionResult<Self> {
        if region.dimension() == 0 {
            return Err(RegionError::Invalid {
                reason: "image region must have at least one axis".to_string(),
            });
        }
        if data.len() != region.num_samples() {
            return Err(RegionError::Invalid {
                reason: format!(
                    "buffer holds {} samples but {} covers {}",
                    data.len(),
                    region,
                    region.num_samples()
                ),
            });
        }
        let mut image = Self::new(Clock::global());
        image.strides = strides_for(&region);
        image.largest_possible_region = region.clone();
        image.requested_region = region.clone();
        image.buffered_region = region;
        image.buffer = data;
        Ok(image)
    }

    /// An image of `region` with every sample set to `value`.
    pub fn filled(region: Region, value: f32) -> RegionResult<Self> {
        let n = region.num_samples();
        Self::from_buffer(region, vec![value; n])
    }

    /// An image of `region` whose samples are computed from their index.
    pub fn from_fn(region: Region, f: impl Fn(&[i64]) -> f32) -> RegionResult<Self> {
        let data = region.indices().map(|index| f(&index)).collect();
        Self::from_buffer(region, data)
    }

    // ========================================================================
    // Regions and timestamps
    // ========================================================================

    pub fn dimension(&self) -> usize {
        self.largest_possible_region.dimension()
    }

    pub fn largest_possible_region(&self) -> &Region {
        &self.largest_possible_region
    }

    pub fn buffered_region(&self) -> &Region {
        &self.buffered_region
    }

    pub fn requested_region(&self) -> &Region {
        &self.requested_region
    }

    pub fn modified_time(&self) -> TimeStamp {
        self.modified_time
    }

    /// Stamp the image as changed.
    pub fn modified(&mut self) {
        self.modified_time = self.clock.tick();
    }

    /// Set the domain this image could ever supply. Changes advance the
    /// modified time.
    pub fn set_largest_possible_region(&mut self, region: Region) {
        if region != self.largest_possible_region {
            self.largest_possible_region = region;
            self.modified();
        }
    }

    /// Record what a consumer wants. Does not advance the modified time.
    pub fn set_requested_region(&mut self, region: Region) {
        self.requested_region = region;
    }

    /// Whether the buffer already holds everything requested.
    pub fn buffered_contains_requested(&self) -> bool {
        !self.data_released && self.buffered_region.contains_region(&self.requested_region)
    }

    /// Make the buffer cover exactly `region`.
    ///
    /// The buffer is reallocated (zero-filled) and the modified time advanced
    /// whenever the buffered region changes or the data had been released.
    pub fn allocate(&mut self, region: Region) {
        if region == self.buffered_region && !self.data_released {
            return;
        }
        self.strides = strides_for(&region);
        self.buffer = vec![0.0; region.num_samples()];
        self.buffered_region = region;
        self.data_released = false;
        self.modified();
    }

    // ========================================================================
    // Release-data bookkeeping
    // ========================================================================

    pub fn release_data_flag(&self) -> bool {
        self.release_data_flag
    }

    pub fn set_release_data_flag(&mut self, flag: bool) {
        self.release_data_flag = flag;
    }

    pub fn is_data_released(&self) -> bool {
        self.data_released
    }

    /// Drop the buffer. The next update that needs this image recomputes it.
    pub fn release_data(&mut self) {
        self.buffer = Vec::new();
        self.buffered_region = Region::empty(self.largest_possible_region.dimension());
        self.strides = strides_for(&self.buffered_region);
        self.data_released = true;
    }

    // ========================================================================
    // Sample access
    // ========================================================================

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.buffer
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.buffer
    }

    /// Bytes held by the buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len() * std::mem::size_of::<f32>()
    }

    /// Linear buffer offset of `index`, or `None` outside the buffered region.
    pub fn offset_of(&self, index: &[i64]) -> Option<usize> {
        if !self.buffered_region.contains_index(index) {
            return None;
        }
        Some(
            index
                .iter()
                .zip(self.buffered_region.origin())
                .zip(&self.strides)
                .map(|((i, o), s)| (i - o) as usize * s)
                .sum(),
        )
    }

    pub fn get(&self, index: &[i64]) -> Option<f32> {
        self.offset_of(index).map(|offset| self.buffer[offset])
    }

    pub fn get_mut(&mut self, index: &[i64]) -> Option<&mut f32> {
        self.offset_of(index).map(move |offset| &mut self.buffer[offset])
    }

    pub fn fill(&mut self, value: f32) {
        self.buffer.fill(value);
    }

    /// Copy `source_region` of `source` into this image, placing its first
    /// index at `destination_origin`.
    pub fn copy_from(
        &mut self,
        source: &Image,
        source_region: &Region,
        destination_origin: &[i64],
    ) -> RegionResult<()> {
        if !source.buffered_region.contains_region(source_region) {
            return Err(RegionError::OutsideBuffer {
                region: source_region.clone(),
                buffered: source.buffered_region.clone(),
            });
        }
        let offset: Vec<i64> = destination_origin
            .iter()
            .zip(source_region.origin())
            .map(|(d, s)| d - s)
            .collect();
        let destination = source_region.translated(&offset);
        if !self.buffered_region.contains_region(&destination) {
            return Err(RegionError::OutsideBuffer {
                region: destination,
                buffered: self.buffered_region.clone(),
            });
        }
        if source_region.is_empty() {
            return Ok(());
        }

        // Copy one contiguous run along axis 0 at a time.
        let run = source_region.size()[0];
        let mut rows_size = source_region.size().to_vec();
        rows_size[0] = 1;
        let rows = Region::new(source_region.origin().to_vec(), rows_size)?;
        for start in rows.indices() {
            let target: Vec<i64> = start.iter().zip(&offset).map(|(i, d)| i + d).collect();
            if let (Some(from), Some(to)) = (source.offset_of(&start), self.offset_of(&target)) {
                self.buffer[to..to + run].copy_from_slice(&source.buffer[from..from + run]);
            }
        }
        Ok(())
    }

    /// A standalone copy of `region`.
    pub fn extract(&self, region: &Region) -> RegionResult<Image> {
        let mut out = Image::filled(region.clone(), 0.0)?;
        out.copy_from(self, region, region.origin())?;
        Ok(out)
    }

    /// Split the buffer into up to `pieces` disjoint, contiguous slabs along
    /// the outermost axis with more than one sample.
    pub fn slabs_mut(&mut self, pieces: usize) -> Vec<ImageSlab<'_>> {
        let regions = match outermost_axis(&self.buffered_region) {
            Some(axis) => split_along(&self.buffered_region, axis, pieces.max(1)),
            None if !self.buffered_region.is_empty() => vec![self.buffered_region.clone()],
            None => Vec::new(),
        };

        let strides = self.strides.clone();
        let mut slabs = Vec::with_capacity(regions.len());
        let mut rest: &mut [f32] = self.buffer.as_mut_slice();
        for region in regions {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(region.num_samples());
            slabs.push(ImageSlab {
                region,
                strides: strides.clone(),
                data: head,
            });
            rest = tail;
        }
        slabs
    }
}

/// A contiguous, exclusively borrowed part of an image buffer.
///
/// Slabs span the full extent of every axis except the outermost split axis,
/// so they share the parent image's strides.
#[derive(Debug)]
pub struct ImageSlab<'a> {
    region: Region,
    strides: Vec<usize>,
    data: &'a mut [f32],
}

impl<'a> ImageSlab<'a> {
    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn offset_of(&self, index: &[i64]) -> Option<usize> {
        if !self.region.contains_index(index) {
            return None;
        }
        Some(
            index
                .iter()
                .zip(self.region.origin())
                .zip(&self.strides)
                .map(|((i, o), s)| (i - o) as usize * s)
                .sum(),
        )
    }

    pub fn set(&mut self, index: &[i64], value: f32) -> bool {
        match self.offset_of(index) {
            Some(offset) => {
                self.data[offset] = value;
                true
            }
            None => false,
        }
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut *self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(origin: &[i64], size: &[usize]) -> Region {
        Region::new(origin.to_vec(), size.to_vec()).unwrap()
    }

    #[test]
    fn test_from_buffer_checks_length() {
        assert!(Image::from_buffer(region(&[0, 0], &[2, 2]), vec![0.0; 3]).is_err());
        let image = Image::from_buffer(region(&[0, 0], &[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(image.get(&[1, 0]), Some(2.0));
        assert_eq!(image.get(&[0, 1]), Some(3.0));
        assert_eq!(image.get(&[2, 0]), None);
    }

    #[test]
    fn test_region_changes_advance_modified_time() {
        let mut image = Image::new(Clock::new());
        let t0 = image.modified_time();

        image.set_largest_possible_region(region(&[0], &[10]));
        let t1 = image.modified_time();
        assert!(t1 > t0);

        image.set_largest_possible_region(region(&[0], &[10]));
        assert_eq!(image.modified_time(), t1);

        image.set_requested_region(region(&[2], &[3]));
        assert_eq!(image.modified_time(), t1);

        image.allocate(region(&[2], &[3]));
        assert!(image.modified_time() > t1);
        assert!(image.buffered_contains_requested());
    }

    #[test]
    fn test_release_data() {
        let mut image = Image::filled(region(&[0], &[4]), 1.0).unwrap();
        image.release_data();
        assert!(image.is_data_released());
        assert!(image.as_slice().is_empty());
        assert!(!image.buffered_contains_requested());

        image.allocate(region(&[0], &[4]));
        assert!(!image.is_data_released());
        assert_eq!(image.as_slice().len(), 4);
    }

    #[test]
    fn test_copy_from_translates() {
        let source = Image::from_fn(region(&[0, 0], &[4, 3]), |i| (i[0] + 10 * i[1]) as f32).unwrap();
        let mut target = Image::filled(region(&[0, 0], &[2, 2]), 0.0).unwrap();
        target
            .copy_from(&source, &region(&[1, 1], &[2, 2]), &[0, 0])
            .unwrap();
        assert_eq!(target.as_slice(), &[11.0, 12.0, 21.0, 22.0]);

        assert!(target
            .copy_from(&source, &region(&[3, 2], &[2, 2]), &[0, 0])
            .is_err());
    }

    #[test]
    fn test_slabs_are_disjoint_and_cover() {
        let mut image = Image::filled(region(&[0, 0], &[3, 7]), 0.0).unwrap();
        {
            let mut slabs = image.slabs_mut(3);
            assert_eq!(slabs.len(), 3);
            for (n, slab) in slabs.iter_mut().enumerate() {
                let samples: Vec<Vec<i64>> = slab.region().indices().collect();
                for index in samples {
                    assert!(slab.set(&index, n as f32 + 1.0));
                }
            }
        }
        assert!(image.as_slice().iter().all(|&v| v > 0.0));
        assert_eq!(image.get(&[0, 0]), Some(1.0));
        assert_eq!(image.get(&[2, 6]), Some(3.0));
    }
}
