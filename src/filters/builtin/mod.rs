//! Built-in process objects.
//!
//! A small set of reference nodes covering each kind of request mapping:
//! sources, pointwise, windowed, re-indexing and whole-image nodes.

mod io;
mod pointwise;
mod rescale;
mod roi;
mod source;
mod windowed;

use crate::filters::registry::FilterRegistry;

/// Register all built-in nodes.
pub fn register_all(registry: &mut FilterRegistry) {
    source::register(registry);
    io::register(registry);
    pointwise::register(registry);
    windowed::register(registry);
    roi::register(registry);
    rescale::register(registry);
}

pub use io::{read_image, read_image_region, write_image, ImageFileReader, ImageFileWriter};
pub use pointwise::{PassThrough, ShiftScale};
pub use rescale::RescaleIntensity;
pub use roi::RegionOfInterest;
pub use source::{BufferSource, PatternSource};
pub use windowed::{DiscreteGaussian, MeanFilter};
