//! Image file I/O: a reader source and a writer sink for 2-D grayscale files.
//!
//! Samples are intensities in `[0, 1]`, stored as 16-bit gray. Axis 0 runs
//! along image rows (x), axis 1 down the columns (y).

use crate::core::context::{ExecutionContext, NodeContext};
use crate::core::error::{ExecutionError, ExecutionResult, NdflowResult, NodeId, RegionError};
use crate::core::image::Image;
use crate::core::node::{Category, NodeMetadata, ProcessObject};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::Region;
use crate::core::types::{PortType, Value};
use crate::filters::registry::FilterRegistry;
use image::{ImageBuffer, Luma};
use log::debug;
use std::path::Path;

/// Register I/O nodes.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|| Box::new(ImageFileReader));
    registry.register(|| Box::new(ImageFileWriter));
}

/// Domain of the image stored at `path`, read from the file header only.
pub fn read_image_region(path: impl AsRef<Path>) -> NdflowResult<Region> {
    let (width, height) = image::image_dimensions(path)?;
    Ok(Region::from_size(vec![width as usize, height as usize]))
}

/// Decode a file into a 2-D image over `[0, width) x [0, height)`.
pub fn read_image(path: impl AsRef<Path>) -> NdflowResult<Image> {
    let path = path.as_ref();
    let gray = image::open(path)?.to_luma16();
    let region = Region::from_size(vec![gray.width() as usize, gray.height() as usize]);
    let data = gray
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / u16::MAX as f32)
        .collect();
    debug!("Read {} from {}", region, path.display());
    Ok(Image::from_buffer(region, data)?)
}

/// Encode the buffered region of a 2-D image. The format follows the
/// extension.
pub fn write_image(path: impl AsRef<Path>, image: &Image) -> NdflowResult<()> {
    let path = path.as_ref();
    let region = image.buffered_region();
    if region.dimension() != 2 {
        return Err(RegionError::DimensionMismatch {
            expected: 2,
            got: region.dimension(),
        }
        .into());
    }
    let data: Vec<u16> = image
        .as_slice()
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16)
        .collect();
    let (width, height) = (region.size()[0] as u32, region.size()[1] as u32);
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| RegionError::Invalid {
            reason: format!("{region} does not fit a {width}x{height} raster"),
        })?;
    buffer.save(path)?;
    debug!("Wrote {} to {}", region, path.display());
    Ok(())
}

fn io_error(node_id: NodeId, error: impl ToString) -> ExecutionError {
    ExecutionError::Io {
        node_id,
        error: error.to_string(),
    }
}

fn path_parameter() -> ParameterDefinition {
    ParameterDefinition::new("path", PortType::String, Value::String(String::new()))
        .with_description("Path to a PNG or TIFF file")
        .with_constraint(Constraint::NotEmpty)
}

/// Reads a grayscale image file.
///
/// The header alone answers the information phase. The file is decoded
/// whole, so the output always buffers the whole domain.
#[derive(Debug, Clone)]
pub struct ImageFileReader;

impl ProcessObject for ImageFileReader {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("image_file_reader", "Image File Reader")
            .description("Read a 2-D grayscale image")
            .category(Category::Source)
            .output(PortDefinition::output("output", PortType::Image))
            .parameter(path_parameter())
            .tags(["io", "png", "tiff"])
            .build()
    }

    fn output_information(
        &self,
        _inputs: &[Region],
        ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Vec<Region>> {
        let path = ctx.get_string("path")?;
        let region = read_image_region(path).map_err(|e| io_error(ctx.node_id, e))?;
        Ok(vec![region])
    }

    fn buffers_largest_possible_region(&self) -> bool {
        true
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let node_id = ctx.node_id();
        let path = ctx.node().get_string("path")?;
        let decoded = read_image(path).map_err(|e| io_error(node_id, e))?;

        let output = ctx.output_mut(0)?;
        let region = output.buffered_region().clone();
        output.copy_from(&decoded, &region, region.origin())?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessObject> {
        Box::new(self.clone())
    }
}

/// Writes its whole input to a grayscale image file.
///
/// The writer has no outputs; updating it writes the file.
#[derive(Debug, Clone)]
pub struct ImageFileWriter;

impl ProcessObject for ImageFileWriter {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("image_file_writer", "Image File Writer")
            .description("Write a 2-D image as 16-bit grayscale")
            .category(Category::Sink)
            .input(PortDefinition::input("input", PortType::Image))
            .parameter(path_parameter())
            .tags(["io", "png", "tiff"])
            .build()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let node_id = ctx.node_id();
        let path = ctx.node().get_string("path")?;
        let input = ctx.input(0)?;
        write_image(path, input).map_err(|e| io_error(node_id, e))?;
        ctx.report_progress(1.0);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessObject> {
        Box::new(self.clone())
    }
}
