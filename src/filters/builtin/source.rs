//! Source nodes: synthetic patterns and in-memory buffers.

use crate::core::context::{ExecutionContext, NodeContext};
use crate::core::error::ExecutionResult;
use crate::core::image::Image;
use crate::core::node::{Category, NodeMetadata, ProcessObject};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::{Region, MAX_DIMENSION};
use crate::core::types::{PortType, Value};
use crate::filters::registry::FilterRegistry;
use std::sync::Arc;

/// Register source nodes.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|| Box::new(PatternSource));
}

/// Synthetic N-D image whose domain comes from its `size` parameter.
///
/// Patterns:
/// - `ramp`: `offset + scale * i`, where `i` is the sample's linear index in
///   the whole domain (axis 0 fastest)
/// - `constant`: `offset` everywhere
/// - `checker`: `offset + scale` where the index sum is odd, `offset` elsewhere
#[derive(Debug, Clone)]
pub struct PatternSource;

impl PatternSource {
    fn value(pattern: &str, index: &[i64], strides: &[i64], offset: f64, scale: f64) -> f32 {
        let v = match pattern {
            "constant" => offset,
            "checker" => {
                let odd = index.iter().sum::<i64>().rem_euclid(2);
                offset + scale * odd as f64
            }
            _ => {
                let linear: i64 = index.iter().zip(strides).map(|(i, s)| i * s).sum();
                offset + scale * linear as f64
            }
        };
        v as f32
    }
}

impl ProcessObject for PatternSource {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("pattern_source", "Pattern Source")
            .description("Synthetic image of any dimension")
            .category(Category::Source)
            .output(PortDefinition::output("output", PortType::Image).with_description("Generated image"))
            .parameter(
                ParameterDefinition::new(
                    "size",
                    PortType::Array(Box::new(PortType::Integer)),
                    Value::from(vec![64i64, 64]),
                )
                .with_description("Samples along each axis")
                .with_constraint(Constraint::Positive)
                .with_constraint(Constraint::MinLength(1))
                .with_constraint(Constraint::MaxLength(MAX_DIMENSION)),
            )
            .parameter(
                ParameterDefinition::new("pattern", PortType::String, Value::from("ramp"))
                    .with_constraint(Constraint::OneOf(vec![
                        Value::from("ramp"),
                        Value::from("constant"),
                        Value::from("checker"),
                    ])),
            )
            .parameter(ParameterDefinition::new("offset", PortType::Float, Value::Float(0.0)))
            .parameter(ParameterDefinition::new("scale", PortType::Float, Value::Float(1.0)))
            .tags(["synthetic", "test"])
            .build()
    }

    fn output_information(
        &self,
        _inputs: &[Region],
        ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Vec<Region>> {
        let size = ctx.radius("size", ctx.get_integer_list("size")?.len())?;
        Ok(vec![Region::new(vec![0; size.len()], size)?])
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let pattern = ctx.node().get_string("pattern")?;
        let offset = ctx.node().get_float("offset")?;
        let scale = ctx.node().get_float("scale")?;

        let output = ctx.output_mut(0)?;
        let largest = output.largest_possible_region().clone();
        let mut strides = Vec::with_capacity(largest.dimension());
        let mut stride = 1i64;
        for &extent in largest.size() {
            strides.push(stride);
            stride *= extent as i64;
        }

        let region = output.buffered_region().clone();
        for (index, sample) in region.indices().zip(output.as_mut_slice()) {
            *sample = Self::value(pattern, &index, &strides, offset, scale);
        }
        ctx.report_progress(1.0);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessObject> {
        Box::new(self.clone())
    }
}

/// Serves an image held in memory. The domain is the image's buffered region.
///
/// Replacing the buffer means replacing the node, so the graph's modification
/// tracking sees the change.
#[derive(Debug, Clone)]
pub struct BufferSource {
    image: Arc<Image>,
}

impl BufferSource {
    pub fn new(image: Image) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl ProcessObject for BufferSource {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("buffer_source", "Buffer Source")
            .description("Image supplied by the caller")
            .category(Category::Source)
            .output(PortDefinition::output("output", PortType::Image))
            .build()
    }

    fn output_information(
        &self,
        _inputs: &[Region],
        _ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Vec<Region>> {
        Ok(vec![self.image.buffered_region().clone()])
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let output = ctx.output_mut(0)?;
        let region = output.buffered_region().clone();
        output.copy_from(&self.image, &region, region.origin())?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessObject> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::Clock;
    use crate::execution::ExecutionEngine;
    use crate::graph::PipelineGraph;

    #[test]
    fn test_ramp_follows_linear_index() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", vec![4i64, 3]).unwrap();
        graph.set_parameter(source, "offset", 1.0).unwrap();
        graph
            .set_requested_region(source, "output", Region::new(vec![1, 1], vec![2, 2]).unwrap())
            .unwrap();

        ExecutionEngine::new().update(&mut graph, source).unwrap();
        let output = graph.output(source, "output").unwrap();
        assert_eq!(output.largest_possible_region(), &Region::from_size(vec![4, 3]));
        assert_eq!(output.buffered_region(), &Region::new(vec![1, 1], vec![2, 2]).unwrap());
        // Linear indices 5, 6, 9, 10.
        assert_eq!(output.as_slice(), &[6.0, 7.0, 10.0, 11.0]);
    }

    #[test]
    fn test_checker_pattern() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", vec![3i64]).unwrap();
        graph.set_parameter(source, "pattern", "checker").unwrap();
        assert!(graph.set_parameter(source, "pattern", "stripes").is_err());

        ExecutionEngine::new().update(&mut graph, source).unwrap();
        assert_eq!(graph.output(source, "output").unwrap().as_slice(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_buffer_source_serves_its_domain() {
        let region = Region::new(vec![-2], vec![4]).unwrap();
        let image = Image::from_fn(region.clone(), |i| i[0] as f32).unwrap();
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(BufferSource::new(image)));
        graph
            .set_requested_region(source, "output", Region::new(vec![-1], vec![2]).unwrap())
            .unwrap();

        ExecutionEngine::new().update(&mut graph, source).unwrap();
        let output = graph.output(source, "output").unwrap();
        assert_eq!(output.largest_possible_region(), &region);
        assert_eq!(output.as_slice(), &[-1.0, 0.0]);
    }
}
