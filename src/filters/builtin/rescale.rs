//! Intensity rescaling.

use crate::core::context::{ExecutionContext, NodeContext};
use crate::core::error::ExecutionResult;
use crate::core::node::{Category, NodeMetadata, ProcessObject};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::region::Region;
use crate::core::types::{PortType, Value};
use crate::filters::registry::FilterRegistry;
use rayon::prelude::*;

/// Register intensity nodes.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|| Box::new(RescaleIntensity));
}

/// Linearly maps the input's range onto `[output_minimum, output_maximum]`.
///
/// The range is a property of the whole image, so any request on the output
/// is enlarged to the largest possible region before it propagates.
#[derive(Debug, Clone)]
pub struct RescaleIntensity;

impl ProcessObject for RescaleIntensity {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("rescale_intensity", "Rescale Intensity")
            .description("Stretch the intensity range to fixed bounds")
            .category(Category::Intensity)
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .parameter(ParameterDefinition::new("output_minimum", PortType::Float, Value::Float(0.0)))
            .parameter(ParameterDefinition::new("output_maximum", PortType::Float, Value::Float(1.0)))
            .build()
    }

    fn enlarge_output_requested_region(
        &self,
        _requested: &Region,
        largest: &Region,
        _ctx: &NodeContext<'_>,
    ) -> Region {
        largest.clone()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let low = ctx.node().get_float("output_minimum")? as f32;
        let high = ctx.node().get_float("output_maximum")? as f32;

        let (input, output) = ctx.input_and_output()?;
        let region = output.buffered_region().clone();
        output.copy_from(input, &region, region.origin())?;

        let (min, max) = output
            .as_slice()
            .par_iter()
            .fold(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), &v| (lo.min(v), hi.max(v)),
            )
            .reduce(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(a, b), (c, d)| (a.min(c), b.max(d)),
            );

        if max > min {
            let factor = (high - low) / (max - min);
            output
                .as_mut_slice()
                .par_iter_mut()
                .for_each(|v| *v = low + (*v - min) * factor);
        } else {
            output.fill(low);
        }
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
    use crate::filters::builtin::PatternSource;
    use crate::graph::PipelineGraph;

    #[test]
    fn test_rescale_whole_domain_even_for_small_request() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", vec![5i64]).unwrap();
        let rescale = graph.add_node(Box::new(RescaleIntensity));
        graph.connect(source, "output", rescale, "input").unwrap();
        graph
            .set_requested_region(rescale, "output", Region::new(vec![1], vec![1]).unwrap())
            .unwrap();

        let engine = ExecutionEngine::new();
        let plan = engine.propagate_requested_region(&mut graph, rescale).unwrap();
        assert_eq!(plan.output_request(rescale, 0), Some(&Region::from_size(vec![5])));
        assert_eq!(plan.output_request(source, 0), Some(&Region::from_size(vec![5])));

        engine.update(&mut graph, rescale).unwrap();
        let output = graph.output(rescale, "output").unwrap();
        assert!(output.buffered_region().contains_region(output.requested_region()));
        assert_eq!(output.as_slice(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_flat_input_maps_to_minimum() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", vec![3i64]).unwrap();
        graph.set_parameter(source, "pattern", "constant").unwrap();
        let rescale = graph.add_node(Box::new(RescaleIntensity));
        graph.set_parameter(rescale, "output_minimum", -1.0).unwrap();
        graph.connect(source, "output", rescale, "input").unwrap();

        ExecutionEngine::new().update(&mut graph, rescale).unwrap();
        assert_eq!(graph.output(rescale, "output").unwrap().as_slice(), &[-1.0; 3]);
    }
}
