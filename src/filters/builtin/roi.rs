//! Region of interest extraction.

use crate::core::context::{ExecutionContext, NodeContext};
use crate::core::error::{ExecutionError, ExecutionResult};
use crate::core::node::{Category, NodeMetadata, ProcessObject};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::Region;
use crate::core::types::{PortType, Value};
use crate::filters::registry::FilterRegistry;

/// Register geometry nodes.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|| Box::new(RegionOfInterest));
}

/// Extracts a box of the input. The output is indexed from zero, so output
/// index `i` holds input index `origin + i`.
///
/// A `size` entry of 0 extends the box to the end of the input along that
/// axis.
#[derive(Debug, Clone)]
pub struct RegionOfInterest;

impl RegionOfInterest {
    /// The extracted box in input index space.
    fn roi(ctx: &NodeContext<'_>, input_largest: &Region) -> ExecutionResult<Region> {
        let dimension = input_largest.dimension();
        let origin = ctx.per_axis("origin", dimension)?;
        let requested = ctx.per_axis("size", dimension)?;

        let mut size = Vec::with_capacity(dimension);
        for (axis, (&extent, &start)) in requested.iter().zip(&origin).enumerate() {
            let extent = match extent {
                0 => (input_largest.upper(axis) - start).max(0),
                e if e < 0 => return Err(ctx.invalid("size", format!("{e} is negative"))),
                e => e,
            };
            size.push(extent as usize);
        }

        let roi = Region::new(origin, size)?;
        if roi.is_empty() || !input_largest.contains_region(&roi) {
            return Err(ctx.invalid(
                "origin",
                format!("box {roi} does not lie inside the input {input_largest}"),
            ));
        }
        Ok(roi)
    }
}

impl ProcessObject for RegionOfInterest {
    fn metadata(&self) -> NodeMetadata {
        let integers = || PortType::Array(Box::new(PortType::Integer));
        NodeMetadata::builder("region_of_interest", "Region of Interest")
            .description("Extract a box of the input, re-indexed from zero")
            .category(Category::Geometry)
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .parameter(
                ParameterDefinition::new("origin", integers(), Value::from(vec![0i64]))
                    .with_description("First input index of the box")
                    .with_constraint(Constraint::MinLength(1)),
            )
            .parameter(
                ParameterDefinition::new("size", integers(), Value::from(vec![0i64]))
                    .with_description("Box extent per axis; 0 runs to the end")
                    .with_constraint(Constraint::NonNegative)
                    .with_constraint(Constraint::MinLength(1)),
            )
            .tags(["crop"])
            .build()
    }

    fn output_information(
        &self,
        inputs: &[Region],
        ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Vec<Region>> {
        let input = inputs.first().ok_or_else(|| ExecutionError::MissingInformation {
            node_id: ctx.node_id,
            reason: "no input domain".to_string(),
        })?;
        let roi = Self::roi(ctx, input)?;
        Ok(vec![Region::from_size(roi.size().to_vec())])
    }

    fn input_requested_region(
        &self,
        _input: usize,
        output_requested: Option<&Region>,
        input_largest: &Region,
        ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Region> {
        let roi = Self::roi(ctx, input_largest)?;
        Ok(match output_requested {
            Some(region) => region.translated(roi.origin()),
            None => roi,
        })
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let input = ctx.input(0)?;
        let roi = Self::roi(ctx.node(), input.largest_possible_region())?;
        let output = ctx.output_mut(0)?;
        let region = output.buffered_region().clone();
        output.copy_from(input, &region.translated(roi.origin()), region.origin())?;
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
    use crate::core::error::{NdflowError, NodeId};
    use crate::execution::ExecutionEngine;
    use crate::filters::builtin::PatternSource;
    use crate::graph::PipelineGraph;

    fn roi_pipeline() -> (PipelineGraph, NodeId, NodeId) {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", vec![10i64, 8]).unwrap();
        let roi = graph.add_node(Box::new(RegionOfInterest));
        graph.set_parameter(roi, "origin", vec![2i64, 3]).unwrap();
        graph.set_parameter(roi, "size", vec![4i64, 0]).unwrap();
        graph.connect(source, "output", roi, "input").unwrap();
        (graph, source, roi)
    }

    #[test]
    fn test_output_is_reindexed() {
        let (mut graph, _, roi) = roi_pipeline();
        ExecutionEngine::new().update(&mut graph, roi).unwrap();

        let output = graph.output(roi, "output").unwrap();
        assert_eq!(output.largest_possible_region(), &Region::from_size(vec![4, 5]));
        assert_eq!(output.get(&[0, 0]), Some(32.0));
        assert_eq!(output.get(&[1, 0]), Some(33.0));
        assert_eq!(output.get(&[0, 1]), Some(42.0));
    }

    #[test]
    fn test_input_request_is_translated() {
        let (mut graph, source, roi) = roi_pipeline();
        graph
            .set_requested_region(roi, "output", Region::new(vec![1, 1], vec![2, 2]).unwrap())
            .unwrap();

        let plan = ExecutionEngine::new().propagate_requested_region(&mut graph, roi).unwrap();
        let expected = Region::new(vec![3, 4], vec![2, 2]).unwrap();
        assert_eq!(plan.input_request(roi, 0), Some(&expected));
        assert_eq!(plan.output_request(source, 0), Some(&expected));
    }

    #[test]
    fn test_box_outside_input() {
        let (mut graph, _, roi) = roi_pipeline();
        graph.set_parameter(roi, "origin", vec![8i64, 3]).unwrap();
        graph.set_parameter(roi, "size", vec![4i64, 1]).unwrap();
        let error = ExecutionEngine::new().update(&mut graph, roi).unwrap_err();
        assert!(matches!(
            error,
            NdflowError::Execution(ExecutionError::InvalidParameter { .. })
        ));
    }
}
