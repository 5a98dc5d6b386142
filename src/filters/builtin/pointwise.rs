//! Pointwise nodes: each output sample depends on the input sample at the
//! same index only, so the default request mapping (identity) applies.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionResult;
use crate::core::node::{Category, NodeMetadata, ProcessObject};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{PortType, Value};
use crate::filters::registry::FilterRegistry;
use rayon::prelude::*;

/// Register pointwise nodes.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|| Box::new(PassThrough));
    registry.register(|| Box::new(ShiftScale));
}

/// Copies its input unchanged.
#[derive(Debug, Clone)]
pub struct PassThrough;

impl ProcessObject for PassThrough {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("pass_through", "Pass Through")
            .description("Copy the input unchanged")
            .category(Category::Utility)
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .build()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let (input, output) = ctx.input_and_output()?;
        let region = output.buffered_region().clone();
        output.copy_from(input, &region, region.origin())?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessObject> {
        Box::new(self.clone())
    }
}

/// `output = (input + shift) * scale`.
#[derive(Debug, Clone)]
pub struct ShiftScale;

impl ProcessObject for ShiftScale {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("shift_scale", "Shift Scale")
            .description("Add a shift, then multiply by a scale")
            .category(Category::Pointwise)
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .parameter(ParameterDefinition::new("shift", PortType::Float, Value::Float(0.0)))
            .parameter(ParameterDefinition::new("scale", PortType::Float, Value::Float(1.0)))
            .build()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let shift = ctx.node().get_float("shift")? as f32;
        let scale = ctx.node().get_float("scale")? as f32;

        let (input, output) = ctx.input_and_output()?;
        let region = output.buffered_region().clone();
        output.copy_from(input, &region, region.origin())?;
        output
            .as_mut_slice()
            .par_iter_mut()
            .for_each(|v| *v = (*v + shift) * scale);
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
    use crate::core::region::Region;
    use crate::execution::ExecutionEngine;
    use crate::filters::builtin::PatternSource;
    use crate::graph::PipelineGraph;

    #[test]
    fn test_shift_scale() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", vec![4i64]).unwrap();
        let filter = graph.add_node(Box::new(ShiftScale));
        graph.set_parameter(filter, "shift", 1.0).unwrap();
        graph.set_parameter(filter, "scale", 2.0).unwrap();
        graph.connect(source, "output", filter, "input").unwrap();

        ExecutionEngine::new().update(&mut graph, filter).unwrap();
        assert_eq!(graph.output(filter, "output").unwrap().as_slice(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_pass_through_copies_requested_part() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", vec![10i64]).unwrap();
        let copy = graph.add_node(Box::new(PassThrough));
        graph.connect(source, "output", copy, "input").unwrap();
        graph
            .set_requested_region(copy, "output", Region::new(vec![3], vec![2]).unwrap())
            .unwrap();

        ExecutionEngine::new().update(&mut graph, copy).unwrap();
        assert_eq!(graph.output(copy, "output").unwrap().as_slice(), &[3.0, 4.0]);
        assert_eq!(
            graph.output(source, "output").unwrap().buffered_region(),
            &Region::new(vec![3], vec![2]).unwrap()
        );
    }
}
