//! Windowed nodes.
//!
//! Each output sample reads a fixed-radius window of input, so the input
//! request is the output request padded by the radius. Near the edge of the
//! domain that padded request is cropped; the missing samples come from the
//! node's boundary condition instead. Periodic (and far-reaching mirror)
//! boundaries read back into the domain, so their request also covers the
//! samples they wrap onto.

use crate::core::boundary::BoundaryMode;
use crate::core::context::{ExecutionContext, NodeContext};
use crate::core::error::{ExecutionError, ExecutionResult};
use crate::core::image::Image;
use crate::core::node::{Category, NodeMetadata, ProcessObject};
use crate::core::operator::{apply_kernel, ApplyOutcome, GaussianOperator, NeighborhoodOperator};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::Region;
use crate::core::types::{PortType, Value};
use crate::filters::registry::FilterRegistry;
use log::trace;

/// Register windowed nodes.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|| Box::new(MeanFilter));
    registry.register(|| Box::new(DiscreteGaussian));
}

fn boundary_parameters() -> [ParameterDefinition; 2] {
    let names: Vec<Value> = BoundaryMode::names().iter().map(|&n| Value::from(n)).collect();
    [
        ParameterDefinition::new("boundary", PortType::String, Value::from("nearest"))
            .with_description("How samples outside the buffered input are read")
            .with_constraint(Constraint::OneOf(names)),
        ParameterDefinition::new("constant_value", PortType::Float, Value::Float(0.0))
            .with_description("Fill value for the constant boundary"),
    ]
}

/// Run `operator` from the first input into the first output.
fn convolve(ctx: &mut ExecutionContext<'_>, operator: &NeighborhoodOperator) -> ExecutionResult<()> {
    let boundary = ctx.node().boundary("boundary")?;
    let abort = ctx.abort_handle();
    let node_id = ctx.node_id();

    let (input, output) = ctx.input_and_output()?;
    trace!(
        "Node {}: window {:?} over {} from {}",
        node_id,
        operator.radius(),
        output.buffered_region(),
        input.buffered_region()
    );
    match apply_kernel(input, output, operator, &boundary, abort)? {
        ApplyOutcome::Completed => {
            ctx.report_progress(1.0);
            Ok(())
        }
        ApplyOutcome::Aborted => Err(ExecutionError::Aborted { node_id }),
    }
}

/// Run one 1-D operator per axis, axis 0 first.
///
/// The pass along axis `k` writes an intermediate image that spans the output
/// on axes `0..=k` and the buffered input on the remaining axes, so later
/// passes still see the rim they read. Intermediates keep the input's domain
/// as their largest possible region, which keeps boundary reads identical to
/// reading the input itself.
fn convolve_separable(
    ctx: &mut ExecutionContext<'_>,
    operators: &[NeighborhoodOperator],
) -> ExecutionResult<()> {
    let boundary = ctx.node().boundary("boundary")?;
    let abort = ctx.abort_handle();
    let node_id = ctx.node_id();

    let (input, output) = ctx.input_and_output()?;
    let target = output.buffered_region().clone();
    let mut stage: Option<Image> = None;

    for (axis, operator) in operators.iter().enumerate() {
        let source = stage.as_ref().unwrap_or(input);
        let outcome = if axis + 1 == operators.len() {
            apply_kernel(source, output, operator, &boundary, abort)?
        } else {
            let (mut origin, mut size) = (
                input.buffered_region().origin().to_vec(),
                input.buffered_region().size().to_vec(),
            );
            origin[..=axis].copy_from_slice(&target.origin()[..=axis]);
            size[..=axis].copy_from_slice(&target.size()[..=axis]);
            let mut next = Image::filled(Region::new(origin, size)?, 0.0)?;
            next.set_largest_possible_region(input.largest_possible_region().clone());
            let outcome = apply_kernel(source, &mut next, operator, &boundary, abort)?;
            stage = Some(next);
            outcome
        };
        trace!("Node {}: pass along axis {} done", node_id, axis);
        if matches!(outcome, ApplyOutcome::Aborted) {
            return Err(ExecutionError::Aborted { node_id });
        }
    }
    ctx.report_progress(1.0);
    Ok(())
}

/// Input request for windows of `radius` around the output request, widened
/// where the boundary condition reads back into the domain.
fn windowed_request(
    output_requested: Option<&Region>,
    input_largest: &Region,
    radius: &[usize],
    ctx: &NodeContext<'_>,
) -> ExecutionResult<Region> {
    let Some(region) = output_requested else {
        return Ok(input_largest.clone());
    };
    let boundary = ctx.boundary("boundary")?;
    Ok(boundary.required_region(&region.padded_by(radius), input_largest)?)
}

/// The mean window radius, refused when it reaches past the input domain.
fn mean_radius(ctx: &NodeContext<'_>, input_largest: &Region) -> ExecutionResult<Vec<usize>> {
    let radius = ctx.radius("radius", input_largest.dimension())?;
    let too_wide = radius
        .iter()
        .zip(input_largest.size())
        .position(|(r, extent)| r > extent);
    match too_wide {
        Some(axis) => Err(ctx.invalid(
            "radius",
            format!(
                "radius {} on axis {} exceeds the input extent {}",
                radius[axis],
                axis,
                input_largest.size()[axis]
            ),
        )),
        None => Ok(radius),
    }
}

/// Arithmetic mean over a box window.
#[derive(Debug, Clone)]
pub struct MeanFilter;

impl ProcessObject for MeanFilter {
    fn metadata(&self) -> NodeMetadata {
        let [boundary, constant] = boundary_parameters();
        NodeMetadata::builder("mean", "Mean")
            .description("Average over a box window")
            .category(Category::Neighborhood)
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .parameter(
                ParameterDefinition::new(
                    "radius",
                    PortType::Array(Box::new(PortType::Integer)),
                    Value::from(vec![1i64]),
                )
                .with_description("Half width per axis; one value applies to all axes")
                .with_constraint(Constraint::NonNegative)
                .with_constraint(Constraint::MinLength(1)),
            )
            .parameter(boundary)
            .parameter(constant)
            .tags(["smoothing", "box"])
            .build()
    }

    fn input_requested_region(
        &self,
        _input: usize,
        output_requested: Option<&Region>,
        input_largest: &Region,
        ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Region> {
        let radius = mean_radius(ctx, input_largest)?;
        windowed_request(output_requested, input_largest, &radius, ctx)
    }

    fn accepts_partial_input(&self, _input: usize) -> bool {
        true
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let largest = ctx.input(0)?.largest_possible_region();
        let radius = mean_radius(ctx.node(), largest)?;
        let operator = NeighborhoodOperator::mean(radius)?;
        convolve(ctx, &operator)
    }

    fn clone_box(&self) -> Box<dyn ProcessObject> {
        Box::new(self.clone())
    }
}

/// Separable discrete Gaussian smoothing.
///
/// The kernel follows from `variance`, `maximum_error` and
/// `maximum_kernel_width`; see [`GaussianOperator`]. It is applied as one
/// 1-D pass per axis.
#[derive(Debug, Clone)]
pub struct DiscreteGaussian;

impl DiscreteGaussian {
    fn gaussian(ctx: &NodeContext<'_>) -> ExecutionResult<GaussianOperator> {
        let width = ctx.get_integer("maximum_kernel_width")?;
        let width = usize::try_from(width)
            .map_err(|_| ctx.invalid("maximum_kernel_width", format!("{width} is negative")))?;
        let operator = GaussianOperator::new(ctx.get_float("variance")?)
            .with_maximum_error(ctx.get_float("maximum_error")?)
            .with_maximum_kernel_width(width);
        operator
            .validate()
            .map_err(|e| ctx.invalid("variance", e))?;
        Ok(operator)
    }
}

impl ProcessObject for DiscreteGaussian {
    fn metadata(&self) -> NodeMetadata {
        let defaults = GaussianOperator::default();
        let [boundary, constant] = boundary_parameters();
        NodeMetadata::builder("discrete_gaussian", "Discrete Gaussian")
            .description("Smooth with a sampled Gaussian built from Bessel functions")
            .category(Category::Neighborhood)
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .parameter(
                ParameterDefinition::new("variance", PortType::Float, Value::Float(defaults.variance))
                    .with_constraint(Constraint::NonNegative),
            )
            .parameter(
                ParameterDefinition::new(
                    "maximum_error",
                    PortType::Float,
                    Value::Float(defaults.maximum_error),
                )
                .with_description("Kernel mass allowed to fall outside the window")
                .with_range(1e-6, 0.5),
            )
            .parameter(
                ParameterDefinition::new(
                    "maximum_kernel_width",
                    PortType::Integer,
                    Value::Integer(defaults.maximum_kernel_width as i64),
                )
                .with_constraint(Constraint::Positive),
            )
            .parameter(boundary)
            .parameter(constant)
            .tags(["smoothing", "gaussian"])
            .build()
    }

    fn input_requested_region(
        &self,
        _input: usize,
        output_requested: Option<&Region>,
        input_largest: &Region,
        ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Region> {
        let radius = Self::gaussian(ctx)?.radius();
        let radius = vec![radius; input_largest.dimension()];
        windowed_request(output_requested, input_largest, &radius, ctx)
    }

    fn accepts_partial_input(&self, _input: usize) -> bool {
        true
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let dimension = ctx.input(0)?.dimension();
        let gaussian = Self::gaussian(ctx.node())?;
        let operators = (0..dimension)
            .map(|axis| gaussian.along_axis(dimension, axis))
            .collect::<Result<Vec<_>, _>>()?;
        convolve_separable(ctx, &operators)
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
    use crate::execution::progress::AbortHandle;
    use crate::execution::ExecutionEngine;
    use crate::filters::builtin::PatternSource;
    use crate::graph::PipelineGraph;

    fn smooth(process: Box<dyn ProcessObject>, size: i64) -> (PipelineGraph, NodeId) {
        smooth_sized(process, vec![size])
    }

    fn smooth_sized(process: Box<dyn ProcessObject>, size: Vec<i64>) -> (PipelineGraph, NodeId) {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(source, "size", size).unwrap();
        let filter = graph.add_node(process);
        graph.connect(source, "output", filter, "input").unwrap();
        (graph, filter)
    }

    #[test]
    fn test_mean_of_ramp() {
        let (mut graph, mean) = smooth(Box::new(MeanFilter), 5);
        ExecutionEngine::new().update(&mut graph, mean).unwrap();
        // Nearest boundary repeats 0 on the left and 4 on the right.
        let expected = [1.0 / 3.0, 1.0, 2.0, 3.0, 11.0 / 3.0];
        for (got, want) in graph.output(mean, "output").unwrap().as_slice().iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} != {want}");
        }
    }

    #[test]
    fn test_constant_boundary() {
        let (mut graph, mean) = smooth(Box::new(MeanFilter), 3);
        graph.set_parameter(mean, "boundary", "constant").unwrap();
        graph.set_parameter(mean, "constant_value", 3.0).unwrap();
        ExecutionEngine::new().update(&mut graph, mean).unwrap();
        let output = graph.output(mean, "output").unwrap().as_slice();
        assert!((output[0] - 4.0 / 3.0).abs() < 1e-5);
        assert!((output[2] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_unknown_boundary_is_rejected() {
        let (mut graph, mean) = smooth(Box::new(MeanFilter), 3);
        assert!(graph.set_parameter(mean, "boundary", "sideways").is_err());
        assert!(graph.set_parameter(mean, "radius", vec![-1i64]).is_err());
    }

    #[test]
    fn test_gaussian_preserves_constant_image() {
        let (mut graph, gaussian) = smooth(Box::new(DiscreteGaussian), 16);
        let source = graph.get_upstream(gaussian)[0];
        graph.set_parameter(source, "pattern", "constant").unwrap();
        graph.set_parameter(source, "offset", 5.0).unwrap();
        graph.set_parameter(gaussian, "variance", 2.0).unwrap();

        ExecutionEngine::new().update(&mut graph, gaussian).unwrap();
        for v in graph.output(gaussian, "output").unwrap().as_slice() {
            assert!((v - 5.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_gaussian_request_padding() {
        let (mut graph, gaussian) = smooth(Box::new(DiscreteGaussian), 100);
        graph.set_parameter(gaussian, "variance", 4.0).unwrap();
        graph
            .set_requested_region(gaussian, "output", Region::new(vec![40], vec![10]).unwrap())
            .unwrap();
        let radius = GaussianOperator::new(4.0).radius();

        let plan = ExecutionEngine::new()
            .propagate_requested_region(&mut graph, gaussian)
            .unwrap();
        let expected = Region::new(vec![40 - radius as i64], vec![10 + 2 * radius]).unwrap();
        assert_eq!(plan.input_request(gaussian, 0), Some(&expected));
    }

    #[test]
    fn test_separable_gaussian_matches_full_kernel() {
        for boundary in ["constant", "nearest", "mirror", "periodic"] {
            let (mut graph, gaussian) = smooth_sized(Box::new(DiscreteGaussian), vec![16, 11]);
            let source = graph.get_upstream(gaussian)[0];
            graph.set_parameter(source, "pattern", "checker").unwrap();
            graph.set_parameter(gaussian, "variance", 2.0).unwrap();
            graph.set_parameter(gaussian, "boundary", boundary).unwrap();
            ExecutionEngine::new().update(&mut graph, gaussian).unwrap();

            let input = graph.output(source, "output").unwrap();
            let domain = Region::from_size(vec![16, 11]);
            assert_eq!(input.buffered_region(), &domain);
            let mut expected = Image::filled(domain, 0.0).unwrap();
            let kernel = GaussianOperator::new(2.0).operator(2).unwrap();
            let mode: BoundaryMode = boundary.parse().unwrap();
            apply_kernel(input, &mut expected, &kernel, &mode, &AbortHandle::new()).unwrap();

            let got = graph.output(gaussian, "output").unwrap().as_slice();
            for (i, (g, e)) in got.iter().zip(expected.as_slice()).enumerate() {
                assert!((g - e).abs() < 1e-4, "{boundary} sample {i}: {g} != {e}");
            }
        }
    }

    #[test]
    fn test_mean_radius_wider_than_input_is_rejected() {
        let (mut graph, mean) = smooth(Box::new(MeanFilter), 5);
        graph.set_parameter(mean, "radius", vec![6i64]).unwrap();
        let err = ExecutionEngine::new().update(&mut graph, mean).unwrap_err();
        assert!(
            matches!(
                err,
                NdflowError::Execution(ExecutionError::InvalidParameter { ref parameter, .. })
                    if parameter == "radius"
            ),
            "{err}"
        );

        // A radius equal to the extent still runs.
        graph.set_parameter(mean, "radius", vec![5i64]).unwrap();
        ExecutionEngine::new().update(&mut graph, mean).unwrap();
    }

    #[test]
    fn test_periodic_mean_reads_across_the_domain() {
        let (mut graph, mean) = smooth(Box::new(MeanFilter), 6);
        graph.set_parameter(mean, "boundary", "periodic").unwrap();
        graph
            .set_requested_region(mean, "output", Region::new(vec![0], vec![1]).unwrap())
            .unwrap();
        ExecutionEngine::new().update(&mut graph, mean).unwrap();
        // Window {-1, 0, 1} wraps -1 onto 5: (5 + 0 + 1) / 3.
        let output = graph.output(mean, "output").unwrap();
        assert!((output.get(&[0]).unwrap() - 2.0).abs() < 1e-5);
    }
}
