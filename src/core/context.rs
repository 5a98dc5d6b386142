//! Node and execution contexts.
//!
//! [`NodeContext`] gives policy hooks (information, region requests) typed
//! access to a node's parameters. [`ExecutionContext`] additionally exposes
//! the node's input data objects, its outputs, the abort flag and progress
//! reporting while it generates data.

use crate::core::boundary::BoundaryMode;
use crate::core::error::{ExecutionError, ExecutionResult, NodeId};
use crate::core::image::Image;
use crate::core::node::NodeMetadata;
use crate::core::types::Value;
use crate::execution::progress::{AbortHandle, ProgressTracker};
use indexmap::IndexMap;

/// Read-only view of one node's identity and parameters.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    /// ID of the node.
    pub node_id: NodeId,
    metadata: &'a NodeMetadata,
    parameters: &'a IndexMap<String, Value>,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        node_id: NodeId,
        metadata: &'a NodeMetadata,
        parameters: &'a IndexMap<String, Value>,
    ) -> Self {
        Self {
            node_id,
            metadata,
            parameters,
        }
    }

    pub fn metadata(&self) -> &'a NodeMetadata {
        self.metadata
    }

    pub fn parameters(&self) -> &'a IndexMap<String, Value> {
        self.parameters
    }

    // ========================================================================
    // Parameter Getters
    // ========================================================================

    /// Get a parameter value by name.
    pub fn get_parameter(&self, name: &str) -> ExecutionResult<&'a Value> {
        self.parameters
            .get(name)
            .ok_or_else(|| ExecutionError::MissingParameter {
                node_id: self.node_id,
                parameter: name.to_string(),
            })
    }

    pub(crate) fn invalid(&self, name: &str, error: impl Into<String>) -> ExecutionError {
        ExecutionError::InvalidParameter {
            node_id: self.node_id,
            parameter: name.to_string(),
            error: error.into(),
        }
    }

    pub fn get_integer(&self, name: &str) -> ExecutionResult<i64> {
        self.get_parameter(name)?
            .as_integer()
            .ok_or_else(|| self.invalid(name, "expected an integer"))
    }

    pub fn get_float(&self, name: &str) -> ExecutionResult<f64> {
        self.get_parameter(name)?
            .as_float()
            .ok_or_else(|| self.invalid(name, "expected a float"))
    }

    pub fn get_string(&self, name: &str) -> ExecutionResult<&'a str> {
        self.get_parameter(name)?
            .as_string()
            .ok_or_else(|| self.invalid(name, "expected a string"))
    }

    pub fn get_integer_list(&self, name: &str) -> ExecutionResult<Vec<i64>> {
        self.get_parameter(name)?
            .as_integer_list()
            .ok_or_else(|| self.invalid(name, "expected an integer array"))
    }

    /// An integer per axis; a single value applies to every axis.
    pub fn per_axis(&self, name: &str, dimension: usize) -> ExecutionResult<Vec<i64>> {
        let values = self.get_integer_list(name)?;
        match values.len() {
            1 => Ok(vec![values[0]; dimension]),
            n if n == dimension => Ok(values),
            n => Err(self.invalid(
                name,
                format!("has {n} entries but the image has {dimension} axes"),
            )),
        }
    }

    /// A per-axis non-negative extent for `dimension` axes.
    ///
    /// A single value applies to every axis.
    pub fn radius(&self, name: &str, dimension: usize) -> ExecutionResult<Vec<usize>> {
        self.per_axis(name, dimension)?
            .into_iter()
            .map(|v| usize::try_from(v).map_err(|_| self.invalid(name, format!("{v} is negative"))))
            .collect()
    }

    /// Boundary condition named by `name`, with `constant_value` supplying
    /// the fill for the constant mode.
    pub fn boundary(&self, name: &str) -> ExecutionResult<BoundaryMode> {
        let mode: BoundaryMode = self
            .get_string(name)?
            .parse()
            .map_err(|e: String| self.invalid(name, e))?;
        match mode {
            BoundaryMode::Constant(_) => {
                let value = self.get_float("constant_value").unwrap_or(0.0);
                Ok(BoundaryMode::Constant(value as f32))
            }
            other => Ok(other),
        }
    }
}

/// Everything a node sees while generating data.
pub struct ExecutionContext<'a> {
    node: NodeContext<'a>,
    inputs: Vec<Option<&'a Image>>,
    outputs: &'a mut [Image],
    abort: &'a AbortHandle,
    progress: &'a ProgressTracker,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        node: NodeContext<'a>,
        inputs: Vec<Option<&'a Image>>,
        outputs: &'a mut [Image],
        abort: &'a AbortHandle,
        progress: &'a ProgressTracker,
    ) -> Self {
        Self {
            node,
            inputs,
            outputs,
            abort,
            progress,
        }
    }

    pub fn node(&self) -> &NodeContext<'a> {
        &self.node
    }

    pub fn node_id(&self) -> NodeId {
        self.node.node_id
    }

    // ========================================================================
    // Data access
    // ========================================================================

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// The data object bound to input `index`.
    pub fn input(&self, index: usize) -> ExecutionResult<&'a Image> {
        self.inputs
            .get(index)
            .copied()
            .flatten()
            .ok_or_else(|| ExecutionError::MissingInput {
                node_id: self.node.node_id,
                port: self
                    .node
                    .metadata
                    .inputs
                    .get(index)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| format!("#{index}")),
            })
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_mut(&mut self, index: usize) -> ExecutionResult<&mut Image> {
        let node_id = self.node.node_id;
        self.outputs
            .get_mut(index)
            .ok_or_else(|| ExecutionError::NodeExecution {
                node_id,
                error: format!("node has no output #{index}"),
            })
    }

    /// The first input and the first output together.
    pub fn input_and_output(&mut self) -> ExecutionResult<(&'a Image, &mut Image)> {
        let input = self.input(0)?;
        Ok((input, self.output_mut(0)?))
    }

    // ========================================================================
    // Progress and Abort
    // ========================================================================

    pub fn abort_handle(&self) -> &'a AbortHandle {
        self.abort
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Return `Aborted` if an abort was requested.
    pub fn check_aborted(&self) -> ExecutionResult<()> {
        if self.abort.is_aborted() {
            Err(ExecutionError::Aborted {
                node_id: self.node.node_id,
            })
        } else {
            Ok(())
        }
    }

    /// Report the fraction of this node's work that is done.
    pub fn report_progress(&self, fraction: f32) {
        self.progress.node_progress(self.node.node_id, fraction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::NodeMetadata;
    use crate::core::port::PortDefinition;
    use crate::core::region::Region;
    use crate::core::types::PortType;

    fn metadata() -> NodeMetadata {
        NodeMetadata::builder("test", "Test")
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .build()
    }

    #[test]
    fn test_typed_getters() {
        let metadata = metadata();
        let mut parameters = IndexMap::new();
        parameters.insert("variance".to_string(), Value::Float(2.0));
        parameters.insert("radius".to_string(), Value::from(vec![1i64, 2]));
        parameters.insert("boundary".to_string(), Value::from("constant"));
        parameters.insert("constant_value".to_string(), Value::Float(-3.0));
        let ctx = NodeContext::new(NodeId::new(), &metadata, &parameters);

        assert_eq!(ctx.get_float("variance").unwrap(), 2.0);
        assert!(matches!(
            ctx.get_integer("variance"),
            Err(ExecutionError::InvalidParameter { .. })
        ));
        assert!(matches!(
            ctx.get_float("missing"),
            Err(ExecutionError::MissingParameter { .. })
        ));
        assert_eq!(ctx.radius("radius", 2).unwrap(), vec![1, 2]);
        assert!(ctx.radius("radius", 3).is_err());
        assert_eq!(ctx.boundary("boundary").unwrap(), BoundaryMode::Constant(-3.0));
    }

    #[test]
    fn test_scalar_radius_broadcasts() {
        let metadata = metadata();
        let mut parameters = IndexMap::new();
        parameters.insert("radius".to_string(), Value::Integer(2));
        let ctx = NodeContext::new(NodeId::new(), &metadata, &parameters);
        assert_eq!(ctx.radius("radius", 3).unwrap(), vec![2, 2, 2]);
    }

    #[test]
    fn test_execution_context_inputs_and_abort() {
        let metadata = metadata();
        let parameters = IndexMap::new();
        let node = NodeContext::new(NodeId::new(), &metadata, &parameters);
        let input = Image::filled(Region::from_size(vec![4]), 1.0).unwrap();
        let mut outputs = vec![Image::default()];
        let abort = AbortHandle::new();
        let progress = ProgressTracker::default();

        let mut ctx = ExecutionContext::new(node, vec![Some(&input)], &mut outputs, &abort, &progress);
        assert_eq!(ctx.input(0).unwrap().as_slice().len(), 4);
        assert!(matches!(ctx.input(1), Err(ExecutionError::MissingInput { .. })));
        assert!(ctx.output_mut(0).is_ok());
        assert!(ctx.output_mut(1).is_err());

        assert!(ctx.check_aborted().is_ok());
        abort.abort();
        assert!(matches!(ctx.check_aborted(), Err(ExecutionError::Aborted { .. })));
    }
}
