//! The process-object capability trait and node metadata.
//!
//! A [`ProcessObject`] is what the engine drives during an update. It is a
//! small set of policy hooks plus `generate_data`:
//!
//! 1. **Information** (`output_information`): the largest possible region of
//!    each output, from the inputs' largest possible regions and parameters.
//! 2. **Requested regions** (`enlarge_output_requested_region`,
//!    `input_requested_region`): what the node needs from each input to
//!    produce what was asked of it.
//! 3. **Execution** (`generate_data`): fill the output buffers, which the
//!    engine has already allocated over the requested region.
//!
//! Every hook except `metadata`, `generate_data` and `clone_box` has a default
//! suited to pointwise filters.

use crate::core::context::{ExecutionContext, NodeContext};
use crate::core::error::{ExecutionError, ExecutionResult};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::region::Region;
use serde::{Deserialize, Serialize};

/// Category for organizing process objects in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Graph sources (readers, synthetic data)
    Source,
    /// Graph sinks (writers)
    Sink,
    /// Per-sample operations
    Pointwise,
    /// Windowed operations reading a neighborhood
    Neighborhood,
    /// Operations that change the index domain
    Geometry,
    /// Operations needing global statistics
    Intensity,
    /// Utility nodes
    Utility,
    /// Custom/user-defined
    #[default]
    Custom,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Source => "Source",
            Category::Sink => "Sink",
            Category::Pointwise => "Pointwise",
            Category::Neighborhood => "Neighborhood",
            Category::Geometry => "Geometry",
            Category::Intensity => "Intensity",
            Category::Utility => "Utility",
            Category::Custom => "Custom",
        }
    }

    /// Get all categories in display order.
    pub fn all() -> &'static [Category] {
        &[
            Category::Source,
            Category::Sink,
            Category::Pointwise,
            Category::Neighborhood,
            Category::Geometry,
            Category::Intensity,
            Category::Utility,
            Category::Custom,
        ]
    }
}

/// Metadata describing a process object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Unique identifier for this node type (e.g., "discrete_gaussian")
    pub id: String,
    /// Human-readable name (e.g., "Discrete Gaussian")
    pub name: String,
    pub category: Category,
    pub description: String,
    pub version: String,

    /// Input slots, in binding order
    pub inputs: Vec<PortDefinition>,
    /// Output slots, one data object each
    pub outputs: Vec<PortDefinition>,
    pub parameters: Vec<ParameterDefinition>,

    /// Searchable tags
    pub tags: Vec<String>,
}

impl NodeMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> NodeMetadataBuilder {
        NodeMetadataBuilder::new(id, name)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }

    /// Find a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Builder for NodeMetadata.
pub struct NodeMetadataBuilder {
    metadata: NodeMetadata,
}

impl NodeMetadataBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: NodeMetadata {
                id: id.into(),
                name: name.into(),
                category: Category::Custom,
                description: String::new(),
                version: "1.0.0".to_string(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                parameters: Vec::new(),
                tags: Vec::new(),
            },
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.metadata.category = category;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = version.into();
        self
    }

    /// Add an input port.
    pub fn input(mut self, port: PortDefinition) -> Self {
        self.metadata.inputs.push(port);
        self
    }

    /// Add an output port.
    pub fn output(mut self, port: PortDefinition) -> Self {
        self.metadata.outputs.push(port);
        self
    }

    /// Add a parameter.
    pub fn parameter(mut self, param: ParameterDefinition) -> Self {
        self.metadata.parameters.push(param);
        self
    }

    /// Add multiple tags.
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.metadata.tags.extend(tags.into_iter().map(|t| t.into()));
        self
    }

    pub fn build(self) -> NodeMetadata {
        self.metadata
    }
}

/// A pipeline node.
///
/// Implementations hold no data: parameters live in the graph (so that their
/// changes are tracked) and are read through the contexts. `Send + Sync` lets
/// `generate_data` run under a rayon pool.
pub trait ProcessObject: Send + Sync {
    /// Get the metadata for this node type.
    fn metadata(&self) -> NodeMetadata;

    /// Largest possible region of each output.
    ///
    /// `inputs` holds the largest possible region of every connected input,
    /// in port order. The default mirrors the first input onto every output.
    fn output_information(
        &self,
        inputs: &[Region],
        ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Vec<Region>> {
        match inputs.first() {
            Some(region) => Ok(vec![region.clone(); ctx.metadata().outputs.len()]),
            None => Err(ExecutionError::MissingInformation {
                node_id: ctx.node_id,
                reason: "node has no input to take its domain from".to_string(),
            }),
        }
    }

    /// Replace the request made of one output before it propagates.
    ///
    /// The result must contain `requested`; the engine crops it to `largest`.
    fn enlarge_output_requested_region(
        &self,
        requested: &Region,
        _largest: &Region,
        _ctx: &NodeContext<'_>,
    ) -> Region {
        requested.clone()
    }

    /// Region needed on input `input` to produce `output_requested`.
    ///
    /// `output_requested` is the bounding box of every output's request, or
    /// `None` for nodes without outputs. The default is the identity, or the
    /// whole input when there is nothing to map from.
    fn input_requested_region(
        &self,
        _input: usize,
        output_requested: Option<&Region>,
        input_largest: &Region,
        _ctx: &NodeContext<'_>,
    ) -> ExecutionResult<Region> {
        Ok(output_requested
            .cloned()
            .unwrap_or_else(|| input_largest.clone()))
    }

    /// Whether the node copes with an input request that had to be cropped
    /// to the producer's largest possible region.
    fn accepts_partial_input(&self, _input: usize) -> bool {
        false
    }

    /// Whether outputs are always buffered over the whole largest possible
    /// region rather than just the requested region.
    fn buffers_largest_possible_region(&self) -> bool {
        false
    }

    /// Compute output samples over each output's buffered region.
    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()>;

    /// Clone this node into a boxed trait object.
    fn clone_box(&self) -> Box<dyn ProcessObject>;
}

impl Clone for Box<dyn ProcessObject> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;
    use crate::core::types::PortType;
    use indexmap::IndexMap;

    #[derive(Debug, Clone)]
    struct Identity;

    impl ProcessObject for Identity {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder("identity", "Identity")
                .category(Category::Utility)
                .input(PortDefinition::input("input", PortType::Image))
                .output(PortDefinition::output("output", PortType::Image))
                .output(PortDefinition::output("copy", PortType::Image))
                .build()
        }

        fn generate_data(&self, _ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn ProcessObject> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = NodeMetadata::builder("test_filter", "Test Filter")
            .category(Category::Pointwise)
            .description("A test filter")
            .input(PortDefinition::input("input", PortType::Image))
            .output(PortDefinition::output("output", PortType::Image))
            .tags(["test", "debug"])
            .build();

        assert_eq!(metadata.id, "test_filter");
        assert_eq!(metadata.category, Category::Pointwise);
        assert_eq!(metadata.input_index("input"), Some(0));
        assert_eq!(metadata.output_index("missing"), None);
        assert_eq!(metadata.tags.len(), 2);
    }

    #[test]
    fn test_default_hooks() {
        let node = Identity;
        let metadata = node.metadata();
        let parameters = IndexMap::new();
        let ctx = NodeContext::new(NodeId::new(), &metadata, &parameters);
        let domain = Region::from_size(vec![100]);

        let info = node.output_information(&[domain.clone()], &ctx).unwrap();
        assert_eq!(info, vec![domain.clone(), domain.clone()]);
        assert!(matches!(
            node.output_information(&[], &ctx),
            Err(ExecutionError::MissingInformation { .. })
        ));

        let requested = Region::new(vec![10], vec![40]).unwrap();
        assert_eq!(node.enlarge_output_requested_region(&requested, &domain, &ctx), requested);
        assert_eq!(
            node.input_requested_region(0, Some(&requested), &domain, &ctx).unwrap(),
            requested
        );
        assert_eq!(node.input_requested_region(0, None, &domain, &ctx).unwrap(), domain);
        assert!(!node.accepts_partial_input(0));
        assert!(!node.buffers_largest_possible_region());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(Category::Neighborhood.display_name(), "Neighborhood");
        assert_eq!(Category::default(), Category::Custom);
    }
}
