//! # ndflow - demand-driven N-dimensional image pipelines
//!
//! ndflow builds directed acyclic graphs of process objects that exchange
//! N-dimensional images, and updates them lazily: asking for a region of one
//! node's output runs only the nodes, and computes only the samples, that
//! the request actually depends on.
//!
//! ## Features
//!
//! - **Region negotiation**: every node states what it can produce and what
//!   it needs, so requests shrink or grow correctly through windowed and
//!   re-indexing filters
//! - **Modification tracking**: nodes re-run only when their parameters,
//!   their inputs or the requested region changed
//! - **Streaming**: large requests are split into pieces bounded by a memory
//!   budget
//! - **Neighborhood cursors**: windowed filters run on an unchecked interior
//!   path and a boundary-condition shell, in parallel slabs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ndflow::prelude::*;
//!
//! let registry = FilterRegistry::with_builtins();
//! let mut graph = PipelineGraph::new();
//!
//! let source = graph.add_node(registry.create("pattern_source")?);
//! graph.set_parameter(source, "size", vec![512i64, 512])?;
//!
//! let smooth = graph.add_node(registry.create("discrete_gaussian")?);
//! graph.set_parameter(smooth, "variance", 4.0)?;
//! graph.connect(source, "output", smooth, "input")?;
//!
//! // Only the rows around [100, 200) are computed.
//! graph.set_requested_region(smooth, "output", Region::new(vec![0, 100], vec![512, 100])?)?;
//! let report = ExecutionEngine::new().update(&mut graph, smooth)?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: regions, images, cursors, operators and the node trait
//! - [`graph`]: graph structure and topology
//! - [`execution`]: the update protocol, streaming and progress
//! - [`filters`]: node registry and built-in nodes

#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod filters;
pub mod graph;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ndflow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::boundary::{BoundaryCondition, BoundaryMode};
    pub use crate::core::clock::{Clock, TimeStamp};
    pub use crate::core::context::{ExecutionContext, NodeContext};
    pub use crate::core::error::{
        ExecutionError, ExecutionResult, GraphError, GraphResult, NdflowError, NdflowResult, NodeId,
        RegionError, RegionResult,
    };
    pub use crate::core::image::Image;
    pub use crate::core::neighborhood::{Neighborhood, NeighborhoodAccess};
    pub use crate::core::node::{Category, NodeMetadata, ProcessObject};
    pub use crate::core::operator::{
        apply_kernel, ApplyOutcome, GaussianOperator, NeighborhoodKernel, NeighborhoodOperator,
    };
    pub use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
    pub use crate::core::region::Region;
    pub use crate::core::splitter::{RegionSplitter, SplitPolicy, StreamingSplitter};
    pub use crate::core::types::{PortType, Value};

    pub use crate::graph::{Connection, Endpoint, GraphNode, PipelineGraph, TopologyAnalyzer};

    pub use crate::execution::{
        AbortHandle, ExecutionEngine, ProgressCallback, ProgressTracker, ProgressUpdate,
        RequestPlan, StaleReason, UpdateOptions, UpdateReport,
    };

    pub use crate::filters::builtin::{
        BufferSource, DiscreteGaussian, ImageFileReader, ImageFileWriter, MeanFilter, PassThrough,
        PatternSource, RegionOfInterest, RescaleIntensity, ShiftScale,
    };
    pub use crate::filters::registry::{FilterFactory, FilterRegistry};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "ndflow");
    }

    #[test]
    fn test_registry_nodes_run() {
        let registry = FilterRegistry::with_builtins();
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let source = graph.add_node(registry.create("pattern_source").unwrap());
        graph.set_parameter(source, "size", vec![8i64, 8]).unwrap();
        let smooth = graph.add_node(registry.create("discrete_gaussian").unwrap());
        graph.connect(source, "output", smooth, "input").unwrap();

        let report = ExecutionEngine::new().update(&mut graph, smooth).unwrap();
        assert_eq!(report.executed_nodes(), vec![source, smooth]);
    }
}
