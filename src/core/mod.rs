//! Core types and traits of the pipeline.
//!
//! This module contains the foundations every node and the engine share:
//! - Region algebra and the modification clock
//! - The `Image` data object and its neighborhood cursors
//! - Boundary conditions, operators and the splitters used for streaming
//! - The `ProcessObject` trait, its metadata, parameters and contexts
//! - Error types

pub mod boundary;
pub mod clock;
pub mod context;
pub mod error;
pub mod image;
pub mod neighborhood;
pub mod node;
pub mod operator;
pub mod port;
pub mod region;
pub mod splitter;
pub mod types;

// Re-export commonly used types
pub use boundary::{BoundaryCondition, BoundaryMode};
pub use clock::{Clock, TimeStamp};
pub use context::{ExecutionContext, NodeContext};
pub use error::{ExecutionError, GraphError, NdflowError, NodeId, RegionError};
pub use image::Image;
pub use node::{Category, NodeMetadata, ProcessObject};
pub use port::{Constraint, ParameterDefinition, PortDefinition};
pub use region::Region;
pub use splitter::{RegionSplitter, SplitPolicy, StreamingSplitter};
pub use types::{PortType, Value};
