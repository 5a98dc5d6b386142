//! Error types for ndflow.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Name the node responsible (for pipeline faults)
//! - Carry the offending region when a request cannot be satisfied
//! - Unwind a whole `update` call rather than being swallowed per node

use crate::core::region::Region;
use crate::core::types::PortType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node in the graph.
///
/// Stable for the lifetime of the node, which is what modification-time
/// comparisons key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a node ID from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a connection in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for ndflow.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum NdflowError {
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Malformed regions and region/buffer mismatches.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionError {
    #[error("Invalid region: {reason}")]
    Invalid { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Region {region} does not fit inside buffered region {buffered}")]
    OutsideBuffer { region: Region, buffered: Region },
}

/// Errors related to graph structure and wiring.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("Port '{port}' not found on node {node_id}")]
    PortNotFound { node_id: NodeId, port: String },

    #[error("Cycle detected in graph involving nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    #[error("Port '{port}' on node {node_id} is already connected")]
    PortAlreadyConnected { node_id: NodeId, port: String },

    #[error("Type mismatch: cannot connect {from_type} to {to_type}")]
    TypeMismatch {
        from_type: PortType,
        to_type: PortType,
    },

    #[error("Node {node_id} has no parameter '{parameter}'")]
    UnknownParameter { node_id: NodeId, parameter: String },

    #[error("Invalid value for parameter '{parameter}' on node {node_id}: {error}")]
    InvalidParameter {
        node_id: NodeId,
        parameter: String,
        error: String,
    },

    #[error("No filter registered under '{0}'")]
    UnknownFilter(String),
}

/// Errors raised while updating a pipeline.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Node {node_id} cannot supply {requested} (largest possible region is {available})")]
    RegionUnavailable {
        node_id: NodeId,
        requested: Region,
        available: Region,
    },

    #[error("Execution of node {node_id} was aborted")]
    Aborted { node_id: NodeId },

    #[error("Missing input '{port}' for node {node_id}")]
    MissingInput { node_id: NodeId, port: String },

    #[error("Missing parameter '{parameter}' for node {node_id}")]
    MissingParameter { node_id: NodeId, parameter: String },

    #[error("Invalid parameter '{parameter}' for node {node_id}: {error}")]
    InvalidParameter {
        node_id: NodeId,
        parameter: String,
        error: String,
    },

    #[error("Node {node_id} could not determine its output information: {reason}")]
    MissingInformation { node_id: NodeId, reason: String },

    #[error("Node {node_id} execution failed: {error}")]
    NodeExecution { node_id: NodeId, error: String },

    #[error("I/O failure in node {node_id}: {error}")]
    Io { node_id: NodeId, error: String },

    #[error(transparent)]
    Region(#[from] RegionError),
}

// ============================================================================
// Error Utilities
// ============================================================================

impl ExecutionError {
    /// Get the node ID that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            ExecutionError::RegionUnavailable { node_id, .. }
            | ExecutionError::Aborted { node_id }
            | ExecutionError::MissingInput { node_id, .. }
            | ExecutionError::MissingParameter { node_id, .. }
            | ExecutionError::InvalidParameter { node_id, .. }
            | ExecutionError::MissingInformation { node_id, .. }
            | ExecutionError::NodeExecution { node_id, .. }
            | ExecutionError::Io { node_id, .. } => Some(*node_id),
            ExecutionError::Region(_) => None,
        }
    }

    /// Whether a plain re-`update` may succeed without changing the graph.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Aborted { .. } | ExecutionError::Io { .. })
    }
}

impl NdflowError {
    /// The node named by the underlying error, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            NdflowError::Execution(e) => e.node_id(),
            NdflowError::Graph(GraphError::NodeNotFound(id)) => Some(*id),
            _ => None,
        }
    }
}

/// Result type alias for ndflow operations.
pub type NdflowResult<T> = Result<T, NdflowError>;

/// Result type alias for region operations.
pub type RegionResult<T> = Result<T, RegionError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for execution operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new();
        let display = format!("{}", id);
        assert_eq!(display.len(), 8);
    }

    #[test]
    fn test_region_unavailable_names_node() {
        let node_id = NodeId::new();
        let error = ExecutionError::RegionUnavailable {
            node_id,
            requested: Region::from_size(vec![200]),
            available: Region::from_size(vec![100]),
        };
        assert_eq!(error.node_id(), Some(node_id));
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("[0, 200)"));

        let wrapped = NdflowError::from(error);
        assert_eq!(wrapped.node_id(), Some(node_id));
    }

    #[test]
    fn test_abort_is_retryable() {
        let error = ExecutionError::Aborted { node_id: NodeId::new() };
        assert!(error.is_retryable());
    }
}
