//! Pipeline graphs.
//!
//! A pipeline graph is a directed acyclic graph (DAG) where nodes are
//! process objects and edges bind a producer's output data object to a
//! consumer's input slot.

pub mod connection;
pub mod structure;
pub mod topology;

pub use connection::{Connection, Endpoint};
pub use structure::{GraphNode, PipelineGraph};
pub use topology::TopologyAnalyzer;
