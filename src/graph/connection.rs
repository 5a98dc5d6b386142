//! Edges of the pipeline graph.

use crate::core::error::{ConnectionId, NodeId};
use serde::{Deserialize, Serialize};

/// One side of a connection: a node and one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node_id: NodeId,
    /// Port name as declared in the node's metadata.
    pub port_name: String,
    /// Position of the port in the node's input or output list.
    pub slot: usize,
}

impl Endpoint {
    pub fn new(node_id: NodeId, port_name: impl Into<String>, slot: usize) -> Self {
        Self {
            node_id,
            port_name: port_name.into(),
            slot,
        }
    }
}

/// Binds a producer's output slot to a consumer's input slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    /// Producer output.
    pub from: Endpoint,
    /// Consumer input.
    pub to: Endpoint,
}

impl Connection {
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            id: ConnectionId::new(),
            from,
            to,
        }
    }

    /// Whether this connection feeds input `slot` of `node_id`.
    pub fn feeds(&self, node_id: NodeId, slot: usize) -> bool {
        self.to.node_id == node_id && self.to.slot == slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_feeds() {
        let producer = NodeId::new();
        let consumer = NodeId::new();
        let conn = Connection::new(
            Endpoint::new(producer, "output", 0),
            Endpoint::new(consumer, "input", 1),
        );

        assert!(conn.feeds(consumer, 1));
        assert!(!conn.feeds(consumer, 0));
        assert!(!conn.feeds(producer, 1));
        assert_eq!(conn.from.port_name, "output");
    }
}
