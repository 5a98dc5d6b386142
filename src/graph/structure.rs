//! Graph structure and node management.
//!
//! The [`PipelineGraph`] is an arena: it owns every node, every node's output
//! images and the edges between them. Nodes refer to each other by
//! [`NodeId`], so the engine can borrow one node's outputs mutably while
//! reading the outputs of its producers.
//!
//! Every externally visible mutation (a parameter change, a manual
//! [`PipelineGraph::modified`], rewiring an input) advances the node's
//! modification time on the graph's [`Clock`].

use crate::core::clock::{Clock, TimeStamp};
use crate::core::error::{ConnectionId, GraphError, GraphResult, NodeId};
use crate::core::image::Image;
use crate::core::node::{NodeMetadata, ProcessObject};
use crate::core::region::Region;
use crate::core::types::Value;
use crate::graph::connection::{Connection, Endpoint};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashSet, VecDeque};

/// A node instance in the graph.
///
/// Holds the process object, its current parameter values, its output data
/// objects and the timestamps the engine compares during an update.
#[derive(Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub process: Box<dyn ProcessObject>,
    /// Optional display name override
    pub label: Option<String>,
    pub(crate) metadata: NodeMetadata,
    pub(crate) parameters: IndexMap<String, Value>,
    pub(crate) outputs: Vec<Image>,
    /// Caller-supplied output requests, per output slot.
    pub(crate) requested_seeds: Vec<Option<Region>>,
    /// Last parameter change.
    pub(crate) modified_time: TimeStamp,
    /// Last successful `generate_data`.
    pub(crate) execution_time: TimeStamp,
    /// Last time output information was computed.
    pub(crate) information_time: TimeStamp,
    /// Newest modification anywhere upstream, including this node.
    pub(crate) pipeline_time: TimeStamp,
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("process", &self.metadata.id)
            .field("parameters", &self.parameters)
            .field("label", &self.label)
            .field("modified_time", &self.modified_time)
            .field("execution_time", &self.execution_time)
            .finish()
    }
}

impl GraphNode {
    fn new(process: Box<dyn ProcessObject>, clock: &Clock) -> Self {
        let metadata = process.metadata();
        let parameters = metadata
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.default_value.clone()))
            .collect();
        let outputs = metadata
            .outputs
            .iter()
            .map(|_| Image::new(clock.clone()))
            .collect();
        let requested_seeds = vec![None; metadata.outputs.len()];
        Self {
            id: NodeId::new(),
            process,
            label: None,
            metadata,
            parameters,
            outputs,
            requested_seeds,
            modified_time: clock.tick(),
            execution_time: TimeStamp::NEVER,
            information_time: TimeStamp::NEVER,
            pipeline_time: TimeStamp::NEVER,
        }
    }

    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    /// Get the display name (label or process name).
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.metadata.name.clone())
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn outputs(&self) -> &[Image] {
        &self.outputs
    }

    pub fn output(&self, slot: usize) -> Option<&Image> {
        self.outputs.get(slot)
    }

    pub fn modified_time(&self) -> TimeStamp {
        self.modified_time
    }

    /// When the node last produced output. `NEVER` after an abort or failure.
    pub fn execution_time(&self) -> TimeStamp {
        self.execution_time
    }

    pub fn information_time(&self) -> TimeStamp {
        self.information_time
    }

    /// The caller's request seed for output `slot`, if any.
    pub fn requested_seed(&self, slot: usize) -> Option<&Region> {
        self.requested_seeds.get(slot).and_then(Option::as_ref)
    }

    fn input_slot(&self, port: &str) -> GraphResult<usize> {
        self.metadata
            .input_index(port)
            .ok_or_else(|| GraphError::PortNotFound {
                node_id: self.id,
                port: port.to_string(),
            })
    }

    fn output_slot(&self, port: &str) -> GraphResult<usize> {
        self.metadata
            .output_index(port)
            .ok_or_else(|| GraphError::PortNotFound {
                node_id: self.id,
                port: port.to_string(),
            })
    }
}

/// A directed acyclic graph of process objects.
///
/// Uses IndexMap to keep insertion order for consistent iteration.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    nodes: IndexMap<NodeId, GraphNode>,
    connections: Vec<Connection>,
    clock: Clock,
}

impl PipelineGraph {
    /// Create an empty graph stamped on the process-wide clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::global())
    }

    /// Create an empty graph with its own modification clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            nodes: IndexMap::new(),
            connections: Vec::new(),
            clock,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    /// Add a process object with default parameters and return its ID.
    pub fn add_node(&mut self, process: Box<dyn ProcessObject>) -> NodeId {
        let node = GraphNode::new(process, &self.clock);
        let id = node.id;
        debug!("Added node {} ({})", id, node.metadata.id);
        self.nodes.insert(id, node);
        id
    }

    /// Add a process object with a display label.
    pub fn add_labeled_node(
        &mut self,
        process: Box<dyn ProcessObject>,
        label: impl Into<String>,
    ) -> NodeId {
        let id = self.add_node(process);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.label = Some(label.into());
        }
        id
    }

    /// Remove a node and every connection touching it.
    ///
    /// Former consumers are marked modified since their input went away.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<GraphNode> {
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::NodeNotFound(id))?;

        let consumers: Vec<NodeId> = self
            .connections_from(id)
            .map(|c| c.to.node_id)
            .collect();
        self.connections
            .retain(|conn| conn.from.node_id != id && conn.to.node_id != id);
        for consumer in consumers {
            self.touch(consumer);
        }
        Ok(node)
    }

    pub fn get_node(&self, id: NodeId) -> GraphResult<&GraphNode> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub(crate) fn get_node_mut(&mut self, id: NodeId) -> GraphResult<&mut GraphNode> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn touch(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.modified_time = self.clock.tick();
        }
    }

    // ========================================================================
    // Parameters and modification
    // ========================================================================

    /// Set a parameter after validating it against its definition.
    ///
    /// Returns whether the value changed. Only a change advances the node's
    /// modification time.
    pub fn set_parameter(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<Value>,
    ) -> GraphResult<bool> {
        let value = value.into();
        let clock = self.clock.clone();
        let node = self.get_node_mut(id)?;
        let definition =
            node.metadata
                .get_parameter(name)
                .ok_or_else(|| GraphError::UnknownParameter {
                    node_id: id,
                    parameter: name.to_string(),
                })?;
        definition
            .validate(&value)
            .map_err(|error| GraphError::InvalidParameter {
                node_id: id,
                parameter: name.to_string(),
                error,
            })?;

        if node.parameters.get(name) == Some(&value) {
            return Ok(false);
        }
        debug!("Node {}: {} = {}", id, name, value);
        node.parameters.insert(name.to_string(), value);
        node.modified_time = clock.tick();
        Ok(true)
    }

    pub fn parameter(&self, id: NodeId, name: &str) -> GraphResult<&Value> {
        self.get_node(id)?
            .parameter(name)
            .ok_or_else(|| GraphError::UnknownParameter {
                node_id: id,
                parameter: name.to_string(),
            })
    }

    /// Mark a node as changed so the next update re-executes it.
    pub fn modified(&mut self, id: NodeId) -> GraphResult<TimeStamp> {
        let stamp = self.clock.tick();
        self.get_node_mut(id)?.modified_time = stamp;
        Ok(stamp)
    }

    // ========================================================================
    // Output data objects
    // ========================================================================

    pub fn output(&self, id: NodeId, port: &str) -> GraphResult<&Image> {
        let node = self.get_node(id)?;
        let slot = node.output_slot(port)?;
        Ok(&node.outputs[slot])
    }

    /// Discard the output's buffer after its consumers have read it.
    pub fn set_release_data_flag(&mut self, id: NodeId, port: &str, flag: bool) -> GraphResult<()> {
        let node = self.get_node_mut(id)?;
        let slot = node.output_slot(port)?;
        node.outputs[slot].set_release_data_flag(flag);
        Ok(())
    }

    /// Seed the region a later update should make current on this output.
    ///
    /// Seeds are not modifications: they change what is asked for, not what
    /// the node computes.
    pub fn set_requested_region(&mut self, id: NodeId, port: &str, region: Region) -> GraphResult<()> {
        let node = self.get_node_mut(id)?;
        let slot = node.output_slot(port)?;
        node.requested_seeds[slot] = Some(region);
        Ok(())
    }

    /// Restore the default request (the largest possible region) on every
    /// output of the node.
    pub fn clear_requested_region(&mut self, id: NodeId) -> GraphResult<()> {
        let node = self.get_node_mut(id)?;
        node.requested_seeds.iter_mut().for_each(|seed| *seed = None);
        Ok(())
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Bind `from_node`'s output port to `to_node`'s input port.
    ///
    /// Rejects edges that would close a cycle. The consumer is marked
    /// modified.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: &str,
        to_node: NodeId,
        to_port: &str,
    ) -> GraphResult<ConnectionId> {
        let producer = self.get_node(from_node)?;
        let consumer = self.get_node(to_node)?;
        let from_slot = producer.output_slot(from_port)?;
        let to_slot = consumer.input_slot(to_port)?;

        let from_type = &producer.metadata.outputs[from_slot].port_type;
        let to_type = &consumer.metadata.inputs[to_slot].port_type;
        if !from_type.compatible_with(to_type) {
            return Err(GraphError::TypeMismatch {
                from_type: from_type.clone(),
                to_type: to_type.clone(),
            });
        }

        if self.connections.iter().any(|c| c.feeds(to_node, to_slot)) {
            return Err(GraphError::PortAlreadyConnected {
                node_id: to_node,
                port: to_port.to_string(),
            });
        }

        if self.is_reachable(to_node, from_node) {
            return Err(GraphError::CycleDetected {
                nodes: vec![from_node, to_node],
            });
        }

        let connection = Connection::new(
            Endpoint::new(from_node, from_port, from_slot),
            Endpoint::new(to_node, to_port, to_slot),
        );
        let id = connection.id;
        self.connections.push(connection);
        self.touch(to_node);
        debug!("Connected {}.{} -> {}.{}", from_node, from_port, to_node, to_port);
        Ok(id)
    }

    /// Remove a connection. The consumer is marked modified.
    pub fn disconnect(&mut self, id: ConnectionId) -> GraphResult<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;

        let connection = self.connections.remove(pos);
        self.touch(connection.to.node_id);
        Ok(connection)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections_from(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.from.node_id == node_id)
    }

    pub fn connections_to(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.to.node_id == node_id)
    }

    /// The producer endpoint bound to input `slot` of `node_id`.
    pub fn producer_of(&self, node_id: NodeId, slot: usize) -> Option<&Endpoint> {
        self.connections
            .iter()
            .find(|c| c.feeds(node_id, slot))
            .map(|c| &c.from)
    }

    // ========================================================================
    // Graph Analysis
    // ========================================================================

    /// Check if `target` is reachable from `start` following connections.
    pub fn is_reachable(&self, start: NodeId, target: NodeId) -> bool {
        if start == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                queue.extend(self.connections_from(current).map(|c| c.to.node_id));
            }
        }
        false
    }

    /// All nodes that depend on the given node.
    pub fn get_downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.walk(node_id, |graph, id| {
            graph.connections_from(id).map(|c| c.to.node_id).collect()
        })
    }

    /// All nodes the given node depends on.
    pub fn get_upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.walk(node_id, |graph, id| {
            graph.connections_to(id).map(|c| c.from.node_id).collect()
        })
    }

    fn walk(&self, start: NodeId, next: impl Fn(&Self, NodeId) -> Vec<NodeId>) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = next(self, start).into();

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                queue.extend(next(self, current));
            }
        }
        result
    }

    /// Nodes with no incoming connections.
    pub fn get_source_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.connections_to(id).next().is_none())
            .collect()
    }

    /// Nodes with no outgoing connections.
    pub fn get_sink_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.connections_from(id).next().is_none())
            .collect()
    }
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::builtin::{PassThrough, PatternSource};

    fn chain(graph: &mut PipelineGraph) -> (NodeId, NodeId, NodeId) {
        let a = graph.add_node(Box::new(PatternSource));
        let b = graph.add_node(Box::new(PassThrough));
        let c = graph.add_node(Box::new(PassThrough));
        graph.connect(a, "output", b, "input").unwrap();
        graph.connect(b, "output", c, "input").unwrap();
        (a, b, c)
    }

    #[test]
    fn test_add_remove_node() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let id = graph.add_node(Box::new(PassThrough));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.get_node(id).unwrap().outputs().len(), 1);

        graph.remove_node(id).unwrap();
        assert!(!graph.has_node(id));
        assert!(matches!(graph.remove_node(id), Err(GraphError::NodeNotFound(_))));
    }

    #[test]
    fn test_connect_and_disconnect() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let a = graph.add_node(Box::new(PatternSource));
        let b = graph.add_node(Box::new(PassThrough));

        let before = graph.get_node(b).unwrap().modified_time();
        let conn = graph.connect(a, "output", b, "input").unwrap();
        assert!(graph.get_node(b).unwrap().modified_time() > before);
        assert_eq!(graph.producer_of(b, 0).map(|e| e.node_id), Some(a));

        assert!(matches!(
            graph.connect(a, "output", b, "input"),
            Err(GraphError::PortAlreadyConnected { .. })
        ));
        assert!(matches!(
            graph.connect(a, "missing", b, "input"),
            Err(GraphError::PortNotFound { .. })
        ));

        graph.disconnect(conn).unwrap();
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_cycle_rejected_at_connect() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (_, b, c) = chain(&mut graph);
        let d = graph.add_node(Box::new(PassThrough));
        graph.connect(c, "output", d, "input").unwrap();

        let result = graph.connect(d, "output", b, "input");
        assert!(matches!(result, Err(GraphError::PortAlreadyConnected { .. })));

        let e = graph.add_node(Box::new(PassThrough));
        let result = graph.connect(e, "output", e, "input");
        assert!(matches!(result, Err(GraphError::CycleDetected { .. })));
        assert_eq!(graph.connection_count(), 3);
    }

    #[test]
    fn test_set_parameter_ticks_only_on_change() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let a = graph.add_node(Box::new(PatternSource));

        let t0 = graph.get_node(a).unwrap().modified_time();
        assert!(graph.set_parameter(a, "offset", 2.0).unwrap());
        let t1 = graph.get_node(a).unwrap().modified_time();
        assert!(t1 > t0);

        assert!(!graph.set_parameter(a, "offset", 2.0).unwrap());
        assert_eq!(graph.get_node(a).unwrap().modified_time(), t1);

        assert!(matches!(
            graph.set_parameter(a, "nope", 1.0),
            Err(GraphError::UnknownParameter { .. })
        ));
        assert!(matches!(
            graph.set_parameter(a, "size", vec![0i64, 4]),
            Err(GraphError::InvalidParameter { .. })
        ));

        let t2 = graph.modified(a).unwrap();
        assert!(t2 > t1);
    }

    #[test]
    fn test_requested_seed_round_trip() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let a = graph.add_node(Box::new(PatternSource));
        let region = Region::from_size(vec![4, 4]);

        graph.set_requested_region(a, "output", region.clone()).unwrap();
        assert_eq!(graph.get_node(a).unwrap().requested_seed(0), Some(&region));
        graph.clear_requested_region(a).unwrap();
        assert_eq!(graph.get_node(a).unwrap().requested_seed(0), None);
    }

    #[test]
    fn test_upstream_downstream() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (a, b, c) = chain(&mut graph);

        let downstream = graph.get_downstream(a);
        assert_eq!(downstream, vec![b, c]);
        let upstream = graph.get_upstream(c);
        assert_eq!(upstream, vec![b, a]);
        assert_eq!(graph.get_source_nodes(), vec![a]);
        assert_eq!(graph.get_sink_nodes(), vec![c]);
    }

    #[test]
    fn test_remove_node_touches_consumers() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (_, b, c) = chain(&mut graph);
        let before = graph.get_node(c).unwrap().modified_time();
        graph.remove_node(b).unwrap();
        assert!(graph.get_node(c).unwrap().modified_time() > before);
        assert_eq!(graph.connection_count(), 0);
    }
}
