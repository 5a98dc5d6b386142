//! Topological ordering of pipeline graphs.
//!
//! The engine only ever walks the upstream closure of its update target, so
//! the analyzer can order either the whole graph or just that closure.

use crate::core::error::{GraphError, GraphResult, NodeId};
use crate::graph::structure::PipelineGraph;
use std::collections::{HashMap, HashSet, VecDeque};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a PipelineGraph,
}

impl<'a> TopologyAnalyzer<'a> {
    pub fn new(graph: &'a PipelineGraph) -> Self {
        Self { graph }
    }

    /// Every node, producers before consumers.
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        let all: Vec<NodeId> = self.graph.node_ids().collect();
        self.sort(&all)
    }

    /// `target` and everything upstream of it, producers before consumers.
    ///
    /// The target is always last.
    pub fn upstream_order(&self, target: NodeId) -> GraphResult<Vec<NodeId>> {
        if !self.graph.has_node(target) {
            return Err(GraphError::NodeNotFound(target));
        }
        let mut closure = self.graph.get_upstream(target);
        closure.push(target);
        self.sort(&closure)
    }

    /// Kahn's algorithm restricted to `members`.
    ///
    /// Ties are broken by the graph's insertion order so the result is
    /// deterministic.
    fn sort(&self, members: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        let member_set: HashSet<NodeId> = members.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = members.iter().map(|&id| (id, 0)).collect();
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for conn in self.graph.connections() {
            let (from, to) = (conn.from.node_id, conn.to.node_id);
            if member_set.contains(&from) && member_set.contains(&to) {
                adjacency.entry(from).or_default().push(to);
                *in_degree.entry(to).or_default() += 1;
            }
        }

        let mut queue: VecDeque<NodeId> = self
            .graph
            .node_ids()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(members.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for neighbor in adjacency.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*neighbor);
                    }
                }
            }
        }

        if result.len() != members.len() {
            let remaining = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(GraphError::CycleDetected { nodes: remaining });
        }
        Ok(result)
    }

    /// Longest path from a source to this node.
    pub fn node_depth(&self, node_id: NodeId) -> GraphResult<usize> {
        let order = self.upstream_order(node_id)?;
        let mut depth: HashMap<NodeId, usize> = HashMap::new();
        for id in order {
            let d = self
                .graph
                .connections_to(id)
                .filter_map(|c| depth.get(&c.from.node_id))
                .max()
                .map_or(0, |d| d + 1);
            depth.insert(id, d);
        }
        Ok(depth.get(&node_id).copied().unwrap_or(0))
    }
}
