//! The demand-driven update protocol.
//!
//! [`ExecutionEngine::update`] makes a node's outputs current in four phases:
//!
//! 1. **Output information**, producers first: every node in the target's
//!    upstream closure recomputes the largest possible region of its outputs
//!    when anything upstream (or its own parameters) changed since it last did.
//! 2. **Requested-region propagation**, consumers first: the target's request
//!    (the caller's seed or its largest possible region) is enlarged by each
//!    node's policy, mapped onto its inputs, cropped to what the producers can
//!    supply and merged across consumers.
//! 3. **Staleness**: starting from the target, a node is stale when it never
//!    ran, its parameters or inputs changed after it last ran, or its buffer
//!    does not hold what is now requested. Only a stale node looks further
//!    upstream, so data nobody needs is never touched.
//! 4. **Generate data**: a stale node first brings its producers up to date,
//!    then allocates its outputs over their requested regions and runs.
//!
//! Any error unwinds the whole update.

use crate::core::clock::TimeStamp;
use crate::core::context::{ExecutionContext, NodeContext};
use crate::core::error::{ExecutionError, ExecutionResult, NdflowError, NdflowResult, NodeId};
use crate::core::image::Image;
use crate::core::region::Region;
use crate::core::splitter::{StreamingSplitter, DEFAULT_MEMORY_LIMIT};
use crate::execution::progress::{AbortHandle, ProgressCallback, ProgressTracker, ProgressUpdate};
use crate::graph::structure::PipelineGraph;
use crate::graph::topology::TopologyAnalyzer;
use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Update options.
///
/// Serializable fields can be loaded from TOML:
///
/// ```toml
/// number_of_threads = 4
/// memory_limit = 67108864
/// stream_pieces = 8
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    /// Worker threads available inside one node's `generate_data`
    /// (0 = rayon's global pool).
    pub number_of_threads: usize,
    /// Streaming budget in bytes for `update_streamed`.
    pub memory_limit: usize,
    /// Fixed piece count for streaming, overriding the budget.
    pub stream_pieces: Option<usize>,
    /// Cooperative abort flag, polled by nodes between chunks of work.
    #[serde(skip)]
    pub abort: AbortHandle,
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for UpdateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateOptions")
            .field("number_of_threads", &self.number_of_threads)
            .field("memory_limit", &self.memory_limit)
            .field("stream_pieces", &self.stream_pieces)
            .field("aborted", &self.abort.is_aborted())
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            number_of_threads: 0,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            stream_pieces: None,
            abort: AbortHandle::new(),
            progress_callback: None,
        }
    }
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.number_of_threads = threads;
        self
    }

    /// Set the streaming budget in bytes.
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the streaming budget in megabytes.
    pub fn with_memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit = mb * 1024 * 1024;
        self
    }

    pub fn with_stream_pieces(mut self, pieces: usize) -> Self {
        self.stream_pieces = Some(pieces);
        self
    }

    /// Share an abort handle with the caller.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Parse options from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> NdflowResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> NdflowResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The splitter `update_streamed` uses.
    pub fn splitter(&self) -> StreamingSplitter {
        let splitter = StreamingSplitter::new().with_memory_limit(self.memory_limit);
        match self.stream_pieces {
            Some(pieces) => splitter.with_pieces(pieces),
            None => splitter,
        }
    }
}

/// Why a node had to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    NeverExecuted,
    ParametersModified,
    InputModified,
    RegionNotBuffered,
    DataReleased,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StaleReason::NeverExecuted => "never executed",
            StaleReason::ParametersModified => "parameters modified",
            StaleReason::InputModified => "input modified",
            StaleReason::RegionNotBuffered => "requested region not buffered",
            StaleReason::DataReleased => "data released",
        };
        f.write_str(text)
    }
}

/// Outcome of requested-region propagation.
#[derive(Debug, Clone, Default)]
pub struct RequestPlan {
    /// Upstream closure of the target, producers first.
    pub order: Vec<NodeId>,
    /// Final request on every output slot, `None` where nothing asked.
    pub output_requests: HashMap<NodeId, Vec<Option<Region>>>,
    /// Region each node needs on every input slot, after cropping.
    pub input_requests: HashMap<NodeId, Vec<Option<Region>>>,
    /// Input slots whose request was cropped and tolerated.
    pub cropped_inputs: Vec<(NodeId, usize)>,
}

impl RequestPlan {
    pub fn output_request(&self, node: NodeId, slot: usize) -> Option<&Region> {
        self.output_requests
            .get(&node)
            .and_then(|slots| slots.get(slot))
            .and_then(Option::as_ref)
    }

    pub fn input_request(&self, node: NodeId, slot: usize) -> Option<&Region> {
        self.input_requests
            .get(&node)
            .and_then(|slots| slots.get(slot))
            .and_then(Option::as_ref)
    }
}

/// What an update did.
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    /// Nodes that ran, in execution order, with the reason. A node appears
    /// once per streamed piece it ran for.
    pub executed: Vec<(NodeId, StaleReason)>,
    /// Nodes found current and reused.
    pub up_to_date: Vec<NodeId>,
    /// Nodes whose output information was recomputed.
    pub information_updated: Vec<NodeId>,
    /// Outputs whose buffers were released, as (node, output slot).
    pub released: Vec<(NodeId, usize)>,
    /// Input requests of the last pass.
    pub input_requests: IndexMap<NodeId, Vec<Option<Region>>>,
    /// Largest total of buffered bytes over the closure after a pass.
    pub peak_buffered_bytes: usize,
    pub pieces: usize,
    pub duration: Duration,
}

impl UpdateReport {
    pub fn was_executed(&self, node: NodeId) -> bool {
        self.executed.iter().any(|(id, _)| *id == node)
    }

    pub fn execution_count(&self, node: NodeId) -> usize {
        self.executed.iter().filter(|(id, _)| *id == node).count()
    }

    pub fn executed_nodes(&self) -> Vec<NodeId> {
        self.executed.iter().map(|(id, _)| *id).collect()
    }

    pub fn stale_reason(&self, node: NodeId) -> Option<StaleReason> {
        self.executed
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, reason)| *reason)
    }

    pub(crate) fn absorb(&mut self, pass: UpdateReport) {
        self.executed.extend(pass.executed);
        for id in pass.up_to_date {
            if !self.up_to_date.contains(&id) {
                self.up_to_date.push(id);
            }
        }
        self.released.extend(pass.released);
        self.input_requests = pass.input_requests;
        self.peak_buffered_bytes = self.peak_buffered_bytes.max(pass.peak_buffered_bytes);
    }
}

/// Runs the update protocol over a [`PipelineGraph`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    options: UpdateOptions,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: UpdateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// The abort handle shared with running nodes.
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.options.abort
    }

    // ========================================================================
    // Public entry points
    // ========================================================================

    /// Make every output of `target` current over its requested region.
    pub fn update(&self, graph: &mut PipelineGraph, target: NodeId) -> NdflowResult<UpdateReport> {
        let start = Instant::now();
        let order = TopologyAnalyzer::new(graph).upstream_order(target)?;
        let pool = self.build_pool()?;
        let mut tracker = self.tracker(order.len());
        tracker.start();
        debug!("Updating {} over {} node(s)", target, order.len());

        let mut report = UpdateReport::default();
        let result = self.run_phases(graph, &order, target, &tracker, pool.as_ref(), &mut report);
        if let Err(error) = result {
            tracker.report_error(error.node_id(), error.to_string());
            return Err(error.into());
        }
        report.pieces = 1;
        report.duration = start.elapsed();
        tracker.complete();
        debug!(
            "Update of {} done: {} executed, {} up to date in {:?}",
            target,
            report.executed.len(),
            report.up_to_date.len(),
            report.duration
        );
        Ok(report)
    }

    /// Forget any request seeds on `target` and update its whole domain.
    pub fn update_largest_possible_region(
        &self,
        graph: &mut PipelineGraph,
        target: NodeId,
    ) -> NdflowResult<UpdateReport> {
        graph.clear_requested_region(target)?;
        self.update(graph, target)
    }

    /// Run only the information phase. Returns the nodes that recomputed.
    pub fn update_output_information(
        &self,
        graph: &mut PipelineGraph,
        target: NodeId,
    ) -> NdflowResult<Vec<NodeId>> {
        let order = TopologyAnalyzer::new(graph).upstream_order(target)?;
        let mut report = UpdateReport::default();
        self.information_pass(graph, &order, &mut report)?;
        Ok(report.information_updated)
    }

    /// Run the information and requested-region phases without executing.
    pub fn propagate_requested_region(
        &self,
        graph: &mut PipelineGraph,
        target: NodeId,
    ) -> NdflowResult<RequestPlan> {
        let order = TopologyAnalyzer::new(graph).upstream_order(target)?;
        let mut report = UpdateReport::default();
        self.information_pass(graph, &order, &mut report)?;
        Ok(self.request_pass(graph, &order, target)?)
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    fn run_phases(
        &self,
        graph: &mut PipelineGraph,
        order: &[NodeId],
        target: NodeId,
        tracker: &ProgressTracker,
        pool: Option<&rayon::ThreadPool>,
        report: &mut UpdateReport,
    ) -> ExecutionResult<()> {
        self.information_pass(graph, order, report)?;
        let plan = self.request_pass(graph, order, target)?;
        let pass = self.data_pass(graph, &plan, target, tracker, pool)?;
        report.absorb(pass);
        Ok(())
    }

    pub(crate) fn build_pool(&self) -> NdflowResult<Option<rayon::ThreadPool>> {
        if self.options.number_of_threads == 0 {
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.number_of_threads)
            .build()
            .map(Some)
            .map_err(|e| NdflowError::Other(format!("failed to build thread pool: {e}")))
    }

    pub(crate) fn tracker(&self, total_nodes: usize) -> ProgressTracker {
        ProgressTracker::new(total_nodes).with_callback(self.options.progress_callback.clone())
    }

    // ========================================================================
    // Phase 1: output information
    // ========================================================================

    pub(crate) fn information_pass(
        &self,
        graph: &mut PipelineGraph,
        order: &[NodeId],
        report: &mut UpdateReport,
    ) -> ExecutionResult<()> {
        for &id in order {
            let node = graph.get_node(id).map_err(|_| missing_node(id))?;
            let mut pipeline_time = node.modified_time;
            let mut inputs = Vec::with_capacity(node.metadata.inputs.len());

            for (slot, port) in node.metadata.inputs.iter().enumerate() {
                match graph.producer_of(id, slot) {
                    Some(endpoint) => {
                        let producer = graph
                            .get_node(endpoint.node_id)
                            .map_err(|_| missing_node(endpoint.node_id))?;
                        pipeline_time = pipeline_time.max(producer.pipeline_time);
                        if let Some(image) = producer.outputs.get(endpoint.slot) {
                            inputs.push(image.largest_possible_region().clone());
                        }
                    }
                    None if port.optional => {}
                    None => {
                        return Err(ExecutionError::MissingInput {
                            node_id: id,
                            port: port.name.clone(),
                        })
                    }
                }
            }

            let current = !node.information_time.is_never() && pipeline_time <= node.information_time;
            if current {
                trace!("Node {}: information current", id);
                graph.get_node_mut(id).map_err(|_| missing_node(id))?.pipeline_time = pipeline_time;
                continue;
            }

            let ctx = NodeContext::new(id, &node.metadata, &node.parameters);
            let regions = node.process.output_information(&inputs, &ctx)?;
            if regions.len() != node.outputs.len() {
                return Err(ExecutionError::MissingInformation {
                    node_id: id,
                    reason: format!(
                        "produced {} region(s) for {} output(s)",
                        regions.len(),
                        node.outputs.len()
                    ),
                });
            }
            debug!("Node {}: output information {:?}", id, regions);

            let stamp = graph.clock().tick();
            let node = graph.get_node_mut(id).map_err(|_| missing_node(id))?;
            for (output, region) in node.outputs.iter_mut().zip(regions) {
                output.set_largest_possible_region(region);
            }
            node.information_time = stamp;
            node.pipeline_time = pipeline_time;
            report.information_updated.push(id);
        }
        Ok(())
    }

    // ========================================================================
    // Phase 2: requested regions
    // ========================================================================

    pub(crate) fn request_pass(
        &self,
        graph: &mut PipelineGraph,
        order: &[NodeId],
        target: NodeId,
    ) -> ExecutionResult<RequestPlan> {
        let mut plan = RequestPlan {
            order: order.to_vec(),
            ..RequestPlan::default()
        };
        for &id in order {
            let node = graph.get_node(id).map_err(|_| missing_node(id))?;
            plan.output_requests.insert(id, vec![None; node.outputs.len()]);
        }

        // Seed the target.
        let node = graph.get_node(target).map_err(|_| missing_node(target))?;
        let mut seeds = Vec::with_capacity(node.outputs.len());
        for (slot, output) in node.outputs.iter().enumerate() {
            let largest = output.largest_possible_region();
            let seed = node
                .requested_seed(slot)
                .cloned()
                .unwrap_or_else(|| largest.clone());
            if !largest.contains_region(&seed) {
                return Err(ExecutionError::RegionUnavailable {
                    node_id: target,
                    requested: seed,
                    available: largest.clone(),
                });
            }
            seeds.push(Some(seed));
        }
        plan.output_requests.insert(target, seeds);

        for &id in order.iter().rev() {
            let node = graph.get_node(id).map_err(|_| missing_node(id))?;
            let ctx = NodeContext::new(id, &node.metadata, &node.parameters);

            // Let the node enlarge what was asked of each output.
            let mut requests = plan.output_requests.remove(&id).unwrap_or_default();
            for (slot, request) in requests.iter_mut().enumerate() {
                if let (Some(region), Some(output)) = (request.as_mut(), node.outputs.get(slot)) {
                    let largest = output.largest_possible_region();
                    let enlarged = node.process.enlarge_output_requested_region(region, largest, &ctx);
                    *region = region.bounding_union(&enlarged).crop(largest);
                }
            }
            let combined = requests
                .iter()
                .flatten()
                .fold(None, |acc: Option<Region>, r| match acc {
                    Some(acc) => Some(acc.bounding_union(r)),
                    None => Some(r.clone()),
                });

            // Map onto inputs and merge into the producers' requests.
            let mut input_requests = vec![None; node.metadata.inputs.len()];
            for (slot, input_request) in input_requests.iter_mut().enumerate() {
                let Some(endpoint) = graph.producer_of(id, slot) else {
                    continue;
                };
                let producer = graph
                    .get_node(endpoint.node_id)
                    .map_err(|_| missing_node(endpoint.node_id))?;
                let available = producer
                    .outputs
                    .get(endpoint.slot)
                    .map(|o| o.largest_possible_region().clone())
                    .unwrap_or_default();

                let needed =
                    node.process
                        .input_requested_region(slot, combined.as_ref(), &available, &ctx)?;
                let cropped = needed.crop(&available);
                if cropped != needed && !needed.is_empty() {
                    if !node.process.accepts_partial_input(slot) {
                        return Err(ExecutionError::RegionUnavailable {
                            node_id: endpoint.node_id,
                            requested: needed,
                            available,
                        });
                    }
                    warn!(
                        "Node {}: input '{}' request {} cropped to {}",
                        id, node.metadata.inputs[slot].name, needed, cropped
                    );
                    plan.cropped_inputs.push((id, slot));
                }
                trace!("Node {}: input {} needs {}", id, slot, cropped);

                if let Some(slots) = plan.output_requests.get_mut(&endpoint.node_id) {
                    if let Some(existing) = slots.get_mut(endpoint.slot) {
                        *existing = Some(match existing.take() {
                            Some(region) => region.bounding_union(&cropped),
                            None => cropped.clone(),
                        });
                    }
                }
                *input_request = Some(cropped);
            }

            let node = graph.get_node_mut(id).map_err(|_| missing_node(id))?;
            for (output, request) in node.outputs.iter_mut().zip(&requests) {
                let region = request
                    .clone()
                    .unwrap_or_else(|| Region::empty(output.dimension()));
                output.set_requested_region(region);
            }
            debug!("Node {}: output requests {:?}", id, requests);
            plan.output_requests.insert(id, requests);
            plan.input_requests.insert(id, input_requests);
        }
        Ok(plan)
    }

    // ========================================================================
    // Phases 3 and 4: staleness and execution
    // ========================================================================

    pub(crate) fn data_pass(
        &self,
        graph: &mut PipelineGraph,
        plan: &RequestPlan,
        target: NodeId,
        tracker: &ProgressTracker,
        pool: Option<&rayon::ThreadPool>,
    ) -> ExecutionResult<UpdateReport> {
        let mut pass = DataPass {
            graph,
            tracker,
            abort: &self.options.abort,
            pool,
            report: UpdateReport::default(),
            visited: HashSet::new(),
        };
        pass.update_node(target)?;

        let DataPass {
            graph,
            mut report,
            visited,
            ..
        } = pass;

        let nodes: &PipelineGraph = graph;
        report.peak_buffered_bytes = plan
            .order
            .iter()
            .filter_map(|id| nodes.get_node(*id).ok())
            .flat_map(|node| node.outputs.iter())
            .map(Image::buffered_bytes)
            .sum();

        // Consumers within this pass have all run; honor release flags.
        for &id in &plan.order {
            if id == target || !visited.contains(&id) {
                continue;
            }
            let Ok(node) = graph.get_node_mut(id) else {
                continue;
            };
            for (slot, output) in node.outputs.iter_mut().enumerate() {
                if output.release_data_flag() && !output.is_data_released() {
                    output.release_data();
                    debug!("Node {}: released output {}", id, slot);
                    report.released.push((id, slot));
                }
            }
        }

        report.input_requests = plan
            .order
            .iter()
            .filter_map(|id| plan.input_requests.get(id).map(|r| (*id, r.clone())))
            .collect();
        Ok(report)
    }
}

fn missing_node(id: NodeId) -> ExecutionError {
    ExecutionError::NodeExecution {
        node_id: id,
        error: "node is not part of the graph".to_string(),
    }
}

/// One demand-driven walk from the update target.
struct DataPass<'a> {
    graph: &'a mut PipelineGraph,
    tracker: &'a ProgressTracker,
    abort: &'a AbortHandle,
    pool: Option<&'a rayon::ThreadPool>,
    report: UpdateReport,
    visited: HashSet<NodeId>,
}

impl DataPass<'_> {
    fn update_node(&mut self, id: NodeId) -> ExecutionResult<()> {
        let reason = self.staleness(id)?;
        let first_visit = self.visited.insert(id);

        let Some(reason) = reason else {
            if first_visit {
                trace!("Node {}: up to date", id);
                self.tracker.node_up_to_date(id);
                self.report.up_to_date.push(id);
            }
            return Ok(());
        };

        let producers: Vec<NodeId> = {
            let node = self.graph.get_node(id).map_err(|_| missing_node(id))?;
            (0..node.metadata.inputs.len())
                .filter_map(|slot| self.graph.producer_of(id, slot).map(|e| e.node_id))
                .collect()
        };
        for producer in producers {
            self.update_node(producer)?;
        }
        self.execute(id, reason)
    }

    fn staleness(&self, id: NodeId) -> ExecutionResult<Option<StaleReason>> {
        let node = self.graph.get_node(id).map_err(|_| missing_node(id))?;
        let executed = node.execution_time;
        if executed.is_never() {
            return Ok(Some(StaleReason::NeverExecuted));
        }
        if node.modified_time > executed {
            return Ok(Some(StaleReason::ParametersModified));
        }
        for slot in 0..node.metadata.inputs.len() {
            let Some(endpoint) = self.graph.producer_of(id, slot) else {
                continue;
            };
            let producer = self
                .graph
                .get_node(endpoint.node_id)
                .map_err(|_| missing_node(endpoint.node_id))?;
            let data_time = producer
                .outputs
                .get(endpoint.slot)
                .map_or(TimeStamp::NEVER, Image::modified_time);
            if data_time > executed || producer.pipeline_time > executed {
                return Ok(Some(StaleReason::InputModified));
            }
        }
        for output in &node.outputs {
            if output.requested_region().is_empty() {
                continue;
            }
            if output.is_data_released() {
                return Ok(Some(StaleReason::DataReleased));
            }
            if !output.buffered_contains_requested() {
                return Ok(Some(StaleReason::RegionNotBuffered));
            }
        }
        Ok(None)
    }

    fn execute(&mut self, id: NodeId, reason: StaleReason) -> ExecutionResult<()> {
        if self.abort.is_aborted() {
            self.graph.get_node_mut(id).map_err(|_| missing_node(id))?.execution_time =
                TimeStamp::NEVER;
            warn!("Node {}: aborted before execution", id);
            self.tracker.aborted(id);
            return Err(ExecutionError::Aborted { node_id: id });
        }

        let start = Instant::now();
        let mut outputs = {
            let node = self.graph.get_node_mut(id).map_err(|_| missing_node(id))?;
            let full = node.process.buffers_largest_possible_region();
            for output in node.outputs.iter_mut() {
                let region = if full {
                    output.largest_possible_region().clone()
                } else {
                    output.requested_region().clone()
                };
                output.allocate(region);
            }
            std::mem::take(&mut node.outputs)
        };

        let result = {
            let graph: &PipelineGraph = &*self.graph;
            let node = graph.get_node(id).map_err(|_| missing_node(id))?;
            debug!("Node {} ({}): executing, {}", id, node.metadata.id, reason);
            self.tracker.node_started(id, node.display_name());

            let inputs: Vec<Option<&Image>> = (0..node.metadata.inputs.len())
                .map(|slot| {
                    graph.producer_of(id, slot).and_then(|endpoint| {
                        graph
                            .get_node(endpoint.node_id)
                            .ok()
                            .and_then(|producer| producer.outputs.get(endpoint.slot))
                    })
                })
                .collect();
            let node_ctx = NodeContext::new(id, &node.metadata, &node.parameters);
            let mut ctx =
                ExecutionContext::new(node_ctx, inputs, &mut outputs, self.abort, self.tracker);
            let process = &node.process;
            match self.pool {
                Some(pool) => pool.install(|| process.generate_data(&mut ctx)),
                None => process.generate_data(&mut ctx),
            }
        };

        let stamp_clock = self.graph.clock().clone();
        let node = self.graph.get_node_mut(id).map_err(|_| missing_node(id))?;
        node.outputs = outputs;
        match result {
            Ok(()) => {
                for output in node.outputs.iter_mut() {
                    output.modified();
                }
                node.execution_time = stamp_clock.tick();
                let elapsed = start.elapsed();
                trace!("Node {}: finished in {:?}", id, elapsed);
                self.tracker.node_completed(id, elapsed.as_millis() as u64);
                self.report.executed.push((id, reason));
                Ok(())
            }
            Err(error) => {
                node.execution_time = TimeStamp::NEVER;
                if matches!(error, ExecutionError::Aborted { .. }) {
                    warn!("Node {}: aborted", id);
                    self.tracker.aborted(id);
                }
                Err(error)
            }
        }
    }
}

/// Log line for a finished streamed update.
pub(crate) fn log_streamed(target: NodeId, report: &UpdateReport) {
    info!(
        "Streamed update of {} in {} piece(s): {} execution(s), peak {} bytes buffered, {:?}",
        target,
        report.pieces,
        report.executed.len(),
        report.peak_buffered_bytes,
        report.duration
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::Clock;
    use crate::filters::builtin::{MeanFilter, PassThrough, PatternSource};

    fn region(origin: &[i64], size: &[usize]) -> Region {
        Region::new(origin.to_vec(), size.to_vec()).unwrap()
    }

    fn line(graph: &mut PipelineGraph, length: i64) -> (NodeId, NodeId, NodeId) {
        let a = graph.add_node(Box::new(PatternSource));
        graph.set_parameter(a, "size", vec![length]).unwrap();
        let b = graph.add_node(Box::new(MeanFilter));
        graph.set_parameter(b, "radius", vec![2i64]).unwrap();
        let c = graph.add_node(Box::new(PassThrough));
        graph.connect(a, "output", b, "input").unwrap();
        graph.connect(b, "output", c, "input").unwrap();
        (a, b, c)
    }

    #[test]
    fn test_options_from_toml() {
        let options = UpdateOptions::from_toml_str("number_of_threads = 3\nstream_pieces = 4\n").unwrap();
        assert_eq!(options.number_of_threads, 3);
        assert_eq!(options.stream_pieces, Some(4));
        assert_eq!(options.memory_limit, DEFAULT_MEMORY_LIMIT);
        assert!(UpdateOptions::from_toml_str("number_of_threads = \"many\"").is_err());
    }

    #[test]
    fn test_information_pass_skips_current_nodes() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (a, b, c) = line(&mut graph, 100);
        let engine = ExecutionEngine::new();

        let first = engine.update_output_information(&mut graph, c).unwrap();
        assert_eq!(first, vec![a, b, c]);
        assert_eq!(
            graph.output(c, "output").unwrap().largest_possible_region(),
            &region(&[0], &[100])
        );

        let second = engine.update_output_information(&mut graph, c).unwrap();
        assert!(second.is_empty());

        graph.set_parameter(b, "radius", vec![1i64]).unwrap();
        let third = engine.update_output_information(&mut graph, c).unwrap();
        assert_eq!(third, vec![b, c]);
    }

    #[test]
    fn test_request_plan_is_minimal() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (a, b, c) = line(&mut graph, 100);
        graph.set_requested_region(c, "output", region(&[10], &[40])).unwrap();

        let plan = ExecutionEngine::new().propagate_requested_region(&mut graph, c).unwrap();
        assert_eq!(plan.order, vec![a, b, c]);
        assert_eq!(plan.input_request(c, 0), Some(&region(&[10], &[40])));
        assert_eq!(plan.input_request(b, 0), Some(&region(&[8], &[44])));
        assert_eq!(plan.output_request(a, 0), Some(&region(&[8], &[44])));
        assert!(plan.cropped_inputs.is_empty());
    }

    #[test]
    fn test_seed_outside_domain_is_rejected() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (_, _, c) = line(&mut graph, 100);
        graph.set_requested_region(c, "output", region(&[90], &[20])).unwrap();

        let error = ExecutionEngine::new().update(&mut graph, c).unwrap_err();
        assert!(matches!(
            error,
            NdflowError::Execution(ExecutionError::RegionUnavailable { node_id, .. }) if node_id == c
        ));
    }

    #[test]
    fn test_update_then_noop() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (a, b, c) = line(&mut graph, 32);
        let engine = ExecutionEngine::new();

        let first = engine.update(&mut graph, c).unwrap();
        assert_eq!(first.executed_nodes(), vec![a, b, c]);
        assert_eq!(first.stale_reason(a), Some(StaleReason::NeverExecuted));

        let second = engine.update(&mut graph, c).unwrap();
        assert!(second.executed.is_empty());
        assert_eq!(second.up_to_date, vec![c]);
    }

    #[test]
    fn test_missing_input_is_reported() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let lonely = graph.add_node(Box::new(PassThrough));
        let error = ExecutionEngine::new().update(&mut graph, lonely).unwrap_err();
        assert!(matches!(
            error,
            NdflowError::Execution(ExecutionError::MissingInput { .. })
        ));
    }

    #[test]
    fn test_threaded_update_matches_default() {
        let mut graph = PipelineGraph::with_clock(Clock::new());
        let (_, _, c) = line(&mut graph, 64);
        ExecutionEngine::new().update(&mut graph, c).unwrap();
        let expected = graph.output(c, "output").unwrap().as_slice().to_vec();

        let mut threaded = PipelineGraph::with_clock(Clock::new());
        let (_, _, c2) = line(&mut threaded, 64);
        ExecutionEngine::with_options(UpdateOptions::new().with_threads(2))
            .update(&mut threaded, c2)
            .unwrap();
        assert_eq!(threaded.output(c2, "output").unwrap().as_slice(), expected.as_slice());
    }
}
