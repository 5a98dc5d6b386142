//! Streamed updates.
//!
//! A streamed update satisfies a large request piece by piece: output
//! information is computed once, then requested-region propagation,
//! staleness and execution run for each piece the splitter produces. Peak
//! memory is bounded by the largest piece (plus whatever upstream support it
//! needs) instead of the whole region.

use crate::core::error::{ExecutionError, GraphError, NdflowResult, NodeId};
use crate::core::image::Image;
use crate::core::region::Region;
use crate::core::splitter::SplitPolicy;
use crate::execution::engine::{log_streamed, ExecutionEngine, UpdateReport};
use crate::execution::progress::ProgressTracker;
use crate::graph::structure::PipelineGraph;
use crate::graph::topology::TopologyAnalyzer;
use log::debug;
use std::time::Instant;

impl ExecutionEngine {
    /// Update `target`'s output `port` piece by piece with the configured
    /// splitter and assemble the pieces into one image.
    pub fn update_streamed(
        &self,
        graph: &mut PipelineGraph,
        target: NodeId,
        port: &str,
    ) -> NdflowResult<(Image, UpdateReport)> {
        let splitter = self.options().splitter();
        let mut assembled: Option<Image> = None;
        let report = self.update_streamed_with(graph, target, port, &splitter, |whole, piece, image| {
            if assembled.is_none() {
                let mut out = Image::filled(whole.clone(), 0.0)?;
                out.set_largest_possible_region(image.largest_possible_region().clone());
                assembled = Some(out);
            }
            if let Some(out) = assembled.as_mut() {
                out.copy_from(image, piece, piece.origin())?;
            }
            Ok(())
        })?;

        Ok((assembled.unwrap_or_default(), report))
    }

    /// Update `target`'s output `port` once per piece of `splitter`, handing
    /// every finished piece to `consumer`.
    ///
    /// The consumer receives the whole region being streamed, the piece just
    /// finished and the output image, whose buffer covers at least the piece.
    /// The caller's request seed on the port (if any) is restored afterwards.
    pub fn update_streamed_with<F>(
        &self,
        graph: &mut PipelineGraph,
        target: NodeId,
        port: &str,
        splitter: &dyn SplitPolicy,
        mut consumer: F,
    ) -> NdflowResult<UpdateReport>
    where
        F: FnMut(&Region, &Region, &Image) -> NdflowResult<()>,
    {
        let start = Instant::now();
        let slot = graph
            .get_node(target)?
            .metadata()
            .output_index(port)
            .ok_or_else(|| GraphError::PortNotFound {
                node_id: target,
                port: port.to_string(),
            })?;
        let order = TopologyAnalyzer::new(graph).upstream_order(target)?;
        let pool = self.build_pool()?;
        let mut tracker = self.tracker(order.len());
        tracker.start();

        let mut report = UpdateReport::default();
        if let Err(error) = self.information_pass(graph, &order, &mut report) {
            tracker.report_error(error.node_id(), error.to_string());
            return Err(error.into());
        }

        let node = graph.get_node(target)?;
        let original_seed = node.requested_seed(slot).cloned();
        let largest = node.outputs()[slot].largest_possible_region().clone();
        let whole = original_seed.clone().unwrap_or_else(|| largest.clone());
        if !largest.contains_region(&whole) {
            let error = ExecutionError::RegionUnavailable {
                node_id: target,
                requested: whole,
                available: largest,
            };
            tracker.report_error(Some(target), error.to_string());
            return Err(error.into());
        }

        let pieces = splitter.split(&whole);
        debug!("Streaming {} of node {} in {} piece(s)", whole, target, pieces.len());

        let result = self.stream_pieces(
            graph,
            &order,
            target,
            port,
            &whole,
            &pieces,
            &tracker,
            pool.as_ref(),
            &mut report,
            &mut consumer,
        );

        match original_seed {
            Some(seed) => graph.set_requested_region(target, port, seed)?,
            None => graph.clear_requested_region(target)?,
        }
        result?;

        report.pieces = pieces.len();
        report.duration = start.elapsed();
        tracker.complete();
        log_streamed(target, &report);
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn stream_pieces<F>(
        &self,
        graph: &mut PipelineGraph,
        order: &[NodeId],
        target: NodeId,
        port: &str,
        whole: &Region,
        pieces: &[Region],
        tracker: &ProgressTracker,
        pool: Option<&rayon::ThreadPool>,
        report: &mut UpdateReport,
        consumer: &mut F,
    ) -> NdflowResult<()>
    where
        F: FnMut(&Region, &Region, &Image) -> NdflowResult<()>,
    {
        for (index, piece) in pieces.iter().enumerate() {
            tracker.piece_started(index, pieces.len(), piece.clone());
            graph.set_requested_region(target, port, piece.clone())?;

            let pass = self
                .request_pass(graph, order, target)
                .and_then(|plan| self.data_pass(graph, &plan, target, tracker, pool));
            let pass = match pass {
                Ok(pass) => pass,
                Err(error) => {
                    tracker.report_error(error.node_id(), error.to_string());
                    return Err(error.into());
                }
            };
            report.absorb(pass);

            let image = graph.output(target, port)?;
            consumer(whole, piece, image)?;
        }
        Ok(())
    }
}
