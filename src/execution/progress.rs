//! Progress reporting and cooperative abort for updates.

use crate::core::error::NodeId;
use crate::core::region::Region;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// An update pass has started over the upstream closure of its target.
    Started { total_nodes: usize },
    /// A stale node has started generating data.
    NodeStarted {
        node_id: NodeId,
        node_name: String,
        index: usize,
        total: usize,
    },
    /// Fraction of a node's own work, as reported by the node.
    NodeProgress { node_id: NodeId, fraction: f32 },
    /// A node has finished generating data.
    NodeCompleted {
        node_id: NodeId,
        duration_ms: u64,
        index: usize,
        total: usize,
    },
    /// A node's output was current and reused.
    NodeUpToDate { node_id: NodeId },
    /// A streamed update moved on to another piece.
    PieceStarted {
        index: usize,
        total: usize,
        region: Region,
    },
    /// The update has completed.
    Completed {
        total_duration_ms: u64,
        nodes_executed: usize,
        nodes_up_to_date: usize,
    },
    /// The update was aborted while the named node was running.
    Aborted { node_id: NodeId },
    /// An error unwound the update.
    Error {
        node_id: Option<NodeId>,
        message: String,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Shared cooperative abort flag.
///
/// Nodes poll it between chunks of work. Clones share the flag, so a handle
/// kept by the caller can stop an update running on another thread.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that running work stops at the next poll.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clear the flag so a later update can run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Counts executed and reused nodes of one update and forwards events.
pub struct ProgressTracker {
    total_nodes: usize,
    executed_nodes: AtomicU64,
    up_to_date_nodes: AtomicU64,
    start_time: Instant,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(total_nodes: usize) -> Self {
        Self {
            total_nodes,
            executed_nodes: AtomicU64::new(0),
            up_to_date_nodes: AtomicU64::new(0),
            start_time: Instant::now(),
            callback: None,
        }
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn start(&mut self) {
        self.start_time = Instant::now();
        self.send_update(ProgressUpdate::Started {
            total_nodes: self.total_nodes,
        });
    }

    pub fn node_started(&self, node_id: NodeId, node_name: String) {
        self.send_update(ProgressUpdate::NodeStarted {
            node_id,
            node_name,
            index: self.executed_nodes.load(Ordering::Relaxed) as usize,
            total: self.total_nodes,
        });
    }

    pub fn node_progress(&self, node_id: NodeId, fraction: f32) {
        self.send_update(ProgressUpdate::NodeProgress {
            node_id,
            fraction: fraction.clamp(0.0, 1.0),
        });
    }

    pub fn node_completed(&self, node_id: NodeId, duration_ms: u64) {
        let index = self.executed_nodes.fetch_add(1, Ordering::Relaxed) as usize + 1;
        self.send_update(ProgressUpdate::NodeCompleted {
            node_id,
            duration_ms,
            index,
            total: self.total_nodes,
        });
    }

    pub fn node_up_to_date(&self, node_id: NodeId) {
        self.up_to_date_nodes.fetch_add(1, Ordering::Relaxed);
        self.send_update(ProgressUpdate::NodeUpToDate { node_id });
    }

    pub fn piece_started(&self, index: usize, total: usize, region: Region) {
        self.send_update(ProgressUpdate::PieceStarted {
            index,
            total,
            region,
        });
    }

    pub fn aborted(&self, node_id: NodeId) {
        self.send_update(ProgressUpdate::Aborted { node_id });
    }

    pub fn report_error(&self, node_id: Option<NodeId>, message: String) {
        self.send_update(ProgressUpdate::Error { node_id, message });
    }

    pub fn complete(&self) {
        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: self.start_time.elapsed().as_millis() as u64,
            nodes_executed: self.executed_nodes.load(Ordering::Relaxed) as usize,
            nodes_up_to_date: self.up_to_date_nodes.load(Ordering::Relaxed) as usize,
        });
    }

    /// Share of the closure that has been executed or found current.
    pub fn progress_percent(&self) -> f32 {
        if self.total_nodes == 0 {
            return 100.0;
        }
        let done = self.executed_nodes.load(Ordering::Relaxed)
            + self.up_to_date_nodes.load(Ordering::Relaxed);
        (done as f32 / self.total_nodes as f32 * 100.0).min(100.0)
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_progress_calculation() {
        let tracker = ProgressTracker::new(4);
        assert_eq!(tracker.progress_percent(), 0.0);

        tracker.node_completed(NodeId::new(), 1);
        tracker.node_up_to_date(NodeId::new());
        assert_eq!(tracker.progress_percent(), 50.0);
    }

    #[test]
    fn test_abort_handle_is_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_aborted());

        handle.abort();
        assert!(clone.is_aborted());

        clone.reset();
        assert!(!handle.is_aborted());
    }

    #[test]
    fn test_callback_invoked() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let node_id = NodeId::new();

        let callback: ProgressCallback = Arc::new(move |_| {
            call_count_clone.fetch_add(1, Ordering::Relaxed);
        });
        let mut tracker = ProgressTracker::new(5).with_callback(Some(callback));

        tracker.start();
        tracker.node_started(node_id, "Test".to_string());
        tracker.node_completed(node_id, 100);
        tracker.complete();

        assert_eq!(call_count.load(Ordering::Relaxed), 4);
    }
}
