//! Pipeline execution.
//!
//! The update protocol lives in [`engine`]; [`streaming`] runs it piece by
//! piece; [`progress`] carries events and the cooperative abort flag.

pub mod engine;
pub mod progress;
pub mod streaming;

pub use engine::{ExecutionEngine, RequestPlan, StaleReason, UpdateOptions, UpdateReport};
pub use progress::{AbortHandle, ProgressCallback, ProgressTracker, ProgressUpdate};
