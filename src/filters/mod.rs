//! Filter module.
//!
//! Contains the node registry and the built-in process objects.

pub mod builtin;
pub mod registry;

pub use registry::{FilterFactory, FilterRegistry};
