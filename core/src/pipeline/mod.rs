// stepflow/src/pipeline/mod.rs

//! Defines the `Pipeline` struct, its construction, hooks, and execution logic.

pub mod definition;
pub mod execution;
pub mod hooks;

pub use definition::Pipeline;
