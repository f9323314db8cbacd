// src/lib.rs

//! Stepflow: an async step pipeline with per-step compensation.
//!
//! A `Pipeline<TData, Err>` is an ordered list of named steps run against a shared
//! `ContextData<TData>`. It supports:
//!  - Named steps with before/on/after hooks.
//!  - Asynchronous handlers for I/O-bound operations.
//!  - Early stopping of a run via `PipelineControl::Stop`.
//!  - Per-step skip conditions and optional steps.
//!  - Compensation handlers: when a step fails, the compensations of the steps that already
//!    completed run in reverse order before the error is returned (saga semantics).
//!  - A type-keyed registry for managing and running different pipelines.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

// --- Re-exports for the Public API ---

pub use crate::core::context::{Compensator, Handler};
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{Compensation, PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::error::{StepflowError, StepflowResult};

pub use crate::registry::Registry;

/*
    Core Workflow:
    1. Define a context struct `MyCtx` for your process.
    2. Create a `Pipeline<MyCtx, MyErr>` with its step definitions.
    3. Register async handlers with `.on_root()`, `.before_root()`, `.after_root()`.
    4. For steps with side effects that must be undone on a later failure, register
       `.compensate_root()`; it receives the context and a `Compensation` naming the failed step.
    5. Either run the pipeline directly (`pipeline.run(ctx).await`) or register it with a
       `Registry<MyErr>` and call `registry.run(ctx).await`.
*/
