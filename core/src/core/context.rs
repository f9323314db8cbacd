// stepflow/src/core/context.rs

//! Handler and compensator type aliases. Both operate on a cloned `ContextData<TData>`.

use crate::core::context_data::ContextData;
use crate::core::control::{Compensation, PipelineControl};
use std::future::Future;
use std::pin::Pin;

/// A pipeline step handler.
///
/// A handler is an asynchronous function that takes ownership of a `ContextData<TData>`
/// clone and resolves to `Result<PipelineControl, Err>`.
///
/// Handlers are responsible for:
/// 1. Acquiring locks (`.read()` / `.write()`) on the `ContextData` to access or modify state.
/// 2. **Dropping lock guards BEFORE any `.await` suspension point.**
/// 3. Returning `PipelineControl::Continue` to proceed or `PipelineControl::Stop` to halt.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>>
    + Send
    + Sync,
>;

/// A compensation handler, run when a later step of the same run fails.
///
/// Its error is logged by the pipeline and never replaces the error of the failed step.
pub type Compensator<TData, Err> = Box<
  dyn Fn(ContextData<TData>, Compensation) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>>
    + Send
    + Sync,
>;
