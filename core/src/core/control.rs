// stepflow/src/core/control.rs

//! Signals for controlling pipeline flow, the outcome of a run, and the
//! information handed to compensation handlers.

/// Signal from a handler indicating whether the pipeline should continue or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  /// Continue processing the current step and subsequent steps.
  Continue,
  /// Stop processing immediately. No further handlers run, and nothing is compensated:
  /// a stop is a successful early exit, not a failure.
  Stop,
}

/// Outcome of a full pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  /// The pipeline executed all its non-skipped steps to completion.
  Completed,
  /// The pipeline was explicitly stopped by a handler returning `PipelineControl::Stop`.
  Stopped,
}

/// Passed to a compensation handler when a later step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compensation {
  /// Name of the step whose failure triggered the unwind.
  pub failed_step: String,
  /// Display form of the error returned by the failed step.
  pub error_message: String,
}
