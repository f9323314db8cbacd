// commerce/src/pipelines/mod.rs

//! Step pipelines behind the checkout service.

use stepflow::Registry;

use crate::errors::CommerceError;

pub mod checkout_pipeline;
pub mod confirm_pipeline;
pub mod contexts;

/// Registers every checkout pipeline with `registry`, keyed by its context type.
///
/// Called once when the checkout service is built.
pub fn register_all_pipelines(registry: &Registry<CommerceError>) {
  registry.register_pipeline(checkout_pipeline::build_checkout_session_pipeline());
  registry.register_pipeline(confirm_pipeline::build_confirm_pipeline());
  tracing::debug!("Checkout pipelines registered.");
}

/// Error for a step that found its input missing from the context.
pub(crate) fn missing(step_name: &str, what: &str) -> CommerceError {
  CommerceError::from(stepflow::StepflowError::ConfigurationError {
    step_name: step_name.to_string(),
    message: format!("{} was not set by an earlier step", what),
  })
}
