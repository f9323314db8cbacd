// stepflow/src/pipeline/execution.rs

//! Contains `Pipeline::run()`, which executes the steps in order and unwinds
//! completed steps through their compensations when one fails.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::{Compensation, PipelineControl, PipelineResult};
use crate::error::StepflowError;
use crate::pipeline::definition::Pipeline;
use std::collections::HashMap;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<StepflowError> + Send + Sync + 'static,
{
  /// Executes the pipeline against the shared context `ctx_data`.
  ///
  /// On the first handler error, the compensations of every step that completed in this run
  /// are executed in reverse order, and then the original error is returned. A step that was
  /// skipped, or the failing step itself, is never compensated.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      pipeline_context_data_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline execution starting.");
    let mut completed: Vec<&str> = Vec::with_capacity(self.steps.len());

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = span!(
        Level::INFO,
        "pipeline_step_execution",
        step_name = step_name,
        step_index = step_idx,
        optional = step_def.optional
      );

      if let Some(skip_cond_fn) = &step_def.skip_if {
        if skip_cond_fn(ctx_data.clone()) {
          event!(parent: &step_span, Level::INFO, "Step skipped due to 'skip_if' condition.");
          continue;
        }
      }

      let has_handlers = [&self.before, &self.on, &self.after]
        .iter()
        .any(|phase| phase.get(step_name).is_some_and(|v| !v.is_empty()));

      if !has_handlers {
        if step_def.optional {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "Non-optional step has no handlers.");
        let err = Err::from(StepflowError::HandlerMissing {
          step_name: step_def.name.clone(),
        });
        self.compensate(&completed, step_name, &err, &ctx_data).await;
        return Err(err);
      }

      let phases: [(&str, &HashMap<String, Vec<Handler<TData, Err>>>); 3] =
        [("before", &self.before), ("on", &self.on), ("after", &self.after)];

      for (phase_name, phase) in phases {
        let Some(handlers) = phase.get(step_name) else {
          continue;
        };
        for (handler_idx, handler_fn) in handlers.iter().enumerate() {
          let handler_span = span!(
            parent: &step_span,
            Level::DEBUG,
            "step_handler",
            phase = phase_name,
            handler_index = handler_idx
          );
          match handler_fn(ctx_data.clone()).instrument(handler_span).await {
            Ok(PipelineControl::Continue) => {}
            Ok(PipelineControl::Stop) => {
              event!(parent: &step_span, Level::INFO, phase = phase_name, "Pipeline stopped by a handler.");
              return Ok(PipelineResult::Stopped);
            }
            Err(e) => {
              event!(parent: &step_span, Level::ERROR, phase = phase_name, error = %e, "Handler failed.");
              self.compensate(&completed, step_name, &e, &ctx_data).await;
              return Err(e);
            }
          }
        }
      }

      event!(parent: &step_span, Level::DEBUG, "Step processing finished successfully.");
      completed.push(step_name);
    }

    event!(Level::DEBUG, "Pipeline execution completed successfully.");
    Ok(PipelineResult::Completed)
  }

  /// Runs the compensations of `completed` in reverse order. Failures are logged only.
  async fn compensate(&self, completed: &[&str], failed_step: &str, cause: &Err, ctx_data: &ContextData<TData>) {
    let error_message = cause.to_string();
    for step_name in completed.iter().rev() {
      let Some(compensator) = self.compensations.get(*step_name) else {
        continue;
      };
      let compensation = Compensation {
        failed_step: failed_step.to_string(),
        error_message: error_message.clone(),
      };
      let comp_span = span!(Level::INFO, "step_compensation", step_name = *step_name, failed_step);
      match compensator(ctx_data.clone(), compensation).instrument(comp_span).await {
        Ok(()) => event!(Level::INFO, step_name = *step_name, failed_step, "Step compensated."),
        Err(e) => event!(
          Level::ERROR,
          step_name = *step_name,
          failed_step,
          error = %e,
          "Compensation failed; continuing unwind."
        ),
      }
    }
  }
}
