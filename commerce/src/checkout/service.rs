// commerce/src/checkout/service.rs

use std::sync::Arc;
use stepflow::{ContextData, PipelineResult, Registry};
use tracing::{event, instrument, Level};

use super::{CheckoutSessionDescriptor, ConfirmationOutcome, StartCheckout};
use crate::context::RequestContext;
use crate::errors::{CommerceError, Result};
use crate::models::CheckoutStatus;
use crate::pipelines::contexts::{ConfirmCtxData, CreateSessionCtxData};
use crate::pipelines::{self, missing};
use crate::state::CommerceDeps;

/// Entry point for checkout. Each operation runs the pipeline registered for its context.
#[derive(Clone)]
pub struct CheckoutService {
  deps: CommerceDeps,
  registry: Arc<Registry<CommerceError>>,
}

impl CheckoutService {
  pub fn new(deps: CommerceDeps) -> Self {
    let registry = Registry::<CommerceError>::new();
    pipelines::register_all_pipelines(&registry);
    Self {
      deps,
      registry: Arc::new(registry),
    }
  }

  /// Reserves stock, opens a payment session and records it on the cart.
  ///
  /// If the session cannot be opened or recorded, the reservation is released before the
  /// error is returned.
  #[instrument(
    name = "CheckoutService::create_checkout_session",
    skip_all,
    fields(user_id = %request.user_id, psp = %request.psp),
    err(Display)
  )]
  pub async fn create_checkout_session(
    &self,
    ctx: &RequestContext,
    request: StartCheckout,
  ) -> Result<CheckoutSessionDescriptor> {
    let ctx_data = ContextData::new(CreateSessionCtxData::new(self.deps.clone(), ctx.clone(), request));
    self.registry.run(ctx_data.clone()).await?;

    let descriptor = ctx_data
      .with_read(|d| d.descriptor.clone())
      .ok_or_else(|| missing("create_checkout_session", "session descriptor"))?;
    event!(
      Level::INFO,
      session_id = %descriptor.session_id,
      reservation_id = ?descriptor.reservation_id,
      "Checkout session created."
    );
    Ok(descriptor)
  }

  /// Settles a checkout session after the client returns from the provider.
  ///
  /// Safe to repeat: once the session is settled or failed, the stored outcome is returned
  /// without asking the gateway again.
  #[instrument(
    name = "CheckoutService::confirm_client_completion",
    skip(self, ctx),
    err(Display)
  )]
  pub async fn confirm_client_completion(
    &self,
    ctx: &RequestContext,
    user_id: &str,
    session_id: &str,
    payment_intent_id: Option<&str>,
    order_id: Option<&str>,
  ) -> Result<ConfirmationOutcome> {
    let ctx_data = ContextData::new(ConfirmCtxData::new(
      self.deps.clone(),
      ctx.clone(),
      user_id,
      session_id,
      payment_intent_id,
      order_id,
    ));
    let run = self.registry.run(ctx_data.clone()).await?;

    let outcome = ctx_data.with_read(|d| {
      d.checkout.as_ref().map(|c| ConfirmationOutcome {
        status: c.status.unwrap_or(CheckoutStatus::Pending),
        session_id: d.session_id.clone(),
        order_id: c.order_id.clone(),
        workflow_id: c.workflow_id.clone(),
      })
    });
    let outcome = outcome.ok_or_else(|| missing("confirm_client_completion", "checkout metadata"))?;
    event!(
      Level::INFO,
      status = %outcome.status,
      answered_from_storage = run == PipelineResult::Stopped,
      "Checkout confirmation finished."
    );
    Ok(outcome)
  }
}
