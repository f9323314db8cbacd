// commerce/src/pipelines/confirm_pipeline.rs

//! Client-side completion of a checkout session.
//!
//! A session already settled, or already failed, is answered from the stored metadata
//! without contacting the gateway. Otherwise the payment is looked up once, the outcome is
//! applied, the finalization workflow is dispatched at most once, and the metadata is
//! written back under the version read at the start.

use std::sync::Arc;
use stepflow::{ContextData, Pipeline, PipelineControl, SkipCondition};
use tracing::{event, info, warn, Level};

use super::contexts::ConfirmCtxData;
use super::missing;
use crate::checkout::RELEASE_PAYMENT_FAILED;
use crate::context::RequestContext;
use crate::errors::{CommerceError, Result};
use crate::idempotency;
use crate::models::{Cart, CheckoutMetadata, CheckoutStatus};
use crate::services::{CheckoutWorkflowPayload, PaymentStatus};
use crate::state::CommerceDeps;

pub const LOAD_CHECKOUT: &str = "load_checkout";
pub const SETTLE_IF_RESOLVED: &str = "settle_if_resolved";
pub const LOOKUP_PAYMENT: &str = "lookup_payment";
pub const APPLY_PAYMENT_OUTCOME: &str = "apply_payment_outcome";
pub const DISPATCH_WORKFLOW: &str = "dispatch_workflow";
pub const PERSIST_CHECKOUT: &str = "persist_checkout";

/// Writes `checkout` onto `cart` and stores it, guarded by the cart's version as read.
async fn write_checkout(
  deps: &CommerceDeps,
  request_ctx: &RequestContext,
  cart: &Cart,
  checkout: &CheckoutMetadata,
) -> Result<Cart> {
  let mut updated = cart.clone();
  checkout.store_into(&mut updated)?;
  request_ctx
    .run(
      "cart_store.upsert_cart",
      deps.config.collaborator_timeout,
      deps.carts.upsert_cart(updated, Some(cart.updated_at)),
    )
    .await
}

pub fn build_confirm_pipeline() -> Pipeline<ConfirmCtxData, CommerceError> {
  let nothing_to_dispatch: SkipCondition<ConfirmCtxData> = Arc::new(|ctx_data: ContextData<ConfirmCtxData>| {
    ctx_data.with_read(|d| {
      d.checkout
        .as_ref()
        .map_or(true, |c| c.status != Some(CheckoutStatus::PendingCapture) || c.workflow_id.is_some())
    })
  });

  let mut p = Pipeline::<ConfirmCtxData, CommerceError>::new(&[
    (LOAD_CHECKOUT, false, None),
    (SETTLE_IF_RESOLVED, false, None),
    (LOOKUP_PAYMENT, false, None),
    (APPLY_PAYMENT_OUTCOME, false, None),
    (DISPATCH_WORKFLOW, false, Some(nothing_to_dispatch)),
    (PERSIST_CHECKOUT, false, None),
  ]);

  // Step 1: Cart and checkout metadata, checked against the request
  p.on_root(LOAD_CHECKOUT, |ctx_data: ContextData<ConfirmCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, user_id, session_id, intent_id) = ctx_data.with_read(|d| {
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          d.user_id.clone(),
          d.session_id.clone(),
          d.payment_intent_id.clone(),
        )
      });
      if user_id.is_empty() || session_id.is_empty() {
        return Err(CommerceError::InvalidInput("user id and session id are required".to_string()));
      }

      let cart = request_ctx
        .run("cart_store.get_cart", deps.config.collaborator_timeout, deps.carts.get_cart(&user_id))
        .await?;
      let checkout = CheckoutMetadata::from_cart(&cart)?
        .ok_or_else(|| CommerceError::NotFound(format!("no checkout session on cart {}", cart.id)))?;

      if checkout.session_id.as_deref() != Some(session_id.as_str()) {
        return Err(CommerceError::InvalidInput(format!(
          "session {} does not belong to cart {}",
          session_id, cart.id
        )));
      }
      if let (Some(supplied), Some(stored)) = (intent_id.as_deref(), checkout.intent_id.as_deref()) {
        if supplied != stored {
          return Err(CommerceError::InvalidInput(format!(
            "payment intent {} does not match session {}",
            supplied, session_id
          )));
        }
      }

      ctx_data.with_write(|d| {
        d.cart = Some(cart);
        d.checkout = Some(checkout);
      });
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  // Step 2: Answer settled and failed sessions from storage
  p.on_root(SETTLE_IF_RESOLVED, |ctx_data: ContextData<ConfirmCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, cart, checkout, order_id) = ctx_data.with_read(|d| {
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          d.cart.clone(),
          d.checkout.clone(),
          d.order_id.clone(),
        )
      });
      let cart = cart.ok_or_else(|| missing(SETTLE_IF_RESOLVED, "cart"))?;
      let mut checkout = checkout.ok_or_else(|| missing(SETTLE_IF_RESOLVED, "checkout metadata"))?;
      let status = checkout.status.unwrap_or(CheckoutStatus::Pending);

      if status == CheckoutStatus::Failed {
        event!(Level::INFO, session_id = ?checkout.session_id, "Session already failed; not contacting the gateway.");
        return Ok(PipelineControl::Stop);
      }
      if !status.is_settled() {
        return Ok(PipelineControl::Continue);
      }

      // Settled: the only write allowed is filling an empty order id slot.
      let slot_empty = checkout.order_id.is_none();
      if let Some(order_id) = order_id.filter(|_| slot_empty) {
        checkout.order_id = Some(order_id);
        checkout.updated_at = Some(deps.clock.now());
        write_checkout(&deps, &request_ctx, &cart, &checkout).await?;
        info!(order_id = ?checkout.order_id, "Order id recorded on settled checkout.");
        ctx_data.with_write(|d| d.checkout = Some(checkout));
      }
      Ok::<_, CommerceError>(PipelineControl::Stop)
    })
  });

  // Step 3: Ask the gateway once
  p.on_root(LOOKUP_PAYMENT, |ctx_data: ContextData<ConfirmCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, supplied, stored) = ctx_data.with_read(|d| {
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          d.payment_intent_id.clone(),
          d.checkout.as_ref().and_then(|c| c.intent_id.clone()),
        )
      });
      let intent_id = stored
        .or(supplied)
        .ok_or_else(|| CommerceError::InvalidInput("no payment intent known for this session".to_string()))?;

      let status = request_ctx
        .run(
          "payment_gateway.lookup_payment",
          deps.config.collaborator_timeout,
          deps.payments.lookup_payment(&intent_id),
        )
        .await?;

      event!(Level::INFO, %intent_id, ?status, "Payment status looked up.");
      ctx_data.with_write(|d| {
        d.payment_status = Some(status);
        if let Some(checkout) = d.checkout.as_mut() {
          checkout.intent_id.get_or_insert(intent_id);
        }
      });
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  // Step 4: Apply the gateway's answer to the checkout
  p.on_root(APPLY_PAYMENT_OUTCOME, |ctx_data: ContextData<ConfirmCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, checkout, status, order_id) = ctx_data.with_read(|d| {
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          d.checkout.clone(),
          d.payment_status,
          d.order_id.clone(),
        )
      });
      let mut checkout = checkout.ok_or_else(|| missing(APPLY_PAYMENT_OUTCOME, "checkout metadata"))?;
      let status = status.ok_or_else(|| missing(APPLY_PAYMENT_OUTCOME, "payment status"))?;

      let mut failure = None;
      match status {
        PaymentStatus::Failed | PaymentStatus::Refunded => {
          checkout.status = Some(CheckoutStatus::Failed);
          if let Some(reservation_id) = checkout.reservation_id.clone() {
            // Runs even when the request has already been cancelled or timed out.
            let released = request_ctx
              .detached()
              .run(
                "inventory.release_reservation",
                deps.config.collaborator_timeout,
                deps.inventory.release_reservation(&reservation_id, RELEASE_PAYMENT_FAILED),
              )
              .await;
            if let Err(e) = released {
              warn!(%reservation_id, error = %e, "Reservation release after failed payment failed; TTL will reclaim it.");
            }
          }
          failure = Some(format!(
            "payment for session {} is {:?}",
            checkout.session_id.as_deref().unwrap_or_default(),
            status
          ));
        }
        PaymentStatus::Pending | PaymentStatus::Succeeded => {
          checkout.status = Some(CheckoutStatus::PendingCapture);
          if checkout.order_id.is_none() {
            checkout.order_id = order_id;
          }
        }
        other => {
          return Err(CommerceError::Unavailable(format!(
            "payment is {:?}; confirmation can be retried later",
            other
          )));
        }
      }
      checkout.updated_at = Some(deps.clock.now());

      ctx_data.with_write(|d| {
        d.checkout = Some(checkout);
        d.payment_failure = failure;
      });
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  // Step 5: Start finalization once per session
  p.on_root(DISPATCH_WORKFLOW, |ctx_data: ContextData<ConfirmCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, cart, checkout, user_id, session_id) = ctx_data.with_read(|d| {
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          d.cart.clone(),
          d.checkout.clone(),
          d.user_id.clone(),
          d.session_id.clone(),
        )
      });
      let cart = cart.ok_or_else(|| missing(DISPATCH_WORKFLOW, "cart"))?;
      let checkout = checkout.ok_or_else(|| missing(DISPATCH_WORKFLOW, "checkout metadata"))?;

      let payload = CheckoutWorkflowPayload {
        user_id,
        cart_id: cart.id.clone(),
        session_id: session_id.clone(),
        provider: checkout.provider.clone(),
        intent_id: checkout.intent_id.clone(),
        reservation_id: checkout.reservation_id.clone(),
        order_id: checkout.order_id.clone(),
        idempotency_key: idempotency::dispatch_key(&cart.id, &session_id),
      };
      let workflow_id = request_ctx
        .run(
          "workflow.dispatch_checkout_workflow",
          deps.config.collaborator_timeout,
          deps.workflows.dispatch_checkout_workflow(payload),
        )
        .await?;

      info!(%workflow_id, %session_id, "Finalization workflow dispatched.");
      ctx_data.with_write(|d| {
        if let Some(checkout) = d.checkout.as_mut() {
          checkout.workflow_id = Some(workflow_id);
        }
      });
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  // Step 6: Persist, then report a failed payment
  p.on_root(PERSIST_CHECKOUT, |ctx_data: ContextData<ConfirmCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, cart, checkout) =
        ctx_data.with_read(|d| (d.deps.clone(), d.request_ctx.clone(), d.cart.clone(), d.checkout.clone()));
      let cart = cart.ok_or_else(|| missing(PERSIST_CHECKOUT, "cart"))?;
      let checkout = checkout.ok_or_else(|| missing(PERSIST_CHECKOUT, "checkout metadata"))?;

      let saved = write_checkout(&deps, &request_ctx, &cart, &checkout).await?;
      ctx_data.with_write(|d| d.cart = Some(saved));
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.after_root(PERSIST_CHECKOUT, |ctx_data: ContextData<ConfirmCtxData>| {
    Box::pin(async move {
      match ctx_data.with_read(|d| d.payment_failure.clone()) {
        Some(failure) => Err(CommerceError::PaymentFailed(failure)),
        None => Ok(PipelineControl::Continue),
      }
    })
  });

  p
}
