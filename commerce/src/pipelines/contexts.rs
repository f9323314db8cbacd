// commerce/src/pipelines/contexts.rs

//! Underlying data of the checkout pipelines. Handlers receive these wrapped in
//! `stepflow::ContextData`.

use crate::checkout::{CheckoutSessionDescriptor, StartCheckout};
use crate::context::RequestContext;
use crate::models::{Cart, CheckoutMetadata, Totals};
use crate::services::{PaymentSession, PaymentStatus, Reservation};
use crate::state::CommerceDeps;

/// Checkout session creation.
#[derive(Clone)]
pub struct CreateSessionCtxData {
  pub deps: CommerceDeps,
  pub request_ctx: RequestContext,
  pub request: StartCheckout,

  /// The cart exactly as read; the metadata write is guarded by its version.
  pub stored_cart: Option<Cart>,
  pub cart: Option<Cart>,
  pub totals: Option<Totals>,
  pub idempotency_key: Option<String>,
  pub reservation: Option<Reservation>,
  pub session: Option<PaymentSession>,
  pub descriptor: Option<CheckoutSessionDescriptor>,
}

impl CreateSessionCtxData {
  pub fn new(deps: CommerceDeps, request_ctx: RequestContext, request: StartCheckout) -> Self {
    Self {
      deps,
      request_ctx,
      request,
      stored_cart: None,
      cart: None,
      totals: None,
      idempotency_key: None,
      reservation: None,
      session: None,
      descriptor: None,
    }
  }
}

/// Client-side completion of a checkout session.
#[derive(Clone)]
pub struct ConfirmCtxData {
  pub deps: CommerceDeps,
  pub request_ctx: RequestContext,
  pub user_id: String,
  pub session_id: String,
  pub payment_intent_id: Option<String>,
  pub order_id: Option<String>,

  pub cart: Option<Cart>,
  pub checkout: Option<CheckoutMetadata>,
  pub payment_status: Option<PaymentStatus>,
  /// Set when the payment failed; reported after the failed status is persisted.
  pub payment_failure: Option<String>,
}

impl ConfirmCtxData {
  pub fn new(
    deps: CommerceDeps,
    request_ctx: RequestContext,
    user_id: &str,
    session_id: &str,
    payment_intent_id: Option<&str>,
    order_id: Option<&str>,
  ) -> Self {
    let clean = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
    Self {
      deps,
      request_ctx,
      user_id: user_id.trim().to_string(),
      session_id: session_id.trim().to_string(),
      payment_intent_id: clean(payment_intent_id),
      order_id: clean(order_id),
      cart: None,
      checkout: None,
      payment_status: None,
      payment_failure: None,
    }
  }
}
