// commerce/src/pipelines/checkout_pipeline.rs

//! Checkout session creation as a saga:
//! load cart -> derive key -> reserve inventory -> create payment session -> persist metadata.
//!
//! The reservation is the only step with an external side effect to undo; its compensation
//! releases the hold when the payment session or the metadata write fails.

use std::sync::Arc;
use stepflow::{Compensation, ContextData, Pipeline, PipelineControl, SkipCondition};
use tracing::{info, warn};

use super::contexts::CreateSessionCtxData;
use super::missing;
use crate::checkout::{CheckoutSessionDescriptor, RELEASE_PAYMENT_FAILED, RELEASE_PERSIST_FAILED};
use crate::errors::{CommerceError, Result};
use crate::idempotency;
use crate::models::{AmountOverflow, Cart, CheckoutMetadata, CheckoutStatus, Totals};
use crate::services::{GatewayError, PaymentLineItem, PaymentSessionRequest, ReservationLine};

pub const LOAD_CART: &str = "load_cart";
pub const DERIVE_IDEMPOTENCY_KEY: &str = "derive_idempotency_key";
pub const RESERVE_INVENTORY: &str = "reserve_inventory";
pub const CREATE_PAYMENT_SESSION: &str = "create_payment_session";
pub const PERSIST_CHECKOUT: &str = "persist_checkout";

/// Session creation classifies gateway failures differently from lookups: a request the
/// gateway refuses is the caller's fault, anything else is a failed payment attempt.
pub(crate) fn classify_session_error(err: GatewayError) -> CommerceError {
  match err {
    GatewayError::InvalidRequest(m) => CommerceError::InvalidInput(m),
    GatewayError::UnsupportedProvider(p) => CommerceError::InvalidInput(format!("unsupported payment provider: {}", p)),
    other => CommerceError::PaymentFailed(other.to_string()),
  }
}

fn release_reason(failed_step: &str) -> &'static str {
  match failed_step {
    CREATE_PAYMENT_SESSION => RELEASE_PAYMENT_FAILED,
    _ => RELEASE_PERSIST_FAILED,
  }
}

/// Readiness rules for checkout. Returns the totals to charge.
pub(crate) fn ensure_ready(cart: &Cart) -> Result<Totals> {
  if cart.items.is_empty() {
    return Err(CommerceError::CartNotReady(format!("cart {} is empty", cart.id)));
  }
  if cart.currency.is_empty() {
    return Err(CommerceError::CartNotReady(format!("cart {} has no currency", cart.id)));
  }
  if cart.requires_shipping() && !cart.has_shipping_address() {
    return Err(CommerceError::CartNotReady(format!(
      "cart {} needs a shipping address",
      cart.id
    )));
  }
  if let Some(promotion) = cart.promotion.as_ref().filter(|p| !p.applied) {
    return Err(CommerceError::CartNotReady(format!(
      "promotion {} is attached but not applied",
      promotion.code
    )));
  }
  let totals = cart
    .resolved_totals()
    .map_err(|e| CommerceError::CartNotReady(format!("cart {}: {}", cart.id, e)))?;
  if totals.total <= 0 {
    return Err(CommerceError::CartNotReady(format!("cart {} has no payable total", cart.id)));
  }
  Ok(totals)
}

pub fn build_checkout_session_pipeline() -> Pipeline<CreateSessionCtxData, CommerceError> {
  let no_physical_lines: SkipCondition<CreateSessionCtxData> = Arc::new(|ctx_data: ContextData<CreateSessionCtxData>| {
    ctx_data.with_read(|d| !d.cart.as_ref().is_some_and(Cart::has_physical_lines))
  });

  let mut p = Pipeline::<CreateSessionCtxData, CommerceError>::new(&[
    (LOAD_CART, false, None),
    (DERIVE_IDEMPOTENCY_KEY, false, None),
    (RESERVE_INVENTORY, false, Some(no_physical_lines)),
    (CREATE_PAYMENT_SESSION, false, None),
    (PERSIST_CHECKOUT, false, None),
  ]);

  // Step 1: Load, normalize and check the cart
  p.on_root(LOAD_CART, |ctx_data: ContextData<CreateSessionCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, request) = ctx_data.with_read(|d| (d.deps.clone(), d.request_ctx.clone(), d.request.clone()));
      request.validate()?;

      let stored = request_ctx
        .run(
          "cart_store.get_cart",
          deps.config.collaborator_timeout,
          deps.carts.get_cart(request.user_id.trim()),
        )
        .await?;
      let cart = stored.clone().normalized();
      if let Some(wanted) = request.cart_id.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        if wanted != cart.id {
          return Err(CommerceError::InvalidInput(format!(
            "cart {} is not the active cart of user {}",
            wanted, cart.user_id
          )));
        }
      }
      let totals = ensure_ready(&cart)?;

      info!(cart_id = %cart.id, total = totals.total, currency = %cart.currency, "Cart ready for checkout.");
      ctx_data.with_write(|d| {
        d.stored_cart = Some(stored);
        d.cart = Some(cart);
        d.totals = Some(totals);
      });
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  // Step 2: Idempotency key
  p.on_root(DERIVE_IDEMPOTENCY_KEY, |ctx_data: ContextData<CreateSessionCtxData>| {
    Box::pin(async move {
      let key = ctx_data.with_read(|d| {
        let cart = d.cart.as_ref().ok_or_else(|| missing(DERIVE_IDEMPOTENCY_KEY, "cart"))?;
        let total = d.totals.map(|t| t.total).unwrap_or_default();
        Ok::<_, CommerceError>(idempotency::checkout_key(&d.request.metadata, &d.request.psp, cart, total))
      })?;
      ctx_data.with_write(|d| d.idempotency_key = Some(key));
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  // Step 3: Hold stock for the physical lines
  p.on_root(RESERVE_INVENTORY, |ctx_data: ContextData<CreateSessionCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, lines, key) = ctx_data.with_read(|d| {
        let lines: Vec<ReservationLine> = d
          .cart
          .iter()
          .flat_map(|c| c.physical_lines())
          .map(|item| ReservationLine {
            sku: item.sku.clone().unwrap_or_default(),
            quantity: item.quantity,
          })
          .collect();
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          lines,
          d.idempotency_key.clone().unwrap_or_default(),
        )
      });

      let reservation = request_ctx
        .run(
          "inventory.reserve_stocks",
          deps.config.collaborator_timeout,
          deps.inventory.reserve_stocks(&lines, deps.config.reservation_ttl, &key),
        )
        .await?;

      info!(reservation_id = %reservation.id, expires_at = %reservation.expires_at, "Inventory reserved.");
      ctx_data.with_write(|d| d.reservation = Some(reservation));
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.compensate_root(
    RESERVE_INVENTORY,
    |ctx_data: ContextData<CreateSessionCtxData>, compensation: Compensation| {
      Box::pin(async move {
        let (deps, request_ctx, reservation_id) = ctx_data.with_read(|d| {
          (
            d.deps.clone(),
            d.request_ctx.clone(),
            d.reservation.as_ref().map(|r| r.id.clone()),
          )
        });
        let Some(reservation_id) = reservation_id else {
          return Ok(());
        };
        let reason = release_reason(&compensation.failed_step);

        // The request may already be past its deadline; the release must still go out.
        request_ctx
          .detached()
          .run(
            "inventory.release_reservation",
            deps.config.collaborator_timeout,
            deps.inventory.release_reservation(&reservation_id, reason),
          )
          .await?;
        warn!(
          %reservation_id,
          reason,
          failed_step = %compensation.failed_step,
          cause = %compensation.error_message,
          "Reservation released after failed checkout."
        );
        Ok::<_, CommerceError>(())
      })
    },
  );

  // Step 4: Open the payment session
  p.on_root(CREATE_PAYMENT_SESSION, |ctx_data: ContextData<CreateSessionCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, request, cart, totals, key) = ctx_data.with_read(|d| {
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          d.request.clone(),
          d.cart.clone(),
          d.totals,
          d.idempotency_key.clone(),
        )
      });
      let cart = cart.ok_or_else(|| missing(CREATE_PAYMENT_SESSION, "cart"))?;
      let totals = totals.ok_or_else(|| missing(CREATE_PAYMENT_SESSION, "totals"))?;
      let key = key.ok_or_else(|| missing(CREATE_PAYMENT_SESSION, "idempotency key"))?;

      let session_request = PaymentSessionRequest {
        provider: request.psp.trim().to_ascii_lowercase(),
        user_id: cart.user_id.clone(),
        cart_id: cart.id.clone(),
        amount: totals.total,
        currency: cart.currency.clone(),
        line_items: cart
          .items
          .iter()
          .map(|item| -> std::result::Result<_, AmountOverflow> {
            Ok(PaymentLineItem {
              product_id: item.product_id.clone(),
              sku: item.sku.clone(),
              quantity: item.quantity,
              unit_amount: item.unit_price,
              amount: item.resolved_line_total()?,
            })
          })
          .collect::<std::result::Result<Vec<_>, _>>()
          .map_err(|e| CommerceError::CartNotReady(e.to_string()))?,
        idempotency_key: key,
        promotion_applied: cart.promotion.as_ref().is_some_and(|p| p.applied),
        success_url: request.success_url.trim().to_string(),
        cancel_url: request.cancel_url.trim().to_string(),
        metadata: request.metadata,
      };

      let session = request_ctx
        .guard(
          "payment_gateway.create_checkout_session",
          deps.config.collaborator_timeout,
          deps.payments.create_checkout_session(session_request),
        )
        .await?
        .map_err(classify_session_error)?;

      info!(session_id = %session.id, provider = %session.provider, "Payment session created.");
      ctx_data.with_write(|d| d.session = Some(session));
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  // Step 5: Record the session on the cart, guarded by the version read in step 1
  p.on_root(PERSIST_CHECKOUT, |ctx_data: ContextData<CreateSessionCtxData>| {
    Box::pin(async move {
      let (deps, request_ctx, stored, session, reservation, key) = ctx_data.with_read(|d| {
        (
          d.deps.clone(),
          d.request_ctx.clone(),
          d.stored_cart.clone(),
          d.session.clone(),
          d.reservation.clone(),
          d.idempotency_key.clone(),
        )
      });
      let stored = stored.ok_or_else(|| missing(PERSIST_CHECKOUT, "cart"))?;
      let session = session.ok_or_else(|| missing(PERSIST_CHECKOUT, "payment session"))?;
      let key = key.ok_or_else(|| missing(PERSIST_CHECKOUT, "idempotency key"))?;

      let now = deps.clock.now();
      let checkout = CheckoutMetadata {
        session_id: Some(session.id.clone()),
        provider: Some(session.provider.clone()),
        client_secret: session.client_secret.clone(),
        redirect_url: session.redirect_url.clone(),
        intent_id: session.intent_id.clone(),
        expires_at: Some(session.expires_at),
        idempotency_key: Some(key.clone()),
        reservation_id: reservation.as_ref().map(|r| r.id.clone()),
        reservation_expires_at: reservation.as_ref().map(|r| r.expires_at),
        workflow_id: None,
        order_id: None,
        status: Some(CheckoutStatus::Pending),
        created_at: Some(now),
        updated_at: Some(now),
        extra: CheckoutMetadata::foreign_keys(&stored),
      };

      let version = stored.updated_at;
      let mut cart = stored;
      checkout.store_into(&mut cart)?;
      request_ctx
        .run(
          "cart_store.upsert_cart",
          deps.config.collaborator_timeout,
          deps.carts.upsert_cart(cart, Some(version)),
        )
        .await?;

      let descriptor = CheckoutSessionDescriptor {
        session_id: session.id,
        provider: session.provider,
        client_secret: session.client_secret,
        redirect_url: session.redirect_url,
        expires_at: session.expires_at,
        idempotency_key: key,
        reservation_id: reservation.as_ref().map(|r| r.id.clone()),
        reservation_expires_at: reservation.as_ref().map(|r| r.expires_at),
      };
      ctx_data.with_write(|d| d.descriptor = Some(descriptor));
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.after_root(PERSIST_CHECKOUT, |ctx_data: ContextData<CreateSessionCtxData>| {
    Box::pin(async move {
      ctx_data.with_read(|d| {
        if let Some(descriptor) = &d.descriptor {
          info!(
            session_id = %descriptor.session_id,
            reservation_id = ?descriptor.reservation_id,
            "Checkout session recorded on cart."
          );
        }
      });
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p
}
