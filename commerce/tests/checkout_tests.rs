// tests/checkout_tests.rs
mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use commerce::checkout::{RELEASE_PAYMENT_FAILED, RELEASE_PERSIST_FAILED};
use commerce::idempotency;
use commerce::models::{CheckoutMetadata, CheckoutStatus, Metadata};
use async_trait::async_trait;
use commerce::services::{
  DispatchError, GatewayError, PaymentGateway, PaymentSession, PaymentSessionRequest, PaymentStatus, ReservationStatus,
  StoreError,
};
use commerce::{CheckoutService, CommerceError, RequestContext};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn released_with(h: &Harness, reservation_id: &str) -> Option<String> {
  match h.db.reservation(reservation_id)?.status {
    ReservationStatus::Released { reason } => Some(reason),
    _ => None,
  }
}

// --- Session creation ---

#[tokio::test]
#[serial]
async fn test_jpy_cart_gets_pending_session_with_future_expiry() {
  let h = Harness::new();
  let cart = cart_with(vec![physical_item(2, 1_500)], "jpy");
  h.db.seed_cart(cart.clone());
  let ctx = RequestContext::background();

  let descriptor = h
    .checkout
    .create_checkout_session(&ctx, start_checkout("Stripe"))
    .await
    .unwrap();

  assert_eq!(descriptor.provider, "stripe");
  assert!(descriptor.expires_at > t0());
  assert_eq!(descriptor.reservation_id.as_deref(), Some("res_1"));
  assert_eq!(descriptor.reservation_expires_at, Some(t0() + ChronoDuration::minutes(15)));
  assert_eq!(
    descriptor.idempotency_key,
    idempotency::derived_key("stripe", &cart.normalized(), 3_000)
  );

  let request = h.gateway.last_request().unwrap();
  assert_eq!(request.currency, "JPY");
  assert_eq!(request.amount, 3_000);
  assert_eq!(request.idempotency_key, descriptor.idempotency_key);
  assert_eq!(h.db.stock_level(SKU), Some(STOCK - 2));

  let stored = h.stored_checkout();
  assert_eq!(stored.status, Some(CheckoutStatus::Pending));
  assert_eq!(stored.session_id.as_deref(), Some(descriptor.session_id.as_str()));
  assert_eq!(stored.reservation_id.as_deref(), Some("res_1"));
  assert!(stored.workflow_id.is_none());
  assert!(h.stored_cart().updated_at > t0());
}

#[tokio::test]
#[serial]
async fn test_cart_without_physical_lines_skips_reservation() {
  let h = Harness::new();
  h.db.seed_cart(cart_with(vec![digital_item(2_500)], "USD"));

  let descriptor = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("paypal"))
    .await
    .unwrap();

  assert!(descriptor.reservation_id.is_none());
  assert!(descriptor.reservation_expires_at.is_none());
  assert!(h.db.reservation("res_1").is_none());
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
  assert_eq!(h.stored_checkout().provider.as_deref(), Some("paypal"));
}

#[tokio::test]
#[serial]
async fn test_unapplied_promotion_is_not_ready() {
  let h = Harness::new();
  let mut cart = sample_cart();
  cart.promotion = Some(promotion("SPRING10", 300, false));
  h.db.seed_cart(cart);

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::CartNotReady(ref m) if m.contains("SPRING10")), "{err}");
  assert_eq!(h.gateway.create_calls(), 0);
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
}

#[tokio::test]
#[serial]
async fn test_applied_promotion_reduces_the_charge() {
  let h = Harness::new();
  let mut cart = sample_cart();
  cart.promotion = Some(promotion("SPRING10", 300, true));
  h.db.seed_cart(cart);

  h.checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap();

  let request = h.gateway.last_request().unwrap();
  assert_eq!(request.amount, 2_700);
  assert!(request.promotion_applied);
}

#[tokio::test]
#[serial]
async fn test_shipping_cart_without_address_is_not_ready() {
  let h = Harness::new();
  let mut cart = sample_cart();
  cart.shipping_address = None;
  h.db.seed_cart(cart);

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::CartNotReady(_)), "{err}");
}

#[tokio::test]
#[serial]
async fn test_empty_cart_is_not_ready() {
  let h = Harness::new();
  h.db.seed_cart(cart_with(vec![], "USD"));

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::CartNotReady(_)), "{err}");
}

#[tokio::test]
#[serial]
async fn test_insufficient_stock_stops_before_payment() {
  let h = Harness::new();
  h.db.seed_cart(cart_with(vec![physical_item(STOCK + 1, 1_000)], "USD"));

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::InsufficientStock(_)), "{err}");
  assert_eq!(h.gateway.create_calls(), 0);
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
}

#[tokio::test]
#[serial]
async fn test_declined_session_releases_reservation() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());
  h.gateway.fail_next_create(GatewayError::Declined("card_declined".into()));

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::PaymentFailed(_)), "{err}");
  assert_eq!(released_with(&h, "res_1").as_deref(), Some(RELEASE_PAYMENT_FAILED));
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
  assert!(CheckoutMetadata::from_cart(&h.stored_cart()).unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_unsupported_provider_is_invalid_input_and_releases() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("venmo"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::InvalidInput(ref m) if m.contains("venmo")), "{err}");
  assert_eq!(released_with(&h, "res_1").as_deref(), Some(RELEASE_PAYMENT_FAILED));
}

#[tokio::test]
#[serial]
async fn test_overflowing_line_total_is_not_ready() {
  let h = Harness::new();
  let mut cart = sample_cart();
  cart.items[0].quantity = i64::MAX / 2;
  cart.items[0].unit_price = 3;
  cart.items[0].line_total = None;
  h.db.seed_cart(cart);

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::CartNotReady(ref m) if m.contains("line-1")), "{err}");
  assert_eq!(h.gateway.create_calls(), 0);
  assert!(h.db.reservation("res_1").is_none());
}

#[tokio::test]
#[serial]
async fn test_overflowing_subtotal_is_not_ready() {
  let h = Harness::new();
  let mut big = digital_item(i64::MAX);
  big.id = "line-big".to_string();
  h.db.seed_cart(cart_with(vec![physical_item(1, 1_000), big], "USD"));

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::CartNotReady(_)), "{err}");
  assert_eq!(h.gateway.create_calls(), 0);
}

#[tokio::test]
#[serial]
async fn test_persist_conflict_releases_reservation() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());
  h.db.fail_next_cart_write(StoreError::Conflict(format!("cart {}", CART)));

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::Conflict(_)), "{err}");
  assert_eq!(h.gateway.create_calls(), 1);
  assert_eq!(released_with(&h, "res_1").as_deref(), Some(RELEASE_PERSIST_FAILED));
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
}

#[tokio::test]
#[serial]
async fn test_deadline_during_payment_call_is_unavailable_and_releases() {
  let h = Harness::with_gateway_latency(Duration::from_millis(500));
  h.db.seed_cart(sample_cart());
  let ctx = RequestContext::with_timeout(Duration::from_millis(50));

  let err = h
    .checkout
    .create_checkout_session(&ctx, start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::Unavailable(_)), "{err}");
  // The release runs after the request deadline has passed.
  assert_eq!(released_with(&h, "res_1").as_deref(), Some(RELEASE_PAYMENT_FAILED));
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
}

#[tokio::test]
#[serial]
async fn test_cancelled_request_does_nothing() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());
  let ctx = RequestContext::background();
  ctx.cancel();

  let err = h
    .checkout
    .create_checkout_session(&ctx, start_checkout("stripe"))
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::Unavailable(_)), "{err}");
  assert!(h.db.reservation("res_1").is_none());
  assert_eq!(h.gateway.create_calls(), 0);
}

#[tokio::test]
#[serial]
async fn test_cart_id_must_match_active_cart() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());
  let mut request = start_checkout("stripe");
  request.cart_id = Some("cart-stale".into());

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), request)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::InvalidInput(_)), "{err}");
}

#[tokio::test]
#[serial]
async fn test_missing_fields_are_rejected() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());
  let mut request = start_checkout("stripe");
  request.success_url = "  ".into();

  let err = h
    .checkout
    .create_checkout_session(&RequestContext::background(), request)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::InvalidInput(ref m) if m == "success url is required"), "{err}");
}

#[tokio::test]
#[serial]
async fn test_retry_after_failed_persist_reuses_key_and_session() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());
  h.db.fail_next_cart_write(StoreError::Unavailable("replica lag".into()));
  let ctx = RequestContext::background();

  assert!(h
    .checkout
    .create_checkout_session(&ctx, start_checkout("stripe"))
    .await
    .is_err());
  let first_key = h.gateway.last_request().unwrap().idempotency_key;

  let descriptor = h
    .checkout
    .create_checkout_session(&ctx, start_checkout("stripe"))
    .await
    .unwrap();

  assert_eq!(descriptor.idempotency_key, first_key);
  assert_eq!(h.gateway.create_calls(), 2);
  // The first hold was released by the failed attempt, the retry takes a new one.
  assert_eq!(descriptor.reservation_id.as_deref(), Some("res_2"));
  assert_eq!(h.db.stock_level(SKU), Some(STOCK - 2));
}

#[tokio::test]
#[serial]
async fn test_explicit_key_makes_repeat_requests_idempotent() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());
  let ctx = RequestContext::background();
  let mut request = start_checkout("stripe");
  request.metadata = serde_json::from_value::<Metadata>(json!({ "idempotencyKey": "client-attempt-1" })).unwrap();

  let first = h.checkout.create_checkout_session(&ctx, request.clone()).await.unwrap();
  let second = h.checkout.create_checkout_session(&ctx, request).await.unwrap();

  assert_eq!(first.idempotency_key, "client-attempt-1");
  assert_eq!(second.session_id, first.session_id);
  assert_eq!(second.reservation_id, first.reservation_id);
  assert_eq!(h.db.stock_level(SKU), Some(STOCK - 2));
}

#[tokio::test]
#[serial]
async fn test_new_session_keeps_foreign_checkout_keys() {
  let h = Harness::new();
  let mut cart = sample_cart();
  cart.metadata.insert(
    "checkout".into(),
    json!({ "sessionId": "cs_old", "workflowId": "wf_old", "giftNote": "happy birthday" }),
  );
  h.db.seed_cart(cart);

  let descriptor = h
    .checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap();

  let stored = h.stored_checkout();
  assert_eq!(stored.session_id.as_deref(), Some(descriptor.session_id.as_str()));
  assert!(stored.workflow_id.is_none());
  assert_eq!(stored.extra.get("giftNote"), Some(&json!("happy birthday")));
}

// --- Client completion ---

async fn open_session(h: &Harness) -> String {
  h.db.seed_cart(sample_cart());
  h.checkout
    .create_checkout_session(&RequestContext::background(), start_checkout("stripe"))
    .await
    .unwrap()
    .session_id
}

#[tokio::test]
#[serial]
async fn test_confirm_pending_payment_dispatches_workflow() {
  let h = Harness::new();
  let session_id = open_session(&h).await;

  let outcome = h
    .checkout
    .confirm_client_completion(&RequestContext::background(), USER, &session_id, None, None)
    .await
    .unwrap();

  assert_eq!(outcome.status, CheckoutStatus::PendingCapture);
  assert_eq!(outcome.session_id, session_id);
  assert!(outcome.workflow_id.as_deref().is_some_and(|w| w.starts_with("wf_")));
  assert_eq!(h.dispatcher.started(), 1);

  let payload = &h.dispatcher.payloads()[0];
  assert_eq!(payload.idempotency_key, format!("checkout:{}:{}", CART, session_id));
  assert_eq!(payload.reservation_id.as_deref(), Some("res_1"));

  let stored = h.stored_checkout();
  assert_eq!(stored.status, Some(CheckoutStatus::PendingCapture));
  assert_eq!(stored.workflow_id, outcome.workflow_id);
}

#[tokio::test]
#[serial]
async fn test_repeat_confirm_is_answered_from_storage() {
  let h = Harness::new();
  let session_id = open_session(&h).await;
  let ctx = RequestContext::background();
  h.gateway
    .set_payment_status(h.stored_checkout().intent_id.as_deref().unwrap(), PaymentStatus::Succeeded);

  let first = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, None)
    .await
    .unwrap();
  let second = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, Some("ord_42"))
    .await
    .unwrap();
  let third = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, Some("ord_other"))
    .await
    .unwrap();

  assert_eq!(h.gateway.lookup_calls(), 1);
  assert_eq!(h.dispatcher.calls(), 1);
  assert_eq!(second.workflow_id, first.workflow_id);
  assert_eq!(second.status, CheckoutStatus::PendingCapture);
  // Only an empty order id slot is filled.
  assert_eq!(second.order_id.as_deref(), Some("ord_42"));
  assert_eq!(third.order_id.as_deref(), Some("ord_42"));
  assert_eq!(h.stored_checkout().order_id.as_deref(), Some("ord_42"));
}

#[tokio::test]
#[serial]
async fn test_failed_payment_releases_and_reports() {
  let h = Harness::new();
  let session_id = open_session(&h).await;
  let ctx = RequestContext::background();
  let intent_id = h.stored_checkout().intent_id.unwrap();
  h.gateway.set_payment_status(&intent_id, PaymentStatus::Failed);

  let err = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, Some(&intent_id), None)
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::PaymentFailed(_)), "{err}");
  assert_eq!(released_with(&h, "res_1").as_deref(), Some(RELEASE_PAYMENT_FAILED));
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
  assert_eq!(h.stored_checkout().status, Some(CheckoutStatus::Failed));
  assert_eq!(h.dispatcher.calls(), 0);

  let again = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, None)
    .await
    .unwrap();
  assert_eq!(again.status, CheckoutStatus::Failed);
  assert_eq!(h.gateway.lookup_calls(), 1);
}

#[tokio::test]
#[serial]
async fn test_payment_needing_action_can_be_retried() {
  let h = Harness::new();
  let session_id = open_session(&h).await;
  let ctx = RequestContext::background();
  let intent_id = h.stored_checkout().intent_id.unwrap();
  h.gateway.set_payment_status(&intent_id, PaymentStatus::RequiresAction);

  let err = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::Unavailable(_)), "{err}");
  assert_eq!(h.stored_checkout().status, Some(CheckoutStatus::Pending));

  h.gateway.set_payment_status(&intent_id, PaymentStatus::Succeeded);
  let outcome = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, None)
    .await
    .unwrap();
  assert_eq!(outcome.status, CheckoutStatus::PendingCapture);
}

#[tokio::test]
#[serial]
async fn test_dispatch_failure_leaves_session_pending() {
  let h = Harness::new();
  let session_id = open_session(&h).await;
  let ctx = RequestContext::background();
  h.dispatcher.fail_next(DispatchError::Unavailable("queue down".into()));

  let err = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::Unavailable(_)), "{err}");
  assert_eq!(h.stored_checkout().status, Some(CheckoutStatus::Pending));

  let outcome = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, None)
    .await
    .unwrap();
  assert!(outcome.workflow_id.is_some());
  assert_eq!(h.dispatcher.started(), 1);
}

#[tokio::test]
#[serial]
async fn test_confirm_rejects_foreign_session_and_intent() {
  let h = Harness::new();
  let session_id = open_session(&h).await;
  let ctx = RequestContext::background();

  let err = h
    .checkout
    .confirm_client_completion(&ctx, USER, "cs_someone_else", None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::InvalidInput(_)), "{err}");

  let err = h
    .checkout
    .confirm_client_completion(&ctx, USER, &session_id, Some("pi_forged"), None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::InvalidInput(_)), "{err}");
  assert_eq!(h.gateway.lookup_calls(), 0);
}

#[tokio::test]
#[serial]
async fn test_confirm_without_session_is_not_found() {
  let h = Harness::new();
  h.db.seed_cart(sample_cart());

  let err = h
    .checkout
    .confirm_client_completion(&RequestContext::background(), USER, "cs_1", None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::NotFound(_)), "{err}");
}

/// Cancels the request's token as soon as a payment lookup has answered.
struct CancelAfterLookup {
  inner: Arc<dyn PaymentGateway>,
  token: CancellationToken,
}

#[async_trait]
impl PaymentGateway for CancelAfterLookup {
  async fn create_checkout_session(&self, request: PaymentSessionRequest) -> Result<PaymentSession, GatewayError> {
    self.inner.create_checkout_session(request).await
  }

  async fn lookup_payment(&self, intent_id: &str) -> Result<PaymentStatus, GatewayError> {
    let status = self.inner.lookup_payment(intent_id).await;
    self.token.cancel();
    status
  }
}

#[tokio::test]
#[serial]
async fn test_failed_payment_release_outlives_cancelled_request() {
  let h = Harness::new();
  let session_id = open_session(&h).await;
  let intent_id = h.stored_checkout().intent_id.unwrap();
  h.gateway.set_payment_status(&intent_id, PaymentStatus::Failed);

  let token = CancellationToken::new();
  let mut deps = h.deps.clone();
  deps.payments = Arc::new(CancelAfterLookup {
    inner: h.gateway.clone(),
    token: token.clone(),
  });
  let checkout = CheckoutService::new(deps);
  let ctx = RequestContext::background().with_cancellation(token);

  let err = checkout
    .confirm_client_completion(&ctx, USER, &session_id, None, None)
    .await
    .unwrap_err();

  // Persisting the failed status is abandoned with the request; the release is not.
  assert!(matches!(err, CommerceError::Unavailable(_)), "{err}");
  assert_eq!(released_with(&h, "res_1").as_deref(), Some(RELEASE_PAYMENT_FAILED));
  assert_eq!(h.db.stock_level(SKU), Some(STOCK));
}
