// commerce/src/main.rs

//! Walks one cart through checkout and the order lifecycle against the in-memory
//! collaborators, logging every step.

use chrono::Utc;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use commerce::models::{Address, Cart, CartItem, Metadata, OrderStatus, ProductionEventInput};
use commerce::services::{MemoryDatabase, MockPaymentGateway, RecordingWorkflowDispatcher, SystemClock, TracingEventPublisher};
use commerce::{
  AppConfig, CheckoutService, CommerceDeps, CreateOrderFromCart, OrderService, RequestContext, RequestInvoice,
  StartCheckout, TransitionRequest,
};

const DEMO_USER: &str = "demo-user";
const DEMO_SKU: &str = "RING-SILVER-52";

fn init_tracing(json: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE); // Log when spans close, showing duration
  if json {
    builder.json().init();
  } else {
    builder.init();
  }
}

fn demo_cart() -> Cart {
  let now = Utc::now();
  Cart {
    id: "cart-demo".to_string(),
    user_id: DEMO_USER.to_string(),
    currency: "usd".to_string(),
    items: vec![
      CartItem {
        id: "line-1".to_string(),
        product_id: "prod-ring".to_string(),
        sku: Some(DEMO_SKU.to_string()),
        options: Metadata::new(),
        design_id: Some("design-engraved-initials".to_string()),
        quantity: 1,
        unit_price: 12_900,
        line_total: None,
        currency: None,
        requires_shipping: true,
      },
      CartItem {
        id: "line-2".to_string(),
        product_id: "prod-gift-wrap".to_string(),
        sku: None,
        options: Metadata::new(),
        design_id: None,
        quantity: 1,
        unit_price: 500,
        line_total: None,
        currency: None,
        requires_shipping: false,
      },
    ],
    shipping_address_id: None,
    shipping_address: Some(Address {
      recipient: Some("Ada Lovelace".to_string()),
      line1: "12 Analytical Row".to_string(),
      line2: None,
      city: "London".to_string(),
      region: None,
      postal_code: "N1 7AA".to_string(),
      country: "GB".to_string(),
    }),
    billing_address: None,
    promotion: None,
    estimate: None,
    metadata: Metadata::new(),
    created_at: now,
    updated_at: now,
  }
}

fn production_event(event_type: &str, station: Option<&str>, note: Option<&str>) -> ProductionEventInput {
  ProductionEventInput {
    event_type: event_type.to_string(),
    station: station.map(String::from),
    note: note.map(String::from),
    actor: "floor-terminal".to_string(),
    ..Default::default()
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = AppConfig::from_env()?;
  init_tracing(config.log_json);
  tracing::info!(psp = %config.demo_psp, ttl_secs = config.reservation_ttl.as_secs(), "Starting commerce demo...");

  let clock = Arc::new(SystemClock);
  let db = Arc::new(MemoryDatabase::new(clock.clone()));
  db.set_stock(DEMO_SKU, 3);
  db.seed_cart(demo_cart());

  let deps = CommerceDeps::builder()
    .memory_database(db.clone())
    .payments(Arc::new(MockPaymentGateway::new(clock.clone())))
    .workflows(Arc::new(RecordingWorkflowDispatcher::new()))
    .events(Arc::new(TracingEventPublisher))
    .clock(clock)
    .config(config.clone())
    .build()?;
  let checkout = CheckoutService::new(deps.clone());
  let orders = OrderService::new(deps);
  let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(30));

  // Checkout
  let descriptor = checkout
    .create_checkout_session(
      &ctx,
      StartCheckout {
        user_id: DEMO_USER.to_string(),
        cart_id: Some("cart-demo".to_string()),
        success_url: "https://shop.example.test/checkout/success".to_string(),
        cancel_url: "https://shop.example.test/checkout/cancel".to_string(),
        psp: config.demo_psp.clone(),
        metadata: Metadata::new(),
      },
    )
    .await?;
  tracing::info!(session_id = %descriptor.session_id, redirect_url = ?descriptor.redirect_url, "Redirecting client.");

  let outcome = checkout
    .confirm_client_completion(&ctx, DEMO_USER, &descriptor.session_id, None, None)
    .await?;
  tracing::info!(status = %outcome.status, workflow_id = ?outcome.workflow_id, "Client completion confirmed.");

  // Finalization: the order is created from the cart as stored after checkout.
  let cart = db
    .cart(DEMO_USER)
    .ok_or_else(|| anyhow::anyhow!("demo cart disappeared"))?;
  let order = orders
    .create_from_cart(
      &ctx,
      CreateOrderFromCart {
        cart,
        reservation_id: descriptor.reservation_id.clone(),
        order_number: None,
        actor: "checkout-workflow".to_string(),
        metadata: Metadata::new(),
      },
    )
    .await?;
  let order = orders
    .transition_status(
      &ctx,
      TransitionRequest {
        order_id: order.id.clone(),
        target: OrderStatus::Paid,
        expected_status: Some(OrderStatus::PendingPayment),
        reason: Some("payment captured".to_string()),
        actor: "checkout-workflow".to_string(),
        metadata: Metadata::new(),
      },
    )
    .await?;

  // Production floor
  let steps = [
    production_event("queued", Some("intake"), None),
    production_event("on_hold", Some("engraving"), Some("awaiting proof approval")),
    production_event("engraving", Some("engraving"), None),
    production_event("packed", Some("shipping"), None),
    production_event("in_transit", None, Some("handed to carrier")),
  ];
  let mut order = order;
  for input in steps {
    order = orders.append_production_event(&ctx, &order.id, input).await?;
    tracing::info!(status = %order.status, on_hold = order.production.on_hold, "Order advanced.");
  }

  for target in [OrderStatus::Delivered, OrderStatus::Completed] {
    order = orders
      .transition_status(
        &ctx,
        TransitionRequest {
          order_id: order.id.clone(),
          target,
          expected_status: Some(order.status),
          reason: None,
          actor: "carrier-webhook".to_string(),
          metadata: Metadata::new(),
        },
      )
      .await?;
  }

  let order = orders
    .request_invoice(
      &ctx,
      RequestInvoice {
        order_id: order.id.clone(),
        expected_status: Some(OrderStatus::Completed),
        notes: Some("company invoice".to_string()),
        actor: DEMO_USER.to_string(),
      },
    )
    .await?;

  tracing::info!(
    order_id = %order.id,
    order_number = %order.order_number,
    status = %order.status,
    remaining_stock = ?db.stock_level(DEMO_SKU),
    "Demo finished."
  );
  Ok(())
}
