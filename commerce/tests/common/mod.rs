// tests/common/mod.rs
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use commerce::checkout::StartCheckout;
use commerce::models::{Address, Cart, CartItem, CartPromotion, CheckoutMetadata, Metadata};
use commerce::services::{
  IdGenerator, ManualClock, MemoryDatabase, MockPaymentGateway, RecordingEventPublisher, RecordingWorkflowDispatcher,
};
use commerce::{AppConfig, CheckoutService, CommerceDeps, OrderService};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

pub const USER: &str = "user-1";
pub const CART: &str = "cart-1";
pub const SKU: &str = "SKU-RING";
pub const STOCK: i64 = 5;

pub fn t0() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
}

/// `{prefix}_{n}` with a counter per prefix, so tests can name what gets created.
#[derive(Debug, Default)]
pub struct SequentialIds {
  next: parking_lot::Mutex<HashMap<String, u64>>,
}

impl IdGenerator for SequentialIds {
  fn new_id(&self, prefix: &str) -> String {
    let mut next = self.next.lock();
    let n = next.entry(prefix.to_string()).or_insert(0);
    *n += 1;
    format!("{}_{}", prefix, n)
  }
}

// --- Harness ---
pub struct Harness {
  pub clock: Arc<ManualClock>,
  pub db: Arc<MemoryDatabase>,
  pub gateway: Arc<MockPaymentGateway>,
  pub dispatcher: Arc<RecordingWorkflowDispatcher>,
  pub events: Arc<RecordingEventPublisher>,
  pub deps: CommerceDeps,
  pub checkout: CheckoutService,
  pub orders: OrderService,
}

impl Harness {
  pub fn new() -> Self {
    Self::build(None)
  }

  /// Harness whose payment gateway takes `latency` per call.
  pub fn with_gateway_latency(latency: Duration) -> Self {
    Self::build(Some(latency))
  }

  fn build(latency: Option<Duration>) -> Self {
    setup_tracing();
    let clock = Arc::new(ManualClock::new(t0()));
    let ids = Arc::new(SequentialIds::default());
    let db = Arc::new(MemoryDatabase::new(clock.clone()).with_id_generator(ids.clone()));
    db.set_stock(SKU, STOCK);

    let mut gateway = MockPaymentGateway::new(clock.clone());
    if let Some(latency) = latency {
      gateway = gateway.with_latency(latency);
    }
    let gateway = Arc::new(gateway);
    let dispatcher = Arc::new(RecordingWorkflowDispatcher::new());
    let events = Arc::new(RecordingEventPublisher::new());

    let config = AppConfig {
      collaborator_timeout: Duration::from_secs(2),
      ..AppConfig::default()
    };
    let deps = CommerceDeps::builder()
      .memory_database(db.clone())
      .payments(gateway.clone())
      .workflows(dispatcher.clone())
      .events(events.clone())
      .clock(clock.clone())
      .ids(ids)
      .config(config)
      .build()
      .expect("deps");

    Self {
      checkout: CheckoutService::new(deps.clone()),
      orders: OrderService::new(deps.clone()),
      clock,
      db,
      gateway,
      dispatcher,
      events,
      deps,
    }
  }

  pub fn stored_cart(&self) -> Cart {
    self.db.cart(USER).expect("cart seeded")
  }

  pub fn stored_checkout(&self) -> CheckoutMetadata {
    CheckoutMetadata::from_cart(&self.stored_cart())
      .expect("well-formed checkout metadata")
      .expect("checkout metadata present")
  }
}

// --- Fixtures ---
pub fn physical_item(quantity: i64, unit_price: i64) -> CartItem {
  CartItem {
    id: "line-1".to_string(),
    product_id: "prod-ring".to_string(),
    sku: Some(SKU.to_string()),
    options: Metadata::new(),
    design_id: Some("design-7".to_string()),
    quantity,
    unit_price,
    line_total: None,
    currency: None,
    requires_shipping: true,
  }
}

pub fn digital_item(unit_price: i64) -> CartItem {
  CartItem {
    id: "line-gift".to_string(),
    product_id: "prod-gift-card".to_string(),
    sku: None,
    options: Metadata::new(),
    design_id: None,
    quantity: 1,
    unit_price,
    line_total: None,
    currency: None,
    requires_shipping: false,
  }
}

pub fn address() -> Address {
  Address {
    recipient: Some("Grace Hopper".to_string()),
    line1: "1 Harbor Way".to_string(),
    line2: None,
    city: "Arlington".to_string(),
    region: Some("VA".to_string()),
    postal_code: "22201".to_string(),
    country: "US".to_string(),
  }
}

pub fn cart_with(items: Vec<CartItem>, currency: &str) -> Cart {
  Cart {
    id: CART.to_string(),
    user_id: USER.to_string(),
    currency: currency.to_string(),
    items,
    shipping_address_id: None,
    shipping_address: Some(address()),
    billing_address: None,
    promotion: None,
    estimate: None,
    metadata: Metadata::new(),
    created_at: t0(),
    updated_at: t0(),
  }
}

/// Two rings at 1 500 each.
pub fn sample_cart() -> Cart {
  cart_with(vec![physical_item(2, 1_500)], "USD")
}

pub fn promotion(code: &str, discount: i64, applied: bool) -> CartPromotion {
  CartPromotion {
    code: code.to_string(),
    discount,
    applied,
  }
}

pub fn start_checkout(psp: &str) -> StartCheckout {
  StartCheckout {
    user_id: USER.to_string(),
    cart_id: Some(CART.to_string()),
    success_url: "https://shop.test/success".to_string(),
    cancel_url: "https://shop.test/cancel".to_string(),
    psp: psp.to_string(),
    metadata: Metadata::new(),
  }
}

// --- Tracing Setup ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
