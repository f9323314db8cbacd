// commerce/src/orders/lifecycle.rs

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{event, info, instrument, warn, Level};

use super::state_machine::{apply_transition, is_cancellable, sets_hold, status_for_production_event};
use crate::context::RequestContext;
use crate::errors::{CommerceError, Result};
use crate::models::order::metadata_keys;
use crate::models::{
  AmountOverflow, Audit, Cart, Metadata, Order, OrderItem, OrderStatus, ProductionEventInput, ProductionEventRecord,
  ProductionEventType, ProductionSummary, PromotionSnapshot, Totals,
};
use crate::services::{OrderEvent, OrderEventKind, WriteBatch};
use crate::state::CommerceDeps;

const DEFAULT_ACTOR: &str = "system";
const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct CreateOrderFromCart {
  pub cart: Cart,
  /// Hold taken at checkout; committed into the new order in the same unit of work.
  pub reservation_id: Option<String>,
  /// Pre-assigned order number; one is drawn from the counter otherwise.
  pub order_number: Option<String>,
  pub actor: String,
  pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct TransitionRequest {
  pub order_id: String,
  pub target: OrderStatus,
  pub expected_status: Option<OrderStatus>,
  pub reason: Option<String>,
  pub actor: String,
  pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
  pub order_id: String,
  pub reservation_id: Option<String>,
  pub reason: String,
  pub actor: String,
  pub expected_status: Option<OrderStatus>,
}

#[derive(Debug, Clone)]
pub struct RequestInvoice {
  pub order_id: String,
  pub expected_status: Option<OrderStatus>,
  pub notes: Option<String>,
  pub actor: String,
}

#[derive(Debug, Clone)]
pub struct ReorderRequest {
  pub source_order_id: String,
  pub actor: String,
  pub metadata: Metadata,
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn actor_or_default(actor: &str) -> String {
  match actor.trim() {
    "" => DEFAULT_ACTOR.to_string(),
    a => a.to_string(),
  }
}

fn check_expected(order: &Order, expected: Option<OrderStatus>) -> Result<()> {
  match expected {
    Some(wanted) if order.status != wanted => Err(CommerceError::Conflict(format!(
      "order {} is {}, expected {}",
      order.id, order.status, wanted
    ))),
    _ => Ok(()),
  }
}

fn validate_cart_for_order(cart: &Cart) -> Result<()> {
  if cart.user_id.is_empty() {
    return Err(CommerceError::InvalidInput("cart has no user".to_string()));
  }
  if cart.currency.is_empty() {
    return Err(CommerceError::InvalidInput(format!("cart {} has no currency", cart.id)));
  }
  if cart.items.is_empty() {
    return Err(CommerceError::InvalidInput(format!("cart {} has no items", cart.id)));
  }
  if let Some(item) = cart
    .items
    .iter()
    .find(|i| i.currency.as_deref().is_some_and(|c| c != cart.currency))
  {
    return Err(CommerceError::InvalidInput(format!(
      "item {} is priced in {}, cart is {}",
      item.id,
      item.currency.as_deref().unwrap_or_default(),
      cart.currency
    )));
  }
  Ok(())
}

/// Totals plus the order lines. Amounts that overflow `i64` are rejected as input.
fn priced_lines(cart: &Cart) -> Result<(Totals, Vec<OrderItem>)> {
  let overflow = |e: AmountOverflow| CommerceError::InvalidInput(format!("cart {}: {}", cart.id, e));
  let totals = cart.resolved_totals().map_err(overflow)?;
  let items = cart
    .items
    .iter()
    .map(OrderItem::try_from)
    .collect::<std::result::Result<Vec<_>, _>>()
    .map_err(overflow)?;
  Ok((totals, items))
}

fn transition_metadata(mut metadata: Metadata, reason: Option<&str>, from: OrderStatus, to: OrderStatus) -> Metadata {
  if let Some(reason) = reason {
    metadata.insert("reason".to_string(), Value::String(reason.to_string()));
  }
  metadata.insert("from".to_string(), Value::String(from.as_str().to_string()));
  metadata.insert("to".to_string(), Value::String(to.as_str().to_string()));
  metadata
}

/// Order creation and every later mutation. Each change goes through the state machine,
/// is persisted under the version read before it, and is announced as an event.
#[derive(Clone)]
pub struct OrderService {
  deps: CommerceDeps,
}

impl OrderService {
  pub fn new(deps: CommerceDeps) -> Self {
    Self { deps }
  }

  fn timeout(&self) -> Duration {
    self.deps.config.collaborator_timeout
  }

  #[instrument(
    name = "OrderService::create_from_cart",
    skip_all,
    fields(cart_id = %request.cart.id, user_id = %request.cart.user_id),
    err(Display)
  )]
  pub async fn create_from_cart(&self, ctx: &RequestContext, request: CreateOrderFromCart) -> Result<Order> {
    let CreateOrderFromCart {
      cart,
      reservation_id,
      order_number,
      actor,
      mut metadata,
    } = request;
    let cart = cart.normalized();
    validate_cart_for_order(&cart)?;
    let (totals, items) = priced_lines(&cart)?;

    let actor = actor_or_default(&actor);
    let now = self.deps.clock.now();
    let order_number = match non_empty(order_number) {
      Some(number) => number,
      None => self.next_order_number(ctx, now).await?,
    };
    metadata.insert(metadata_keys::CART_ID.to_string(), Value::String(cart.id.clone()));

    let mut order = Order {
      id: self.deps.ids.new_id("ord"),
      order_number,
      user_id: cart.user_id.clone(),
      status: OrderStatus::Draft,
      currency: cart.currency.clone(),
      totals,
      items,
      shipping_address: cart.shipping_address.clone(),
      billing_address: cart.billing_address.clone(),
      promotion: cart.promotion.as_ref().filter(|p| p.applied).map(|p| PromotionSnapshot {
        code: p.code.clone(),
        discount: p.discount,
      }),
      metadata,
      production: ProductionSummary::default(),
      cancel_reason: None,
      created_at: now,
      updated_at: now,
      placed_at: None,
      paid_at: None,
      shipped_at: None,
      delivered_at: None,
      completed_at: None,
      canceled_at: None,
      audit: Audit {
        created_by: actor.clone(),
        updated_by: actor.clone(),
      },
    };
    apply_transition(&mut order, OrderStatus::PendingPayment, &actor, now)?;

    let mut batch = WriteBatch::new();
    if let Some(reservation_id) = non_empty(reservation_id) {
      batch = batch.commit_reservation(reservation_id, order.id.clone());
    }
    let order = self.execute_single(ctx, batch.insert_order(order)).await?;

    info!(order_id = %order.id, order_number = %order.order_number, "Order created from cart.");
    self
      .publish(ctx, OrderEventKind::Created, &order, Metadata::new())
      .await;
    Ok(order)
  }

  #[instrument(
    name = "OrderService::transition_status",
    skip_all,
    fields(order_id = %request.order_id, target = %request.target),
    err(Display)
  )]
  pub async fn transition_status(&self, ctx: &RequestContext, request: TransitionRequest) -> Result<Order> {
    let mut order = self.load(ctx, &request.order_id).await?;
    check_expected(&order, request.expected_status)?;

    let from = order.status;
    let version = order.updated_at;
    let actor = actor_or_default(&request.actor);
    apply_transition(&mut order, request.target, &actor, self.deps.clock.now())?;

    let order = ctx
      .run("order_store.update", self.timeout(), self.deps.orders.update(order, version))
      .await?;

    if order.status != from {
      let reason = non_empty(request.reason);
      let metadata = transition_metadata(request.metadata, reason.as_deref(), from, order.status);
      self.publish(ctx, OrderEventKind::StatusChanged, &order, metadata).await;
    }
    Ok(order)
  }

  /// Cancels the order, then releases `reservation_id` if given. A failed release is only
  /// logged; the hold lapses on its own TTL.
  #[instrument(name = "OrderService::cancel", skip_all, fields(order_id = %request.order_id), err(Display))]
  pub async fn cancel(&self, ctx: &RequestContext, request: CancelOrder) -> Result<Order> {
    let reason = non_empty(Some(request.reason))
      .ok_or_else(|| CommerceError::InvalidInput("a cancellation reason is required".to_string()))?;
    let mut order = self.load(ctx, &request.order_id).await?;
    if !is_cancellable(order.status) {
      return Err(CommerceError::InvalidState(format!(
        "order {} is {} and can no longer be cancelled",
        order.id, order.status
      )));
    }
    check_expected(&order, request.expected_status)?;

    let from = order.status;
    let version = order.updated_at;
    let actor = actor_or_default(&request.actor);
    order.cancel_reason = Some(reason.clone());
    apply_transition(&mut order, OrderStatus::Canceled, &actor, self.deps.clock.now())?;

    let order = self
      .execute_single(ctx, WriteBatch::new().update_order(order, version))
      .await?;

    if let Some(reservation_id) = non_empty(request.reservation_id) {
      let released = ctx
        .run(
          "inventory.release_reservation",
          self.timeout(),
          self.deps.inventory.release_reservation(&reservation_id, &reason),
        )
        .await;
      if let Err(e) = released {
        warn!(order_id = %order.id, %reservation_id, error = %e, "Reservation release after cancel failed.");
      }
    }

    let metadata = transition_metadata(Metadata::new(), Some(&reason), from, order.status);
    self.publish(ctx, OrderEventKind::StatusChanged, &order, metadata).await;
    Ok(order)
  }

  /// Records a production-floor event and moves the order to the status it implies.
  #[instrument(
    name = "OrderService::append_production_event",
    skip_all,
    fields(order_id = %order_id, event_type = %input.event_type),
    err(Display)
  )]
  pub async fn append_production_event(
    &self,
    ctx: &RequestContext,
    order_id: &str,
    input: ProductionEventInput,
  ) -> Result<Order> {
    let event_type: ProductionEventType = input.event_type.parse()?;
    let mut order = self.load(ctx, order_id).await?;

    let from = order.status;
    let version = order.updated_at;
    let now = self.deps.clock.now();
    let actor = actor_or_default(&input.actor);
    let station = non_empty(input.station);
    let note = non_empty(input.note);
    let occurred_at = input.occurred_at.unwrap_or(now);

    let target = status_for_production_event(event_type);
    if target != from {
      if target == OrderStatus::Canceled && order.cancel_reason.is_none() {
        order.cancel_reason = Some(note.clone().unwrap_or_else(|| "production_canceled".to_string()));
      }
      apply_transition(&mut order, target, &actor, now)?;
    } else {
      order.updated_at = now;
      order.audit.updated_by = actor.clone();
    }
    order.production = ProductionSummary {
      last_event_type: Some(event_type.as_str().to_string()),
      last_event_at: Some(occurred_at),
      station: station.clone().or(order.production.station.take()),
      on_hold: sets_hold(event_type),
    };

    let record = ProductionEventRecord {
      id: self.deps.ids.new_id("pev"),
      order_id: order.id.clone(),
      event_type,
      station,
      note,
      occurred_at,
      recorded_at: now,
      actor,
      metadata: input.metadata,
    };
    let record_id = record.id.clone();
    let batch = WriteBatch::new()
      .insert_production_event(record)
      .update_order(order, version);
    let order = self.execute_single(ctx, batch).await?;
    event!(
      Level::INFO,
      order_id = %order.id,
      event_type = %event_type,
      status = %order.status,
      on_hold = order.production.on_hold,
      "Production event appended."
    );

    if order.status != from {
      let reason = format!("production:{}", event_type);
      let metadata = transition_metadata(Metadata::new(), Some(&reason), from, order.status);
      self.publish(ctx, OrderEventKind::StatusChanged, &order, metadata).await;
    }
    let mut metadata = Metadata::new();
    metadata.insert("eventId".to_string(), Value::String(record_id));
    metadata.insert("type".to_string(), Value::String(event_type.as_str().to_string()));
    metadata.insert("onHold".to_string(), Value::Bool(order.production.on_hold));
    self
      .publish(ctx, OrderEventKind::ProductionEventAppended, &order, metadata)
      .await;
    Ok(order)
  }

  /// Flags the order for invoicing. Repeating the request returns the order unchanged.
  #[instrument(name = "OrderService::request_invoice", skip_all, fields(order_id = %request.order_id), err(Display))]
  pub async fn request_invoice(&self, ctx: &RequestContext, request: RequestInvoice) -> Result<Order> {
    let mut order = self.load(ctx, &request.order_id).await?;
    check_expected(&order, request.expected_status)?;
    if order.metadata.contains_key(metadata_keys::INVOICE_REQUESTED_AT) {
      event!(Level::DEBUG, order_id = %order.id, "Invoice already requested.");
      return Ok(order);
    }

    let version = order.updated_at;
    let now = self.deps.clock.now();
    let actor = actor_or_default(&request.actor);
    order.metadata.insert(
      metadata_keys::INVOICE_REQUESTED_AT.to_string(),
      Value::String(now.to_rfc3339()),
    );
    order.metadata.insert(
      metadata_keys::INVOICE_REQUESTED_BY.to_string(),
      Value::String(actor.clone()),
    );
    if let Some(notes) = non_empty(request.notes) {
      order
        .metadata
        .insert(metadata_keys::INVOICE_NOTES.to_string(), Value::String(notes));
    }
    order.updated_at = now;
    order.audit.updated_by = actor;

    let order = ctx
      .run("order_store.update", self.timeout(), self.deps.orders.update(order, version))
      .await?;
    self
      .publish(ctx, OrderEventKind::InvoiceRequested, &order, Metadata::new())
      .await;
    Ok(order)
  }

  /// Starts a new draft order with the same contents as a delivered or completed one.
  #[instrument(
    name = "OrderService::clone_for_reorder",
    skip_all,
    fields(source_order_id = %request.source_order_id),
    err(Display)
  )]
  pub async fn clone_for_reorder(&self, ctx: &RequestContext, request: ReorderRequest) -> Result<Order> {
    let source = self.load(ctx, &request.source_order_id).await?;
    if !matches!(source.status, OrderStatus::Delivered | OrderStatus::Completed) {
      return Err(CommerceError::InvalidState(format!(
        "order {} is {}; only delivered or completed orders can be reordered",
        source.id, source.status
      )));
    }

    let now = self.deps.clock.now();
    let actor = actor_or_default(&request.actor);
    let order_number = self.next_order_number(ctx, now).await?;
    let mut metadata = request.metadata;
    metadata.insert(metadata_keys::REORDER_OF.to_string(), Value::String(source.id.clone()));

    let order = Order {
      id: self.deps.ids.new_id("ord"),
      order_number,
      user_id: source.user_id,
      status: OrderStatus::Draft,
      currency: source.currency,
      totals: source.totals,
      items: source.items,
      shipping_address: source.shipping_address,
      billing_address: source.billing_address,
      promotion: source.promotion,
      metadata,
      production: ProductionSummary::default(),
      cancel_reason: None,
      created_at: now,
      updated_at: now,
      placed_at: None,
      paid_at: None,
      shipped_at: None,
      delivered_at: None,
      completed_at: None,
      canceled_at: None,
      audit: Audit {
        created_by: actor.clone(),
        updated_by: actor,
      },
    };
    let order = ctx
      .run("order_store.insert", self.timeout(), self.deps.orders.insert(order))
      .await?;

    info!(order_id = %order.id, reorder_of = %source.id, "Reorder draft created.");
    self
      .publish(ctx, OrderEventKind::Created, &order, Metadata::new())
      .await;
    Ok(order)
  }

  #[instrument(name = "OrderService::get", skip(self, ctx), err(Display))]
  pub async fn get(&self, ctx: &RequestContext, order_id: &str) -> Result<Order> {
    self.load(ctx, order_id).await
  }

  /// Orders of `user_id`, newest first. A zero `limit` means the default page size.
  #[instrument(name = "OrderService::list_for_user", skip(self, ctx), err(Display))]
  pub async fn list_for_user(&self, ctx: &RequestContext, user_id: &str, limit: usize) -> Result<Vec<Order>> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
      return Err(CommerceError::InvalidInput("user id is required".to_string()));
    }
    let limit = match limit {
      0 => DEFAULT_LIST_LIMIT,
      n => n.min(MAX_LIST_LIMIT),
    };
    ctx
      .run("order_store.list_by_user", self.timeout(), self.deps.orders.list_by_user(user_id, limit))
      .await
  }

  // --- helpers ---

  async fn load(&self, ctx: &RequestContext, order_id: &str) -> Result<Order> {
    let order_id = order_id.trim();
    if order_id.is_empty() {
      return Err(CommerceError::InvalidInput("order id is required".to_string()));
    }
    ctx
      .run("order_store.find_by_id", self.timeout(), self.deps.orders.find_by_id(order_id))
      .await
  }

  /// Runs a batch that writes exactly one order and returns it as stored.
  async fn execute_single(&self, ctx: &RequestContext, batch: WriteBatch) -> Result<Order> {
    let written = ctx
      .run("unit_of_work.execute", self.timeout(), self.deps.unit_of_work.execute(batch))
      .await?;
    written
      .into_iter()
      .next()
      .ok_or_else(|| CommerceError::Unavailable("unit of work wrote no order".to_string()))
  }

  async fn next_order_number(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Result<String> {
    let year = now.year();
    let sequence = format!("order_number:{}", year);
    let seq = ctx
      .run("counter.next", self.timeout(), self.deps.counter.next(&sequence, 1))
      .await?;
    Ok(format!("{}-{:04}-{:06}", self.deps.config.order_number_prefix, year, seq))
  }

  async fn publish(&self, ctx: &RequestContext, kind: OrderEventKind, order: &Order, metadata: Metadata) {
    let order_event = OrderEvent {
      kind,
      order_id: order.id.clone(),
      user_id: order.user_id.clone(),
      status: order.status,
      occurred_at: self.deps.clock.now(),
      metadata,
    };
    let outcome = ctx
      .guard("events.publish", self.timeout(), self.deps.events.publish(order_event))
      .await;
    let failure = match outcome {
      Ok(Ok(())) => return,
      Ok(Err(e)) => e.to_string(),
      Err(e) => e.to_string(),
    };
    warn!(topic = kind.topic(), order_id = %order.id, error = %failure, "Order event publish failed.");
  }
}
