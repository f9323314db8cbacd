// commerce/src/services/memory_db.rs

//! In-memory persistence and inventory. One mutex guards the whole state, so every
//! operation is atomic; a unit of work is applied to a copy and swapped in on success.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, instrument, Level};

use super::cart_store::{CartStore, StoreError};
use super::clock::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
use super::counter::Counter;
use super::inventory::{Inventory, InventoryError, Reservation, ReservationLine, ReservationStatus};
use super::order_store::{OrderStore, UnitOfWork, WriteBatch, WriteOp};
use crate::models::{Cart, Order, ProductionEventRecord};

/// Reason recorded when a hold outlives its TTL.
pub const TTL_EXPIRED_REASON: &str = "ttl_expired";

#[derive(Debug, Clone, Default)]
struct DbState {
  carts: HashMap<String, Cart>,
  orders: HashMap<String, Order>,
  production_events: Vec<ProductionEventRecord>,
  stock: HashMap<String, i64>,
  reservations: HashMap<String, Reservation>,
  reservation_keys: HashMap<String, String>,
  counters: HashMap<String, i64>,
}

#[derive(Debug, Default)]
struct Faults {
  next_cart_write: Option<StoreError>,
  next_batch: Option<StoreError>,
  next_release: Option<InventoryError>,
  next_reserve: Option<InventoryError>,
}

pub struct MemoryDatabase {
  state: Mutex<DbState>,
  faults: Mutex<Faults>,
  clock: Arc<dyn Clock>,
  ids: Arc<dyn IdGenerator>,
}

impl Default for MemoryDatabase {
  fn default() -> Self {
    Self::new(Arc::new(SystemClock))
  }
}

impl MemoryDatabase {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      state: Mutex::new(DbState::default()),
      faults: Mutex::new(Faults::default()),
      clock,
      ids: Arc::new(UuidIdGenerator),
    }
  }

  pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = ids;
    self
  }

  // --- Seeding and inspection ---

  pub fn set_stock(&self, sku: &str, on_hand: i64) {
    self.state.lock().stock.insert(sku.to_string(), on_hand);
  }

  pub fn stock_level(&self, sku: &str) -> Option<i64> {
    let now = self.clock.now();
    let mut state = self.state.lock();
    state.expire_stale(now);
    state.stock.get(sku).copied()
  }

  /// Stores `cart` as-is, keeping the version it carries.
  pub fn seed_cart(&self, cart: Cart) {
    self.state.lock().carts.insert(cart.user_id.clone(), cart);
  }

  pub fn cart(&self, user_id: &str) -> Option<Cart> {
    self.state.lock().carts.get(user_id).cloned()
  }

  pub fn order(&self, order_id: &str) -> Option<Order> {
    self.state.lock().orders.get(order_id).cloned()
  }

  pub fn reservation(&self, reservation_id: &str) -> Option<Reservation> {
    let now = self.clock.now();
    let mut state = self.state.lock();
    state.expire_stale(now);
    state.reservations.get(reservation_id).cloned()
  }

  pub fn production_events(&self, order_id: &str) -> Vec<ProductionEventRecord> {
    self
      .state
      .lock()
      .production_events
      .iter()
      .filter(|e| e.order_id == order_id)
      .cloned()
      .collect()
  }

  // --- Failure injection ---

  pub fn fail_next_cart_write(&self, err: StoreError) {
    self.faults.lock().next_cart_write = Some(err);
  }

  pub fn fail_next_batch(&self, err: StoreError) {
    self.faults.lock().next_batch = Some(err);
  }

  pub fn fail_next_release(&self, err: InventoryError) {
    self.faults.lock().next_release = Some(err);
  }

  pub fn fail_next_reserve(&self, err: InventoryError) {
    self.faults.lock().next_reserve = Some(err);
  }
}

/// Next version after `previous`: the current time, or one microsecond past `previous`
/// when the clock has not moved.
fn next_version(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
  match previous {
    Some(prev) if now <= prev => prev + ChronoDuration::microseconds(1),
    _ => now,
  }
}

fn settled_state(status: &ReservationStatus) -> String {
  match status {
    ReservationStatus::Held => "held".to_string(),
    ReservationStatus::Committed { order_id } => format!("committed to {}", order_id),
    ReservationStatus::Released { reason } => format!("released ({})", reason),
  }
}

impl DbState {
  /// Releases every live hold whose TTL has passed.
  fn expire_stale(&mut self, now: DateTime<Utc>) {
    let expired: Vec<String> = self
      .reservations
      .values()
      .filter(|r| r.status == ReservationStatus::Held && r.expires_at <= now)
      .map(|r| r.id.clone())
      .collect();
    for id in expired {
      event!(Level::DEBUG, reservation_id = %id, "Reservation hold expired.");
      self.release(&id, TTL_EXPIRED_REASON);
    }
  }

  fn release(&mut self, reservation_id: &str, reason: &str) {
    let Some(reservation) = self.reservations.get_mut(reservation_id) else {
      return;
    };
    if reservation.status != ReservationStatus::Held {
      return;
    }
    for line in &reservation.lines {
      *self.stock.entry(line.sku.clone()).or_insert(0) += line.quantity;
    }
    reservation.status = ReservationStatus::Released {
      reason: reason.to_string(),
    };
  }

  fn commit(&mut self, reservation_id: &str, order_id: &str) -> Result<(), InventoryError> {
    let reservation = self
      .reservations
      .get_mut(reservation_id)
      .ok_or_else(|| InventoryError::NotFound(reservation_id.to_string()))?;
    if reservation.status == ReservationStatus::Held {
      reservation.status = ReservationStatus::Committed {
        order_id: order_id.to_string(),
      };
      return Ok(());
    }
    match &reservation.status {
      ReservationStatus::Committed { order_id: committed_to } if committed_to == order_id => Ok(()),
      other => Err(InventoryError::AlreadySettled {
        id: reservation_id.to_string(),
        state: settled_state(other),
      }),
    }
  }

  fn insert_order(&mut self, mut order: Order, now: DateTime<Utc>) -> Result<Order, StoreError> {
    if self.orders.contains_key(&order.id) {
      return Err(StoreError::Duplicate(format!("order {}", order.id)));
    }
    order.updated_at = now;
    self.orders.insert(order.id.clone(), order.clone());
    Ok(order)
  }

  fn update_order(
    &mut self,
    mut order: Order,
    expected_version: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<Order, StoreError> {
    let stored = self
      .orders
      .get(&order.id)
      .ok_or_else(|| StoreError::NotFound(format!("order {}", order.id)))?;
    if stored.updated_at != expected_version {
      return Err(StoreError::Conflict(format!("order {}", order.id)));
    }
    order.updated_at = next_version(now, Some(stored.updated_at));
    self.orders.insert(order.id.clone(), order.clone());
    Ok(order)
  }
}

#[async_trait]
impl CartStore for MemoryDatabase {
  async fn get_cart(&self, user_id: &str) -> Result<Cart, StoreError> {
    self
      .state
      .lock()
      .carts
      .get(user_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("cart of user {}", user_id)))
  }

  #[instrument(name = "MemoryDatabase::upsert_cart", skip_all, fields(cart_id = %cart.id), err(Display))]
  async fn upsert_cart(&self, mut cart: Cart, expected_version: Option<DateTime<Utc>>) -> Result<Cart, StoreError> {
    if let Some(err) = self.faults.lock().next_cart_write.take() {
      return Err(err);
    }
    let now = self.clock.now();
    let mut state = self.state.lock();
    let previous = state.carts.get(&cart.user_id).map(|c| c.updated_at);
    if let Some(expected) = expected_version {
      match previous {
        None => return Err(StoreError::NotFound(format!("cart {}", cart.id))),
        Some(stored) if stored != expected => return Err(StoreError::Conflict(format!("cart {}", cart.id))),
        Some(_) => {}
      }
    }
    cart.updated_at = next_version(now, previous);
    state.carts.insert(cart.user_id.clone(), cart.clone());
    Ok(cart)
  }
}

#[async_trait]
impl OrderStore for MemoryDatabase {
  async fn insert(&self, order: Order) -> Result<Order, StoreError> {
    let now = self.clock.now();
    self.state.lock().insert_order(order, now)
  }

  async fn update(&self, order: Order, expected_version: DateTime<Utc>) -> Result<Order, StoreError> {
    let now = self.clock.now();
    self.state.lock().update_order(order, expected_version, now)
  }

  async fn find_by_id(&self, order_id: &str) -> Result<Order, StoreError> {
    self
      .state
      .lock()
      .orders
      .get(order_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))
  }

  async fn list_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<Order>, StoreError> {
    let mut orders: Vec<Order> = self
      .state
      .lock()
      .orders
      .values()
      .filter(|o| o.user_id == user_id)
      .cloned()
      .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    orders.truncate(limit);
    Ok(orders)
  }
}

#[async_trait]
impl UnitOfWork for MemoryDatabase {
  #[instrument(name = "MemoryDatabase::execute", skip_all, fields(ops = batch.ops().len()), err(Display))]
  async fn execute(&self, batch: WriteBatch) -> Result<Vec<Order>, StoreError> {
    if let Some(err) = self.faults.lock().next_batch.take() {
      return Err(err);
    }
    let now = self.clock.now();
    let mut state = self.state.lock();
    state.expire_stale(now);

    let mut draft = state.clone();
    let mut written = Vec::new();
    for op in batch.into_ops() {
      match op {
        WriteOp::CommitReservation {
          reservation_id,
          order_id,
        } => draft.commit(&reservation_id, &order_id)?,
        WriteOp::InsertOrder(order) => written.push(draft.insert_order(order, now)?),
        WriteOp::UpdateOrder {
          order,
          expected_version,
        } => written.push(draft.update_order(order, expected_version, now)?),
        WriteOp::InsertProductionEvent(record) => draft.production_events.push(record),
      }
    }
    *state = draft;
    Ok(written)
  }
}

#[async_trait]
impl Inventory for MemoryDatabase {
  #[instrument(name = "MemoryDatabase::reserve_stocks", skip_all, fields(lines = lines.len()), err(Display))]
  async fn reserve_stocks(
    &self,
    lines: &[ReservationLine],
    ttl: Duration,
    idempotency_key: &str,
  ) -> Result<Reservation, InventoryError> {
    if let Some(err) = self.faults.lock().next_reserve.take() {
      return Err(err);
    }
    if lines.is_empty() {
      return Err(InventoryError::InvalidInput("no lines to reserve".to_string()));
    }
    let ttl = ChronoDuration::from_std(ttl).map_err(|e| InventoryError::InvalidInput(format!("ttl: {}", e)))?;
    let now = self.clock.now();
    let mut state = self.state.lock();
    state.expire_stale(now);

    let key = idempotency_key.trim();
    if !key.is_empty() {
      if let Some(existing) = state.reservation_keys.get(key).and_then(|id| state.reservations.get(id)) {
        if existing.status == ReservationStatus::Held {
          event!(Level::DEBUG, reservation_id = %existing.id, "Returning live reservation for idempotency key.");
          return Ok(existing.clone());
        }
      }
    }

    let mut wanted: HashMap<&str, i64> = HashMap::new();
    for line in lines {
      if line.sku.trim().is_empty() || line.quantity <= 0 {
        return Err(InventoryError::InvalidInput(format!(
          "line '{}' x {} is not reservable",
          line.sku, line.quantity
        )));
      }
      *wanted.entry(line.sku.as_str()).or_insert(0) += line.quantity;
    }
    for (sku, requested) in &wanted {
      let available = *state
        .stock
        .get(*sku)
        .ok_or_else(|| InventoryError::InvalidInput(format!("unknown sku {}", sku)))?;
      if available < *requested {
        return Err(InventoryError::InsufficientStock {
          sku: sku.to_string(),
          requested: *requested,
          available,
        });
      }
    }
    for (sku, requested) in &wanted {
      if let Some(on_hand) = state.stock.get_mut(*sku) {
        *on_hand -= requested;
      }
    }

    let reservation = Reservation {
      id: self.ids.new_id("res"),
      lines: lines.to_vec(),
      expires_at: now + ttl,
      idempotency_key: Some(key.to_string()).filter(|k| !k.is_empty()),
      status: ReservationStatus::Held,
    };
    if let Some(k) = &reservation.idempotency_key {
      state.reservation_keys.insert(k.clone(), reservation.id.clone());
    }
    state.reservations.insert(reservation.id.clone(), reservation.clone());
    Ok(reservation)
  }

  async fn release_reservation(&self, reservation_id: &str, reason: &str) -> Result<(), InventoryError> {
    if let Some(err) = self.faults.lock().next_release.take() {
      return Err(err);
    }
    let now = self.clock.now();
    let mut state = self.state.lock();
    state.expire_stale(now);
    let status = state
      .reservations
      .get(reservation_id)
      .map(|r| r.status.clone())
      .ok_or_else(|| InventoryError::NotFound(reservation_id.to_string()))?;
    match status {
      ReservationStatus::Held => {
        state.release(reservation_id, reason);
        Ok(())
      }
      ReservationStatus::Released { .. } => Ok(()),
      committed @ ReservationStatus::Committed { .. } => Err(InventoryError::AlreadySettled {
        id: reservation_id.to_string(),
        state: settled_state(&committed),
      }),
    }
  }

  async fn commit_reservation(&self, reservation_id: &str, order_id: &str) -> Result<(), InventoryError> {
    let now = self.clock.now();
    let mut state = self.state.lock();
    state.expire_stale(now);
    state.commit(reservation_id, order_id)
  }
}

#[async_trait]
impl Counter for MemoryDatabase {
  async fn next(&self, sequence: &str, increment: i64) -> Result<i64, StoreError> {
    let mut state = self.state.lock();
    let value = state.counters.entry(sequence.to_string()).or_insert(0);
    *value += increment;
    Ok(*value)
  }
}
