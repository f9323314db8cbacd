// commerce/src/services/inventory.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
  pub sku: String,
  pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReservationStatus {
  Held,
  Committed { order_id: String },
  Released { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
  pub id: String,
  pub lines: Vec<ReservationLine>,
  pub expires_at: DateTime<Utc>,
  pub idempotency_key: Option<String>,
  pub status: ReservationStatus,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InventoryError {
  #[error("insufficient stock for {sku}: requested {requested}, available {available}")]
  InsufficientStock {
    sku: String,
    requested: i64,
    available: i64,
  },

  #[error("invalid reservation request: {0}")]
  InvalidInput(String),

  #[error("reservation {0} not found")]
  NotFound(String),

  /// The reservation was already committed or released.
  #[error("reservation {id} already {state}")]
  AlreadySettled { id: String, state: String },

  #[error("inventory unavailable: {0}")]
  Unavailable(String),
}

#[async_trait]
pub trait Inventory: Send + Sync {
  /// Holds stock for `lines` until `ttl` elapses. Repeating a call with the same
  /// `idempotency_key` while the first hold is live returns that hold.
  async fn reserve_stocks(
    &self,
    lines: &[ReservationLine],
    ttl: Duration,
    idempotency_key: &str,
  ) -> Result<Reservation, InventoryError>;

  /// Returns held stock. Releasing an already released reservation is a no-op.
  async fn release_reservation(&self, reservation_id: &str, reason: &str) -> Result<(), InventoryError>;

  /// Turns a hold into a sale for `order_id`.
  async fn commit_reservation(&self, reservation_id: &str, order_id: &str) -> Result<(), InventoryError>;
}
