// commerce/src/services/cart_store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::inventory::InventoryError;
use crate::models::Cart;

/// Failures reported by the persistence collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
  #[error("{0} not found")]
  NotFound(String),

  /// The stored version differs from the version the write was based on.
  #[error("version conflict on {0}")]
  Conflict(String),

  #[error("{0} already exists")]
  Duplicate(String),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  /// An inventory operation inside a unit of work failed; nothing was written.
  #[error(transparent)]
  Inventory(#[from] InventoryError),
}

#[async_trait]
pub trait CartStore: Send + Sync {
  /// Loads the active cart of `user_id`.
  async fn get_cart(&self, user_id: &str) -> Result<Cart, StoreError>;

  /// Writes `cart`. With `expected_version` the write only succeeds if the stored cart still
  /// carries that `updated_at`; without it the cart is written unconditionally. Returns the
  /// stored cart with its new version.
  async fn upsert_cart(&self, cart: Cart, expected_version: Option<DateTime<Utc>>) -> Result<Cart, StoreError>;
}
