// commerce/src/services/order_store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::cart_store::StoreError;
use crate::models::{Order, ProductionEventRecord};

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Inserts a new order; `Duplicate` if the id is taken. Returns the stored order.
  async fn insert(&self, order: Order) -> Result<Order, StoreError>;

  /// Replaces an order if its stored `updated_at` equals `expected_version`.
  async fn update(&self, order: Order, expected_version: DateTime<Utc>) -> Result<Order, StoreError>;

  async fn find_by_id(&self, order_id: &str) -> Result<Order, StoreError>;

  /// Orders of `user_id`, newest first.
  async fn list_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<Order>, StoreError>;
}

/// One write inside a `WriteBatch`.
#[derive(Debug, Clone)]
pub enum WriteOp {
  InsertOrder(Order),
  UpdateOrder {
    order: Order,
    expected_version: DateTime<Utc>,
  },
  InsertProductionEvent(ProductionEventRecord),
  CommitReservation {
    reservation_id: String,
    order_id: String,
  },
}

/// Writes that are applied all together or not at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
  ops: Vec<WriteOp>,
}

impl WriteBatch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn commit_reservation(mut self, reservation_id: impl Into<String>, order_id: impl Into<String>) -> Self {
    self.ops.push(WriteOp::CommitReservation {
      reservation_id: reservation_id.into(),
      order_id: order_id.into(),
    });
    self
  }

  pub fn insert_order(mut self, order: Order) -> Self {
    self.ops.push(WriteOp::InsertOrder(order));
    self
  }

  pub fn update_order(mut self, order: Order, expected_version: DateTime<Utc>) -> Self {
    self.ops.push(WriteOp::UpdateOrder { order, expected_version });
    self
  }

  pub fn insert_production_event(mut self, record: ProductionEventRecord) -> Self {
    self.ops.push(WriteOp::InsertProductionEvent(record));
    self
  }

  pub fn ops(&self) -> &[WriteOp] {
    &self.ops
  }

  pub fn into_ops(self) -> Vec<WriteOp> {
    self.ops
  }

  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
  /// Applies every op in order, atomically. Returns the orders as stored (inserted or
  /// updated), in op order.
  async fn execute(&self, batch: WriteBatch) -> Result<Vec<Order>, StoreError>;
}
