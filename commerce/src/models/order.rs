// commerce/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::cart::{Address, CartItem};
use super::money::{AmountOverflow, Totals};
use super::Metadata;
use crate::errors::CommerceError;

/// Keys the lifecycle service writes into `Order::metadata`.
pub mod metadata_keys {
  pub const CART_ID: &str = "cartId";
  pub const REORDER_OF: &str = "reorderOf";
  pub const INVOICE_REQUESTED_AT: &str = "invoiceRequestedAt";
  pub const INVOICE_REQUESTED_BY: &str = "invoiceRequestedBy";
  pub const INVOICE_NOTES: &str = "invoiceNotes";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Draft,
  PendingPayment,
  Paid,
  InProduction,
  ReadyToShip,
  Shipped,
  Delivered,
  Completed,
  Canceled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 9] = [
    OrderStatus::Draft,
    OrderStatus::PendingPayment,
    OrderStatus::Paid,
    OrderStatus::InProduction,
    OrderStatus::ReadyToShip,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
    OrderStatus::Completed,
    OrderStatus::Canceled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Draft => "draft",
      OrderStatus::PendingPayment => "pending_payment",
      OrderStatus::Paid => "paid",
      OrderStatus::InProduction => "in_production",
      OrderStatus::ReadyToShip => "ready_to_ship",
      OrderStatus::Shipped => "shipped",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Completed => "completed",
      OrderStatus::Canceled => "canceled",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = CommerceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim();
    OrderStatus::ALL
      .iter()
      .copied()
      .find(|status| status.as_str() == wanted)
      .ok_or_else(|| CommerceError::InvalidInput(format!("unknown order status '{}'", s)))
  }
}

/// Snapshot of a cart line at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub product_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(default)]
  pub options: Metadata,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub design_id: Option<String>,
  pub quantity: i64,
  pub unit_price: i64,
  pub line_total: i64,
}

impl TryFrom<&CartItem> for OrderItem {
  type Error = AmountOverflow;

  fn try_from(item: &CartItem) -> Result<Self, Self::Error> {
    Ok(Self {
      product_id: item.product_id.clone(),
      sku: item.sku.clone(),
      options: item.options.clone(),
      design_id: item.design_id.clone(),
      quantity: item.quantity,
      unit_price: item.unit_price,
      line_total: item.resolved_line_total()?,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionSnapshot {
  pub code: String,
  pub discount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSummary {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_event_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_event_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub station: Option<String>,
  #[serde(default)]
  pub on_hold: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
  pub created_by: String,
  pub updated_by: String,
}

/// An order. Mutated only through `orders::state_machine`; `updated_at` is its version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: String,
  pub order_number: String,
  pub user_id: String,
  pub status: OrderStatus,
  pub currency: String,
  pub totals: Totals,
  pub items: Vec<OrderItem>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shipping_address: Option<Address>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub billing_address: Option<Address>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub promotion: Option<PromotionSnapshot>,
  #[serde(default)]
  pub metadata: Metadata,
  #[serde(default)]
  pub production: ProductionSummary,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cancel_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub placed_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub paid_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shipped_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub delivered_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub canceled_at: Option<DateTime<Utc>>,
  pub audit: Audit,
}
