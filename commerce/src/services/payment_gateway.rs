// commerce/src/services/payment_gateway.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLineItem {
  pub product_id: String,
  pub sku: Option<String>,
  pub quantity: i64,
  pub unit_amount: i64,
  pub amount: i64,
}

/// Everything the gateway needs to open a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionRequest {
  pub provider: String,
  pub user_id: String,
  pub cart_id: String,
  /// Minor units.
  pub amount: i64,
  pub currency: String,
  pub line_items: Vec<PaymentLineItem>,
  pub idempotency_key: String,
  pub promotion_applied: bool,
  pub success_url: String,
  pub cancel_url: String,
  #[serde(default)]
  pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
  pub id: String,
  pub provider: String,
  pub client_secret: Option<String>,
  pub redirect_url: Option<String>,
  pub intent_id: Option<String>,
  pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Succeeded,
  Failed,
  Refunded,
  RequiresAction,
  Canceled,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
  #[error("unsupported payment provider '{0}'")]
  UnsupportedProvider(String),

  #[error("payment request rejected: {0}")]
  InvalidRequest(String),

  #[error("payment declined: {0}")]
  Declined(String),

  #[error("payment gateway unavailable: {0}")]
  Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_checkout_session(&self, request: PaymentSessionRequest) -> Result<PaymentSession, GatewayError>;

  async fn lookup_payment(&self, intent_id: &str) -> Result<PaymentStatus, GatewayError>;
}
