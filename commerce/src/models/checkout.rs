// commerce/src/models/checkout.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::Cart;
use super::Metadata;
use crate::errors::{CommerceError, Result};

/// Key under `cart.metadata` holding the checkout sub-document.
pub const CHECKOUT_KEY: &str = "checkout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
  Pending,
  PendingCapture,
  Confirmed,
  Failed,
}

impl CheckoutStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      CheckoutStatus::Pending => "pending",
      CheckoutStatus::PendingCapture => "pending_capture",
      CheckoutStatus::Confirmed => "confirmed",
      CheckoutStatus::Failed => "failed",
    }
  }

  /// Payment accepted by the client flow; confirmation is a no-op from here.
  pub fn is_settled(&self) -> bool {
    matches!(self, CheckoutStatus::PendingCapture | CheckoutStatus::Confirmed)
  }
}

impl std::fmt::Display for CheckoutStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Checkout state embedded on the owning cart (`cart.metadata["checkout"]`).
///
/// Keys this type does not know are kept in `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub session_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provider: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_secret: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub redirect_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub intent_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expires_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub idempotency_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reservation_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reservation_expires_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub order_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<CheckoutStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(flatten)]
  pub extra: Metadata,
}

const KNOWN_KEYS: [&str; 14] = [
  "sessionId",
  "provider",
  "clientSecret",
  "redirectUrl",
  "intentId",
  "expiresAt",
  "idempotencyKey",
  "reservationId",
  "reservationExpiresAt",
  "workflowId",
  "orderId",
  "status",
  "createdAt",
  "updatedAt",
];

impl CheckoutMetadata {
  /// Parses the checkout sub-document of `cart`, `None` when the cart has none.
  pub fn from_cart(cart: &Cart) -> Result<Option<Self>> {
    match cart.metadata.get(CHECKOUT_KEY) {
      None | Some(serde_json::Value::Null) => Ok(None),
      Some(value) => serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| CommerceError::InvalidInput(format!("cart {} has malformed checkout metadata: {}", cart.id, e))),
    }
  }

  /// Keys of the existing sub-document that this type does not manage. Tolerates a
  /// malformed document, since a fresh session overwrites every known key anyway.
  ///
  /// Managed keys such as `workflowId` and `orderId` belong to the previous session;
  /// carrying them into a new one would make confirmation skip dispatch for it.
  pub fn foreign_keys(cart: &Cart) -> Metadata {
    match cart.metadata.get(CHECKOUT_KEY) {
      Some(serde_json::Value::Object(existing)) => existing
        .iter()
        .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
      _ => Metadata::new(),
    }
  }

  /// Writes this document into `cart.metadata["checkout"]`.
  pub fn store_into(&self, cart: &mut Cart) -> Result<()> {
    let value = serde_json::to_value(self)?;
    cart.metadata.insert(CHECKOUT_KEY.to_string(), value);
    Ok(())
  }
}
