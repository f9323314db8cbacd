// commerce/src/checkout/mod.rs

//! Checkout orchestration: the reserve, pay and persist saga that opens a payment session,
//! and the confirmation flow that settles it.

pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CommerceError, Result};
use crate::models::{CheckoutStatus, Metadata};

pub use service::CheckoutService;

/// Release reason when the payment session could not be opened, or the payment failed.
pub const RELEASE_PAYMENT_FAILED: &str = "checkout_payment_failed";
/// Release reason when the checkout metadata could not be written to the cart.
pub const RELEASE_PERSIST_FAILED: &str = "checkout_persist_failed";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCheckout {
  pub user_id: String,
  /// When given, must name the user's active cart.
  #[serde(default)]
  pub cart_id: Option<String>,
  pub success_url: String,
  pub cancel_url: String,
  /// Payment service provider, e.g. `stripe`.
  pub psp: String,
  #[serde(default)]
  pub metadata: Metadata,
}

impl StartCheckout {
  pub fn validate(&self) -> Result<()> {
    let required = [
      ("user id", &self.user_id),
      ("success url", &self.success_url),
      ("cancel url", &self.cancel_url),
      ("payment provider", &self.psp),
    ];
    match required.iter().find(|(_, value)| value.trim().is_empty()) {
      Some((name, _)) => Err(CommerceError::InvalidInput(format!("{} is required", name))),
      None => Ok(()),
    }
  }
}

/// What the client needs to continue on the provider's hosted page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionDescriptor {
  pub session_id: String,
  pub provider: String,
  pub client_secret: Option<String>,
  pub redirect_url: Option<String>,
  pub expires_at: DateTime<Utc>,
  pub idempotency_key: String,
  pub reservation_id: Option<String>,
  pub reservation_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationOutcome {
  pub status: CheckoutStatus,
  pub session_id: String,
  pub order_id: Option<String>,
  pub workflow_id: Option<String>,
}
