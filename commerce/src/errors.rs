// commerce/src/errors.rs

use stepflow::StepflowError;
use thiserror::Error;

use crate::services::cart_store::StoreError;
use crate::services::inventory::InventoryError;
use crate::services::payment_gateway::GatewayError;
use crate::services::workflow::DispatchError;

/// Error taxonomy surfaced by the order and checkout services.
///
/// Collaborator errors are translated into this enum at the service boundary; callers
/// (an HTTP layer, a job runner) map the variants onto their own transport codes.
#[derive(Debug, Error)]
pub enum CommerceError {
  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error("Not found: {0}")]
  NotFound(String),

  /// Version mismatch, or an expected-status guard that did not hold.
  #[error("Conflict: {0}")]
  Conflict(String),

  /// The requested status is structurally unreachable from the current one.
  #[error("Invalid state: {0}")]
  InvalidState(String),

  #[error("Unavailable: {0}")]
  Unavailable(String),

  #[error("Insufficient stock: {0}")]
  InsufficientStock(String),

  #[error("Payment failed: {0}")]
  PaymentFailed(String),

  #[error("Cart not ready for checkout: {0}")]
  CartNotReady(String),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Workflow error: {source}")]
  Workflow {
    #[from]
    source: StepflowError,
  },
}

impl CommerceError {
  /// Stable snake_case name of the variant, for logs and transport mapping.
  pub fn kind(&self) -> &'static str {
    match self {
      CommerceError::InvalidInput(_) => "invalid_input",
      CommerceError::NotFound(_) => "not_found",
      CommerceError::Conflict(_) => "conflict",
      CommerceError::InvalidState(_) => "invalid_state",
      CommerceError::Unavailable(_) => "unavailable",
      CommerceError::InsufficientStock(_) => "insufficient_stock",
      CommerceError::PaymentFailed(_) => "payment_failed",
      CommerceError::CartNotReady(_) => "cart_not_ready",
      CommerceError::Config(_) => "config",
      CommerceError::Workflow { .. } => "workflow",
    }
  }
}

impl From<StoreError> for CommerceError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound(m) => CommerceError::NotFound(m),
      StoreError::Conflict(m) => CommerceError::Conflict(m),
      StoreError::Duplicate(m) => CommerceError::Conflict(format!("duplicate: {}", m)),
      StoreError::Unavailable(m) => CommerceError::Unavailable(m),
      StoreError::Inventory(inner) => inner.into(),
    }
  }
}

impl From<InventoryError> for CommerceError {
  fn from(err: InventoryError) -> Self {
    match err {
      InventoryError::InsufficientStock { .. } => CommerceError::InsufficientStock(err.to_string()),
      InventoryError::InvalidInput(m) => CommerceError::InvalidInput(m),
      InventoryError::NotFound(m) => CommerceError::NotFound(format!("reservation {}", m)),
      InventoryError::AlreadySettled { .. } => CommerceError::Conflict(err.to_string()),
      InventoryError::Unavailable(m) => CommerceError::Unavailable(m),
    }
  }
}

/// Translation used for lookups. Session creation classifies gateway errors itself,
/// see `pipelines::checkout_pipeline::classify_session_error`.
impl From<GatewayError> for CommerceError {
  fn from(err: GatewayError) -> Self {
    match err {
      GatewayError::UnsupportedProvider(m) => CommerceError::InvalidInput(format!("unsupported payment provider: {}", m)),
      GatewayError::InvalidRequest(m) => CommerceError::InvalidInput(m),
      GatewayError::Declined(m) => CommerceError::PaymentFailed(m),
      GatewayError::Unavailable(m) => CommerceError::Unavailable(m),
    }
  }
}

impl From<DispatchError> for CommerceError {
  fn from(err: DispatchError) -> Self {
    CommerceError::Unavailable(err.to_string())
  }
}

impl From<serde_json::Error> for CommerceError {
  fn from(err: serde_json::Error) -> Self {
    CommerceError::InvalidInput(format!("malformed document: {}", err))
  }
}

pub type Result<T, E = CommerceError> = std::result::Result<T, E>;
