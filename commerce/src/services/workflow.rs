// commerce/src/services/workflow.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input of the asynchronous order-finalization workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutWorkflowPayload {
  pub user_id: String,
  pub cart_id: String,
  pub session_id: String,
  pub provider: Option<String>,
  pub intent_id: Option<String>,
  pub reservation_id: Option<String>,
  pub order_id: Option<String>,
  /// `checkout:{cart_id}:{session_id}`; the dispatcher starts at most one workflow per key.
  pub idempotency_key: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
  #[error("workflow dispatcher unavailable: {0}")]
  Unavailable(String),

  #[error("workflow rejected: {0}")]
  Rejected(String),
}

#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
  /// Starts the finalization workflow and returns its id.
  async fn dispatch_checkout_workflow(&self, payload: CheckoutWorkflowPayload) -> Result<String, DispatchError>;
}
