// commerce/src/services/workflow_mock.rs

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{event, Level};
use uuid::Uuid;

use super::workflow::{CheckoutWorkflowPayload, DispatchError, WorkflowDispatcher};

#[derive(Debug, Default)]
struct DispatcherState {
  by_key: HashMap<String, String>,
  payloads: Vec<CheckoutWorkflowPayload>,
  calls: usize,
  fail_next: Option<DispatchError>,
}

/// Records dispatches and starts at most one workflow per idempotency key.
#[derive(Debug, Default)]
pub struct RecordingWorkflowDispatcher {
  state: Mutex<DispatcherState>,
}

impl RecordingWorkflowDispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of dispatch calls received, duplicates included.
  pub fn calls(&self) -> usize {
    self.state.lock().calls
  }

  /// Number of distinct workflows started.
  pub fn started(&self) -> usize {
    self.state.lock().by_key.len()
  }

  pub fn payloads(&self) -> Vec<CheckoutWorkflowPayload> {
    self.state.lock().payloads.clone()
  }

  pub fn fail_next(&self, err: DispatchError) {
    self.state.lock().fail_next = Some(err);
  }
}

#[async_trait]
impl WorkflowDispatcher for RecordingWorkflowDispatcher {
  async fn dispatch_checkout_workflow(&self, payload: CheckoutWorkflowPayload) -> Result<String, DispatchError> {
    let mut state = self.state.lock();
    state.calls += 1;
    if let Some(err) = state.fail_next.take() {
      return Err(err);
    }
    if let Some(existing) = state.by_key.get(&payload.idempotency_key) {
      event!(Level::DEBUG, workflow_id = %existing, "Duplicate dispatch folded into running workflow.");
      return Ok(existing.clone());
    }
    let workflow_id = format!("wf_{}", Uuid::new_v4().simple());
    state.by_key.insert(payload.idempotency_key.clone(), workflow_id.clone());
    state.payloads.push(payload);
    Ok(workflow_id)
  }
}
