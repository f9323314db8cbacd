// commerce/src/services/events.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{event, Level};

use crate::models::{Metadata, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderEventKind {
  #[serde(rename = "order.created")]
  Created,
  #[serde(rename = "order.status.changed")]
  StatusChanged,
  #[serde(rename = "order.production.event.appended")]
  ProductionEventAppended,
  #[serde(rename = "order.invoice.requested")]
  InvoiceRequested,
}

impl OrderEventKind {
  pub fn topic(&self) -> &'static str {
    match self {
      OrderEventKind::Created => "order.created",
      OrderEventKind::StatusChanged => "order.status.changed",
      OrderEventKind::ProductionEventAppended => "order.production.event.appended",
      OrderEventKind::InvoiceRequested => "order.invoice.requested",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
  pub kind: OrderEventKind,
  pub order_id: String,
  pub user_id: String,
  pub status: OrderStatus,
  pub occurred_at: DateTime<Utc>,
  pub metadata: Metadata,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

/// Fire-and-forget domain event sink. Callers log failures and move on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
  async fn publish(&self, event: OrderEvent) -> Result<(), PublishError>;
}

/// Default publisher: emits each event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
  async fn publish(&self, order_event: OrderEvent) -> Result<(), PublishError> {
    event!(
      Level::INFO,
      topic = order_event.kind.topic(),
      order_id = %order_event.order_id,
      status = %order_event.status,
      "Order event published."
    );
    Ok(())
  }
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
  events: Mutex<Vec<OrderEvent>>,
  failing: Mutex<bool>,
}

impl RecordingEventPublisher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<OrderEvent> {
    self.events.lock().clone()
  }

  pub fn topics(&self) -> Vec<&'static str> {
    self.events.lock().iter().map(|e| e.kind.topic()).collect()
  }

  /// While set, every publish fails without recording.
  pub fn set_failing(&self, failing: bool) {
    *self.failing.lock() = failing;
  }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
  async fn publish(&self, order_event: OrderEvent) -> Result<(), PublishError> {
    if *self.failing.lock() {
      return Err(PublishError("broker rejected the event".to_string()));
    }
    self.events.lock().push(order_event);
    Ok(())
  }
}
