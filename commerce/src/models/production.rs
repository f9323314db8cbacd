// commerce/src/models/production.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Metadata;
use crate::errors::CommerceError;

/// Events reported by the production floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionEventType {
  Queued,
  Engraving,
  Polishing,
  Qc,
  OnHold,
  Rework,
  Packed,
  Completed,
  InTransit,
  Canceled,
}

impl ProductionEventType {
  pub const ALL: [ProductionEventType; 10] = [
    ProductionEventType::Queued,
    ProductionEventType::Engraving,
    ProductionEventType::Polishing,
    ProductionEventType::Qc,
    ProductionEventType::OnHold,
    ProductionEventType::Rework,
    ProductionEventType::Packed,
    ProductionEventType::Completed,
    ProductionEventType::InTransit,
    ProductionEventType::Canceled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ProductionEventType::Queued => "queued",
      ProductionEventType::Engraving => "engraving",
      ProductionEventType::Polishing => "polishing",
      ProductionEventType::Qc => "qc",
      ProductionEventType::OnHold => "on_hold",
      ProductionEventType::Rework => "rework",
      ProductionEventType::Packed => "packed",
      ProductionEventType::Completed => "completed",
      ProductionEventType::InTransit => "in_transit",
      ProductionEventType::Canceled => "canceled",
    }
  }
}

impl fmt::Display for ProductionEventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ProductionEventType {
  type Err = CommerceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_ascii_lowercase();
    ProductionEventType::ALL
      .iter()
      .copied()
      .find(|t| t.as_str() == wanted)
      .ok_or_else(|| CommerceError::InvalidInput(format!("unknown production event type '{}'", s)))
  }
}

/// A production event as submitted by a station. `event_type` is validated on ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionEventInput {
  #[serde(rename = "type")]
  pub event_type: String,
  #[serde(default)]
  pub station: Option<String>,
  #[serde(default)]
  pub note: Option<String>,
  #[serde(default)]
  pub occurred_at: Option<DateTime<Utc>>,
  pub actor: String,
  #[serde(default)]
  pub metadata: Metadata,
}

/// Stored production event, written in the same unit of work as the order update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionEventRecord {
  pub id: String,
  pub order_id: String,
  #[serde(rename = "type")]
  pub event_type: ProductionEventType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub station: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
  pub occurred_at: DateTime<Utc>,
  pub recorded_at: DateTime<Utc>,
  pub actor: String,
  #[serde(default)]
  pub metadata: Metadata,
}
