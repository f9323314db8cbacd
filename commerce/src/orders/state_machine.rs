// commerce/src/orders/state_machine.rs

//! Order status transition table and the function that applies a transition.
//!
//! No I/O happens here. Persistence and events are the lifecycle service's job.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use crate::errors::{CommerceError, Result};
use crate::models::{Order, OrderStatus, ProductionEventType};

static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
  use OrderStatus::*;
  let edges: [(OrderStatus, &[OrderStatus]); 7] = [
    (Draft, &[PendingPayment, Canceled]),
    (PendingPayment, &[Paid, Canceled]),
    (Paid, &[InProduction, ReadyToShip, Canceled]),
    (InProduction, &[ReadyToShip, Shipped, Canceled]),
    (ReadyToShip, &[Shipped, Canceled]),
    (Shipped, &[Delivered]),
    (Delivered, &[Completed]),
  ];
  edges
    .iter()
    .map(|(from, to)| (*from, to.iter().copied().collect()))
    .collect()
});

static PRODUCTION_STATUS: Lazy<HashMap<ProductionEventType, OrderStatus>> = Lazy::new(|| {
  use ProductionEventType::*;
  [
    (Queued, OrderStatus::InProduction),
    (Engraving, OrderStatus::InProduction),
    (Polishing, OrderStatus::InProduction),
    (Qc, OrderStatus::InProduction),
    (OnHold, OrderStatus::InProduction),
    (Rework, OrderStatus::InProduction),
    (Packed, OrderStatus::ReadyToShip),
    (Completed, OrderStatus::ReadyToShip),
    (InTransit, OrderStatus::Shipped),
    (Canceled, OrderStatus::Canceled),
  ]
  .into_iter()
  .collect()
});

/// Statuses from which an order may still be cancelled.
pub const CANCELLABLE: [OrderStatus; 5] = [
  OrderStatus::Draft,
  OrderStatus::PendingPayment,
  OrderStatus::Paid,
  OrderStatus::InProduction,
  OrderStatus::ReadyToShip,
];

/// True for a no-op (`current == target`) or an edge of the table.
pub fn can_transition(current: OrderStatus, target: OrderStatus) -> bool {
  current == target || TRANSITIONS.get(&current).is_some_and(|targets| targets.contains(&target))
}

pub fn is_cancellable(status: OrderStatus) -> bool {
  CANCELLABLE.contains(&status)
}

/// Statuses reachable in one step, in declaration order.
pub fn allowed_targets(current: OrderStatus) -> Vec<OrderStatus> {
  OrderStatus::ALL
    .into_iter()
    .filter(|t| *t != current && can_transition(current, *t))
    .collect()
}

/// Moves `order` to `target`, recording who did it and when.
///
/// The status-specific timestamp is stamped only if still unset.
pub fn apply_transition(order: &mut Order, target: OrderStatus, actor: &str, now: DateTime<Utc>) -> Result<()> {
  if !can_transition(order.status, target) {
    return Err(CommerceError::InvalidState(format!(
      "order {} cannot move from {} to {}",
      order.id, order.status, target
    )));
  }

  order.status = target;
  order.updated_at = now;
  order.audit.updated_by = actor.to_string();

  let stamp = match target {
    OrderStatus::PendingPayment => Some(&mut order.placed_at),
    OrderStatus::Paid => Some(&mut order.paid_at),
    OrderStatus::Shipped => Some(&mut order.shipped_at),
    OrderStatus::Delivered => Some(&mut order.delivered_at),
    OrderStatus::Completed => Some(&mut order.completed_at),
    OrderStatus::Canceled => Some(&mut order.canceled_at),
    OrderStatus::Draft | OrderStatus::InProduction | OrderStatus::ReadyToShip => None,
  };
  if let Some(slot) = stamp {
    slot.get_or_insert(now);
  }
  Ok(())
}

pub fn status_for_production_event(event_type: ProductionEventType) -> OrderStatus {
  PRODUCTION_STATUS
    .get(&event_type)
    .copied()
    .unwrap_or(OrderStatus::InProduction)
}

/// `on_hold` and `rework` put the order on hold; every other event clears the flag.
pub fn sets_hold(event_type: ProductionEventType) -> bool {
  matches!(event_type, ProductionEventType::OnHold | ProductionEventType::Rework)
}
