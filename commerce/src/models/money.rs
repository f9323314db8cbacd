// commerce/src/models/money.rs

use serde::{Deserialize, Serialize};

/// Monetary breakdown in minor currency units (cents, or whole yen for JPY).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
  pub subtotal: i64,
  #[serde(default)]
  pub discount: i64,
  #[serde(default)]
  pub shipping: i64,
  #[serde(default)]
  pub tax: i64,
  #[serde(default)]
  pub fees: i64,
  pub total: i64,
}

/// An amount that does not fit in `i64` minor units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} overflows the representable amount")]
pub struct AmountOverflow(pub String);

impl Totals {
  /// Builds totals from components. The total never goes below zero.
  pub fn from_components(
    subtotal: i64,
    discount: i64,
    shipping: i64,
    tax: i64,
    fees: i64,
  ) -> Result<Self, AmountOverflow> {
    let total = subtotal
      .checked_sub(discount)
      .and_then(|t| t.checked_add(shipping))
      .and_then(|t| t.checked_add(tax))
      .and_then(|t| t.checked_add(fees))
      .ok_or_else(|| AmountOverflow("order total".to_string()))?
      .max(0);
    Ok(Self {
      subtotal,
      discount,
      shipping,
      tax,
      fees,
      total,
    })
  }
}

/// Canonical ISO-4217 form: trimmed, upper-case.
pub fn normalize_currency(code: &str) -> String {
  code.trim().to_ascii_uppercase()
}
