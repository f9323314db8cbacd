// commerce/src/models/cart.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::{normalize_currency, AmountOverflow, Totals};
use super::Metadata;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub recipient: Option<String>,
  pub line1: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line2: Option<String>,
  pub city: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub region: Option<String>,
  pub postal_code: String,
  pub country: String,
}

/// A promotion attached to the cart. Only an `applied` promotion may be checked out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartPromotion {
  pub code: String,
  #[serde(default)]
  pub discount: i64,
  #[serde(default)]
  pub applied: bool,
}

fn default_requires_shipping() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  pub id: String,
  pub product_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(default)]
  pub options: Metadata,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub design_id: Option<String>,
  pub quantity: i64,
  /// Minor units.
  pub unit_price: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line_total: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub currency: Option<String>,
  #[serde(default = "default_requires_shipping")]
  pub requires_shipping: bool,
}

impl CartItem {
  pub fn resolved_line_total(&self) -> Result<i64, AmountOverflow> {
    match self.line_total {
      Some(total) => Ok(total),
      None => self
        .unit_price
        .checked_mul(self.quantity)
        .ok_or_else(|| AmountOverflow(format!("line {}", self.id))),
    }
  }

  /// A physical line carries a SKU and a positive quantity; only those reserve stock.
  pub fn is_physical(&self) -> bool {
    self.quantity > 0 && self.sku.as_deref().is_some_and(|s| !s.is_empty())
  }
}

/// The priced cart as handed over by the cart/pricing collaborators.
///
/// `updated_at` is the optimistic-concurrency version: every write names the version it read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
  pub id: String,
  pub user_id: String,
  pub currency: String,
  #[serde(default)]
  pub items: Vec<CartItem>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shipping_address_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shipping_address: Option<Address>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub billing_address: Option<Address>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub promotion: Option<CartPromotion>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub estimate: Option<Totals>,
  #[serde(default)]
  pub metadata: Metadata,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

fn trimmed_opt(value: Option<String>) -> Option<String> {
  value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Cart {
  /// Trims identifiers, upper-cases currencies and fills in missing line totals.
  /// A line whose total overflows keeps `line_total: None`; `resolved_totals` reports it.
  pub fn normalized(mut self) -> Self {
    self.id = self.id.trim().to_string();
    self.user_id = self.user_id.trim().to_string();
    self.currency = normalize_currency(&self.currency);
    self.shipping_address_id = trimmed_opt(self.shipping_address_id.take());
    for item in self.items.iter_mut() {
      item.id = item.id.trim().to_string();
      item.product_id = item.product_id.trim().to_string();
      item.sku = trimmed_opt(item.sku.take());
      item.design_id = trimmed_opt(item.design_id.take());
      item.currency = item.currency.take().map(|c| normalize_currency(&c)).filter(|c| !c.is_empty());
      if item.line_total.is_none() {
        item.line_total = item.unit_price.checked_mul(item.quantity);
      }
    }
    self
  }

  pub fn physical_lines(&self) -> impl Iterator<Item = &CartItem> {
    self.items.iter().filter(|i| i.is_physical())
  }

  pub fn has_physical_lines(&self) -> bool {
    self.physical_lines().next().is_some()
  }

  pub fn requires_shipping(&self) -> bool {
    self.items.iter().any(|i| i.requires_shipping)
  }

  pub fn has_shipping_address(&self) -> bool {
    self.shipping_address.is_some() || self.shipping_address_id.as_deref().is_some_and(|s| !s.trim().is_empty())
  }

  /// Totals from the pricing estimate when it carries a positive total, otherwise
  /// recomputed from the line totals and the applied promotion.
  ///
  /// Every line total is resolved either way, so an `Ok` here means each line is
  /// representable too.
  pub fn resolved_totals(&self) -> Result<Totals, AmountOverflow> {
    let subtotal = self.items.iter().try_fold(0i64, |acc, item| {
      acc
        .checked_add(item.resolved_line_total()?)
        .ok_or_else(|| AmountOverflow(format!("subtotal of cart {}", self.id)))
    })?;
    if let Some(estimate) = self.estimate.filter(|e| e.total > 0) {
      return Ok(estimate);
    }
    let discount = self
      .promotion
      .as_ref()
      .filter(|p| p.applied)
      .map(|p| p.discount)
      .unwrap_or(0);
    let (shipping, tax, fees) = self.estimate.map(|e| (e.shipping, e.tax, e.fees)).unwrap_or((0, 0, 0));
    Totals::from_components(subtotal, discount, shipping, tax, fees)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(sku: Option<&str>, quantity: i64, unit_price: i64) -> CartItem {
    CartItem {
      id: " line-1 ".into(),
      product_id: "prod-1".into(),
      sku: sku.map(String::from),
      options: Metadata::new(),
      design_id: None,
      quantity,
      unit_price,
      line_total: None,
      currency: Some("usd".into()),
      requires_shipping: true,
    }
  }

  fn cart(items: Vec<CartItem>) -> Cart {
    Cart {
      id: " cart-1 ".into(),
      user_id: "user-1".into(),
      currency: "usd".into(),
      items,
      shipping_address_id: Some("  ".into()),
      shipping_address: None,
      billing_address: None,
      promotion: None,
      estimate: None,
      metadata: Metadata::new(),
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn normalization_trims_and_fills_line_totals() {
    let c = cart(vec![item(Some(" SKU-1 "), 2, 1_250)]).normalized();
    assert_eq!(c.id, "cart-1");
    assert_eq!(c.currency, "USD");
    assert_eq!(c.items[0].id, "line-1");
    assert_eq!(c.items[0].sku.as_deref(), Some("SKU-1"));
    assert_eq!(c.items[0].currency.as_deref(), Some("USD"));
    assert_eq!(c.items[0].line_total, Some(2_500));
    assert!(!c.has_shipping_address(), "blank address id must not count");
  }

  #[test]
  fn physical_lines_need_sku_and_quantity() {
    let c = cart(vec![item(Some("SKU-1"), 1, 100), item(None, 1, 100), item(Some("SKU-2"), 0, 100)]).normalized();
    let skus: Vec<_> = c.physical_lines().filter_map(|i| i.sku.clone()).collect();
    assert_eq!(skus, vec!["SKU-1".to_string()]);
  }

  #[test]
  fn fallback_totals_use_applied_promotion_only() {
    let mut c = cart(vec![item(Some("SKU-1"), 2, 1_000)]).normalized();
    c.promotion = Some(CartPromotion {
      code: "TEN".into(),
      discount: 200,
      applied: false,
    });
    assert_eq!(c.resolved_totals().unwrap().total, 2_000);
    if let Some(p) = c.promotion.as_mut() {
      p.applied = true;
    }
    assert_eq!(c.resolved_totals().unwrap().total, 1_800);
  }

  #[test]
  fn positive_estimate_wins() {
    let mut c = cart(vec![item(Some("SKU-1"), 2, 1_000)]).normalized();
    c.estimate = Some(Totals::from_components(2_000, 0, 500, 160, 0).unwrap());
    assert_eq!(c.resolved_totals().unwrap().total, 2_660);
  }

  #[test]
  fn overflowing_line_is_reported_not_wrapped() {
    let c = cart(vec![item(Some("SKU-1"), i64::MAX / 2, 3)]).normalized();
    assert_eq!(c.items[0].line_total, None);
    let err = c.resolved_totals().unwrap_err();
    assert_eq!(err, AmountOverflow("line line-1".to_string()));
  }

  #[test]
  fn overflowing_subtotal_is_reported() {
    let c = cart(vec![item(Some("SKU-1"), 1, i64::MAX), item(Some("SKU-2"), 1, 1)]).normalized();
    assert!(c.resolved_totals().is_err());
  }
}
