// commerce/src/idempotency.rs

//! Idempotency keys for checkout attempts.
//!
//! A retried request for an unchanged cart derives the same key, so the inventory and the
//! payment gateway see the retry as the same attempt. Any cart write bumps the cart version
//! and therefore the key.

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use crate::models::{Cart, Metadata};

/// Metadata keys that carry a caller-chosen key, in lookup order.
pub const EXPLICIT_KEY_FIELDS: [&str; 2] = ["idempotency_key", "idempotencyKey"];

/// The caller's explicit key, if any non-blank one is present.
pub fn explicit_key(metadata: &Metadata) -> Option<String> {
  EXPLICIT_KEY_FIELDS.iter().find_map(|field| {
    metadata
      .get(*field)
      .and_then(|v| v.as_str())
      .map(str::trim)
      .filter(|k| !k.is_empty())
      .map(str::to_string)
  })
}

/// `hex(sha256("{psp}|{cart_id}|{cart_version}|{total}"))` with the provider lower-cased,
/// the version in RFC 3339 UTC with nanoseconds, and the total in minor units.
pub fn derived_key(psp: &str, cart: &Cart, total: i64) -> String {
  let material = format!(
    "{}|{}|{}|{}",
    psp.trim().to_ascii_lowercase(),
    cart.id,
    cart.updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
    total
  );
  sha256_hex(material.as_bytes())
}

/// Explicit key when supplied, derived key otherwise.
pub fn checkout_key(metadata: &Metadata, psp: &str, cart: &Cart, total: i64) -> String {
  explicit_key(metadata).unwrap_or_else(|| derived_key(psp, cart, total))
}

/// Key under which the finalization workflow of one checkout session is dispatched.
pub fn dispatch_key(cart_id: &str, session_id: &str) -> String {
  format!("checkout:{}:{}", cart_id, session_id)
}

fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}
