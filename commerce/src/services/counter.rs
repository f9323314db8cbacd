// commerce/src/services/counter.rs

use async_trait::async_trait;

use super::cart_store::StoreError;

/// Named monotonically increasing sequences (order numbers).
#[async_trait]
pub trait Counter: Send + Sync {
  /// Adds `increment` to `sequence` and returns the new value. A fresh sequence starts at zero.
  async fn next(&self, sequence: &str, increment: i64) -> Result<i64, StoreError>;
}
