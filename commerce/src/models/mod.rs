// commerce/src/models/mod.rs

//! Data structures for carts, checkout metadata, orders and production events.

pub mod cart;
pub mod checkout;
pub mod money;
pub mod order;
pub mod production;

// Re-export the model structs for convenient access
pub use cart::{Address, Cart, CartItem, CartPromotion};
pub use checkout::{CheckoutMetadata, CheckoutStatus};
pub use money::{AmountOverflow, Totals};
pub use order::{Audit, Order, OrderItem, OrderStatus, ProductionSummary, PromotionSnapshot};
pub use production::{ProductionEventInput, ProductionEventRecord, ProductionEventType};

/// Open key/value bag carried by carts, orders and events.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
