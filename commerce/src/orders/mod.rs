// commerce/src/orders/mod.rs

//! The order lifecycle: a pure state machine and the service that persists its effects.

pub mod lifecycle;
pub mod state_machine;

pub use lifecycle::{CancelOrder, CreateOrderFromCart, OrderService, ReorderRequest, RequestInvoice, TransitionRequest};
