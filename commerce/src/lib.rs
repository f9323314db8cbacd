// commerce/src/lib.rs

//! Order lifecycle and checkout orchestration for a made-to-order shop.
//!
//! Two services sit on top of a set of collaborator traits (`services`):
//!  - `OrderService` owns the order status machine: creation from a cart, guarded status
//!    transitions, cancellation, production-floor events, invoicing and reorders.
//!  - `CheckoutService` runs checkout as `stepflow` pipelines: the reserve, pay and persist
//!    saga that opens a payment session, and the confirmation flow that settles it.
//!
//! Every write names the version it read (`updated_at`); a stale version fails with
//! `CommerceError::Conflict` and changes nothing. Every call takes a `RequestContext`
//! carrying the caller's deadline and cancellation.

pub mod checkout;
pub mod config;
pub mod context;
pub mod errors;
pub mod idempotency;
pub mod models;
pub mod orders;
pub mod pipelines;
pub mod services;
pub mod state;

pub use crate::checkout::{CheckoutService, CheckoutSessionDescriptor, ConfirmationOutcome, StartCheckout};
pub use crate::config::AppConfig;
pub use crate::context::RequestContext;
pub use crate::errors::{CommerceError, Result};
pub use crate::orders::{CancelOrder, CreateOrderFromCart, OrderService, ReorderRequest, RequestInvoice, TransitionRequest};
pub use crate::state::{CommerceDeps, CommerceDepsBuilder};
