// commerce/src/services/mod.rs

//! Collaborator interfaces consumed by the order and checkout services, and the
//! in-memory adapters used by tests and the demo binary.

pub mod cart_store;
pub mod clock;
pub mod counter;
pub mod events;
pub mod inventory;
pub mod order_store;
pub mod payment_gateway;
pub mod workflow;

// In-memory adapters
pub mod memory_db;
pub mod payment_mock;
pub mod workflow_mock;

pub use cart_store::{CartStore, StoreError};
pub use clock::{Clock, IdGenerator, ManualClock, SystemClock, UuidIdGenerator};
pub use counter::Counter;
pub use events::{EventPublisher, OrderEvent, OrderEventKind, PublishError, RecordingEventPublisher, TracingEventPublisher};
pub use inventory::{Inventory, InventoryError, Reservation, ReservationLine, ReservationStatus};
pub use order_store::{OrderStore, UnitOfWork, WriteBatch, WriteOp};
pub use payment_gateway::{
  GatewayError, PaymentGateway, PaymentLineItem, PaymentSession, PaymentSessionRequest, PaymentStatus,
};
pub use workflow::{CheckoutWorkflowPayload, DispatchError, WorkflowDispatcher};

pub use memory_db::MemoryDatabase;
pub use payment_mock::MockPaymentGateway;
pub use workflow_mock::RecordingWorkflowDispatcher;
