// commerce/src/state.rs

use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::{CommerceError, Result};
use crate::services::{
  CartStore, Clock, Counter, EventPublisher, IdGenerator, Inventory, MemoryDatabase, OrderStore, PaymentGateway,
  SystemClock, TracingEventPublisher, UnitOfWork, UuidIdGenerator, WorkflowDispatcher,
};

/// Collaborators shared by the order and checkout services.
#[derive(Clone)]
pub struct CommerceDeps {
  pub carts: Arc<dyn CartStore>,
  pub orders: Arc<dyn OrderStore>,
  pub unit_of_work: Arc<dyn UnitOfWork>,
  pub inventory: Arc<dyn Inventory>,
  pub payments: Arc<dyn PaymentGateway>,
  pub workflows: Arc<dyn WorkflowDispatcher>,
  pub counter: Arc<dyn Counter>,
  pub events: Arc<dyn EventPublisher>,
  pub clock: Arc<dyn Clock>,
  pub ids: Arc<dyn IdGenerator>,
  pub config: Arc<AppConfig>,
}

impl CommerceDeps {
  pub fn builder() -> CommerceDepsBuilder {
    CommerceDepsBuilder::default()
  }
}

#[derive(Default)]
pub struct CommerceDepsBuilder {
  carts: Option<Arc<dyn CartStore>>,
  orders: Option<Arc<dyn OrderStore>>,
  unit_of_work: Option<Arc<dyn UnitOfWork>>,
  inventory: Option<Arc<dyn Inventory>>,
  payments: Option<Arc<dyn PaymentGateway>>,
  workflows: Option<Arc<dyn WorkflowDispatcher>>,
  counter: Option<Arc<dyn Counter>>,
  events: Option<Arc<dyn EventPublisher>>,
  clock: Option<Arc<dyn Clock>>,
  ids: Option<Arc<dyn IdGenerator>>,
  config: Option<AppConfig>,
}

impl CommerceDepsBuilder {
  pub fn carts(mut self, carts: Arc<dyn CartStore>) -> Self {
    self.carts = Some(carts);
    self
  }

  pub fn orders(mut self, orders: Arc<dyn OrderStore>) -> Self {
    self.orders = Some(orders);
    self
  }

  pub fn unit_of_work(mut self, unit_of_work: Arc<dyn UnitOfWork>) -> Self {
    self.unit_of_work = Some(unit_of_work);
    self
  }

  pub fn inventory(mut self, inventory: Arc<dyn Inventory>) -> Self {
    self.inventory = Some(inventory);
    self
  }

  pub fn payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
    self.payments = Some(payments);
    self
  }

  pub fn workflows(mut self, workflows: Arc<dyn WorkflowDispatcher>) -> Self {
    self.workflows = Some(workflows);
    self
  }

  pub fn counter(mut self, counter: Arc<dyn Counter>) -> Self {
    self.counter = Some(counter);
    self
  }

  pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
    self.events = Some(events);
    self
  }

  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = Some(ids);
    self
  }

  pub fn config(mut self, config: AppConfig) -> Self {
    self.config = Some(config);
    self
  }

  /// Wires carts, orders, unit of work, inventory and counter to one in-memory database.
  pub fn memory_database(self, db: Arc<MemoryDatabase>) -> Self {
    self
      .carts(db.clone())
      .orders(db.clone())
      .unit_of_work(db.clone())
      .inventory(db.clone())
      .counter(db)
  }

  pub fn build(self) -> Result<CommerceDeps> {
    fn required<T: ?Sized>(slot: Option<Arc<T>>, name: &str) -> Result<Arc<T>> {
      slot.ok_or_else(|| CommerceError::Config(format!("missing required collaborator: {}", name)))
    }

    Ok(CommerceDeps {
      carts: required(self.carts, "cart store")?,
      orders: required(self.orders, "order store")?,
      unit_of_work: required(self.unit_of_work, "unit of work")?,
      inventory: required(self.inventory, "inventory")?,
      payments: required(self.payments, "payment gateway")?,
      workflows: required(self.workflows, "workflow dispatcher")?,
      counter: required(self.counter, "counter")?,
      events: self.events.unwrap_or_else(|| Arc::new(TracingEventPublisher)),
      clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
      ids: self.ids.unwrap_or_else(|| Arc::new(UuidIdGenerator)),
      config: Arc::new(self.config.unwrap_or_default()),
    })
  }
}
