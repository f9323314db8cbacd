// commerce/src/services/payment_mock.rs

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::payment_gateway::{GatewayError, PaymentGateway, PaymentSession, PaymentSessionRequest, PaymentStatus};

#[derive(Debug, Default)]
struct MockGatewayState {
  sessions_by_key: HashMap<String, PaymentSession>,
  statuses: HashMap<String, PaymentStatus>,
  requests: Vec<PaymentSessionRequest>,
  fail_next_create: Option<GatewayError>,
  fail_next_lookup: Option<GatewayError>,
  create_calls: usize,
  lookup_calls: usize,
}

/// Simulated hosted-checkout gateway. New intents start `Pending`; tests move them with
/// `set_payment_status`.
pub struct MockPaymentGateway {
  providers: Vec<String>,
  latency: Option<Duration>,
  session_ttl: ChronoDuration,
  clock: Arc<dyn Clock>,
  state: Mutex<MockGatewayState>,
}

impl Default for MockPaymentGateway {
  fn default() -> Self {
    Self::new(Arc::new(SystemClock))
  }
}

impl MockPaymentGateway {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      providers: vec!["stripe".to_string(), "paypal".to_string(), "mock".to_string()],
      latency: None,
      session_ttl: ChronoDuration::minutes(30),
      clock,
      state: Mutex::new(MockGatewayState::default()),
    }
  }

  /// Simulated network latency applied to every call.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  pub fn with_providers(mut self, providers: &[&str]) -> Self {
    self.providers = providers.iter().map(|p| p.to_ascii_lowercase()).collect();
    self
  }

  pub fn set_payment_status(&self, intent_id: &str, status: PaymentStatus) {
    self.state.lock().statuses.insert(intent_id.to_string(), status);
  }

  pub fn fail_next_create(&self, err: GatewayError) {
    self.state.lock().fail_next_create = Some(err);
  }

  pub fn fail_next_lookup(&self, err: GatewayError) {
    self.state.lock().fail_next_lookup = Some(err);
  }

  pub fn create_calls(&self) -> usize {
    self.state.lock().create_calls
  }

  pub fn lookup_calls(&self) -> usize {
    self.state.lock().lookup_calls
  }

  pub fn last_request(&self) -> Option<PaymentSessionRequest> {
    self.state.lock().requests.last().cloned()
  }

  async fn simulate_latency(&self) {
    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }
  }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
  #[instrument(
    name = "MockPaymentGateway::create_checkout_session",
    skip_all,
    fields(provider = %request.provider, amount = request.amount, currency = %request.currency)
  )]
  async fn create_checkout_session(&self, request: PaymentSessionRequest) -> Result<PaymentSession, GatewayError> {
    self.simulate_latency().await;
    let mut state = self.state.lock();
    state.create_calls += 1;
    state.requests.push(request.clone());
    if let Some(err) = state.fail_next_create.take() {
      return Err(err);
    }

    let provider = request.provider.trim().to_ascii_lowercase();
    if !self.providers.contains(&provider) {
      return Err(GatewayError::UnsupportedProvider(request.provider));
    }
    if request.amount <= 0 {
      return Err(GatewayError::InvalidRequest("amount must be greater than zero".to_string()));
    }
    if request.currency.len() != 3 {
      return Err(GatewayError::InvalidRequest(format!("invalid currency '{}'", request.currency)));
    }
    if let Some(existing) = state.sessions_by_key.get(&request.idempotency_key) {
      info!("Returning existing session {} for idempotency key.", existing.id);
      return Ok(existing.clone());
    }

    let session_id = format!("cs_{}", Uuid::new_v4().simple());
    let intent_id = format!("pi_{}", Uuid::new_v4().simple());
    let session = PaymentSession {
      id: session_id.clone(),
      provider: provider.clone(),
      client_secret: Some(format!("{}_secret_{}", intent_id, Uuid::new_v4().simple())),
      redirect_url: Some(format!("https://pay.example.test/{}/{}", provider, session_id)),
      intent_id: Some(intent_id.clone()),
      expires_at: self.clock.now() + self.session_ttl,
    };
    state.statuses.insert(intent_id, PaymentStatus::Pending);
    state.sessions_by_key.insert(request.idempotency_key, session.clone());
    info!("Simulated checkout session {} created.", session.id);
    Ok(session)
  }

  #[instrument(name = "MockPaymentGateway::lookup_payment", skip(self))]
  async fn lookup_payment(&self, intent_id: &str) -> Result<PaymentStatus, GatewayError> {
    self.simulate_latency().await;
    let mut state = self.state.lock();
    state.lookup_calls += 1;
    if let Some(err) = state.fail_next_lookup.take() {
      return Err(err);
    }
    state
      .statuses
      .get(intent_id)
      .copied()
      .ok_or_else(|| GatewayError::InvalidRequest(format!("unknown payment intent {}", intent_id)))
  }
}
