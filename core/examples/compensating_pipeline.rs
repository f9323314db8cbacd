// core/examples/compensating_pipeline.rs

use stepflow::{Compensation, ContextData, Pipeline, PipelineControl, Registry, StepflowError};
use tracing::{info, warn};

// 1. Context data for a small booking saga
#[derive(Clone, Debug, Default)]
struct BookingContext {
  seats_held: u32,
  charged_cents: i64,
  card_declines: bool,
  log: Vec<String>,
}

// 2. Application error; must accept StepflowError
#[derive(Debug, thiserror::Error)]
enum BookingError {
  #[error("Pipeline error: {0}")]
  Pipeline(#[from] StepflowError),
  #[error("Card declined")]
  Declined,
}

fn booking_pipeline() -> Pipeline<BookingContext, BookingError> {
  let mut pipeline = Pipeline::<BookingContext, BookingError>::new(&[
    ("hold_seats", false, None),
    ("charge_card", false, None),
    ("send_ticket", false, None),
  ]);

  pipeline.on_root("hold_seats", |ctx: ContextData<BookingContext>| {
    Box::pin(async move {
      ctx.with_write(|d| {
        d.seats_held = 2;
        d.log.push("held 2 seats".to_string());
      });
      Ok::<_, BookingError>(PipelineControl::Continue)
    })
  });
  pipeline.compensate_root("hold_seats", |ctx: ContextData<BookingContext>, c: Compensation| {
    Box::pin(async move {
      warn!(failed_step = %c.failed_step, cause = %c.error_message, "Releasing held seats.");
      ctx.with_write(|d| {
        d.seats_held = 0;
        d.log.push("released seats".to_string());
      });
      Ok::<_, BookingError>(())
    })
  });

  pipeline.on_root("charge_card", |ctx: ContextData<BookingContext>| {
    Box::pin(async move {
      if ctx.with_read(|d| d.card_declines) {
        return Err(BookingError::Declined);
      }
      ctx.with_write(|d| {
        d.charged_cents = 9_000;
        d.log.push("charged 90.00".to_string());
      });
      Ok(PipelineControl::Continue)
    })
  });

  pipeline.on_root("send_ticket", |ctx: ContextData<BookingContext>| {
    Box::pin(async move {
      ctx.with_write(|d| d.log.push("ticket sent".to_string()));
      Ok::<_, BookingError>(PipelineControl::Continue)
    })
  });

  pipeline
}

#[tokio::main]
async fn main() -> Result<(), BookingError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  let registry = Registry::<BookingError>::new();
  registry.register_pipeline(booking_pipeline());

  info!("--- Successful booking ---");
  let ok = ContextData::new(BookingContext::default());
  let result = registry.run(ok.clone()).await?;
  info!(?result, log = ?ok.read().log, "Booking finished.");

  info!("--- Declined card ---");
  let declined = ContextData::new(BookingContext {
    card_declines: true,
    ..Default::default()
  });
  match registry.run(declined.clone()).await {
    Ok(result) => info!(?result, "Unexpected success."),
    Err(e) => {
      let data = declined.read();
      info!(error = %e, seats_held = data.seats_held, log = ?data.log, "Booking rolled back.");
    }
  }
  Ok(())
}
