// commerce/src/context.rs

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{event, Level};

use crate::errors::{CommerceError, Result};

/// Per-request deadline and cancellation, handed to every service operation.
///
/// Each collaborator call runs under the earlier of the request deadline and the
/// per-call limit. When either fires, or the token is cancelled, the call is abandoned
/// and the operation fails with `CommerceError::Unavailable`.
#[derive(Debug, Clone)]
pub struct RequestContext {
  deadline: Option<Instant>,
  cancel: CancellationToken,
}

impl Default for RequestContext {
  fn default() -> Self {
    Self::background()
  }
}

impl RequestContext {
  /// No deadline, never cancelled unless `cancel` is called.
  pub fn background() -> Self {
    Self {
      deadline: None,
      cancel: CancellationToken::new(),
    }
  }

  pub fn with_timeout(timeout: Duration) -> Self {
    Self::background().with_deadline(Instant::now() + timeout)
  }

  pub fn with_deadline(mut self, deadline: Instant) -> Self {
    self.deadline = Some(deadline);
    self
  }

  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// A context for cleanup work after this one failed: it keeps no deadline and ignores
  /// cancellation of the parent.
  pub fn detached(&self) -> Self {
    Self::background()
  }

  /// Runs `fut` under this context, bounded additionally by `limit`.
  pub async fn guard<F, T>(&self, what: &str, limit: Duration, fut: F) -> Result<T>
  where
    F: Future<Output = T>,
  {
    let per_call = Instant::now() + limit;
    let deadline = match self.deadline {
      Some(d) if d < per_call => d,
      _ => per_call,
    };

    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => {
        event!(Level::WARN, operation = what, "Request cancelled; abandoning collaborator call.");
        Err(CommerceError::Unavailable(format!("{}: request cancelled", what)))
      }
      outcome = tokio::time::timeout_at(deadline, fut) => match outcome {
        Ok(value) => Ok(value),
        Err(_) => {
          event!(Level::WARN, operation = what, "Deadline exceeded; abandoning collaborator call.");
          Err(CommerceError::Unavailable(format!("{}: deadline exceeded", what)))
        }
      },
    }
  }

  /// Like `guard`, translating the collaborator's error into `CommerceError`.
  pub async fn run<F, T, E>(&self, what: &str, limit: Duration, fut: F) -> Result<T>
  where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<CommerceError>,
  {
    self.guard(what, limit, fut).await?.map_err(Into::into)
  }
}
