// commerce/src/config.rs

use crate::errors::{CommerceError, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  /// How long a checkout holds inventory before the hold lapses.
  pub reservation_ttl: Duration,
  pub order_number_prefix: String,
  /// Upper bound for a single collaborator call.
  pub collaborator_timeout: Duration,

  // Demo binary only
  pub log_json: bool,
  pub demo_psp: String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      reservation_ttl: Duration::from_secs(15 * 60),
      order_number_prefix: "HF".to_string(),
      collaborator_timeout: Duration::from_millis(5_000),
      log_json: false,
      demo_psp: "stripe".to_string(),
    }
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present
    let config = Self::from_lookup(|name| env::var(name).ok())?;
    tracing::info!("Application configuration loaded successfully.");
    Ok(config)
  }

  /// Builds the configuration from an arbitrary variable source. Unset variables take
  /// their defaults; set but unparsable ones are a `Config` error.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let defaults = Self::default();
    let get_env = |var_name: &str| lookup(var_name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let reservation_ttl = match get_env("RESERVATION_TTL_SECS") {
      Some(raw) => {
        let secs = raw
          .parse::<u64>()
          .map_err(|e| CommerceError::Config(format!("Invalid RESERVATION_TTL_SECS: {}", e)))?;
        if secs == 0 {
          return Err(CommerceError::Config("RESERVATION_TTL_SECS must be positive".to_string()));
        }
        Duration::from_secs(secs)
      }
      None => defaults.reservation_ttl,
    };

    let order_number_prefix = get_env("ORDER_NUMBER_PREFIX").unwrap_or(defaults.order_number_prefix);
    if !order_number_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
      return Err(CommerceError::Config(format!(
        "Invalid ORDER_NUMBER_PREFIX '{}': expected ASCII letters and digits",
        order_number_prefix
      )));
    }

    let collaborator_timeout = match get_env("COLLABORATOR_TIMEOUT_MS") {
      Some(raw) => {
        let millis = raw
          .parse::<u64>()
          .map_err(|e| CommerceError::Config(format!("Invalid COLLABORATOR_TIMEOUT_MS: {}", e)))?;
        if millis == 0 {
          return Err(CommerceError::Config("COLLABORATOR_TIMEOUT_MS must be positive".to_string()));
        }
        Duration::from_millis(millis)
      }
      None => defaults.collaborator_timeout,
    };

    let log_json = match get_env("LOG_JSON") {
      Some(raw) => raw
        .parse::<bool>()
        .map_err(|e| CommerceError::Config(format!("Invalid LOG_JSON value: {}", e)))?,
      None => defaults.log_json,
    };

    let demo_psp = get_env("DEMO_PSP").unwrap_or(defaults.demo_psp);

    Ok(Self {
      reservation_ttl,
      order_number_prefix,
      collaborator_timeout,
      log_json,
      demo_psp,
    })
  }
}
