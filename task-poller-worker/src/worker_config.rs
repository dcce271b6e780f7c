use std::{str::FromStr, time::Duration};

use task_poller_core::{Address, Dialect};

use crate::error::ConfigError;

const DEFAULT_SERVER_ADDRESS: &str = "http://127.0.0.1:8000";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How the status poll is issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultStyle {
  /// `GET /{tool}/result?id=<id>`
  #[default]
  Query,
  /// `POST /{tool}/result` with form body `query_id=<id>`
  Form,
}

impl FromStr for ResultStyle {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "query" => Ok(ResultStyle::Query),
      "form" => Ok(ResultStyle::Form),
      _ => Err("expected `query` or `form`".to_string()),
    }
  }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub server_address: Address,
  // Fixed delay between two status polls while the server answers WAIT.
  pub poll_interval: Duration,
  pub request_timeout: Duration,
  pub result_style: ResultStyle,
  pub dialect: Dialect,
}

#[cfg(test)]
impl Default for WorkerConfig {
  fn default() -> Self {
    WorkerConfig::from_lookup(|_| None).unwrap()
  }
}

impl WorkerConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Builds a config from `TASK_POLLER_*` variables, falling back to the
  /// defaults for anything unset.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let server_address =
      lookup("TASK_POLLER_BASE_URL").unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string());

    let mut config = WorkerConfig {
      server_address: Address::parse(&server_address).map_err(|error| ConfigError::Invalid {
        name: "TASK_POLLER_BASE_URL",
        reason: error.to_string(),
        value: server_address.clone(),
      })?,
      poll_interval: DEFAULT_POLL_INTERVAL,
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      result_style: ResultStyle::default(),
      dialect: Dialect::default(),
    };

    if let Some(value) = lookup("TASK_POLLER_INTERVAL_MS") {
      config.poll_interval = Duration::from_millis(parse("TASK_POLLER_INTERVAL_MS", value)?);
    }

    if let Some(value) = lookup("TASK_POLLER_TIMEOUT_SECS") {
      config.request_timeout = Duration::from_secs(parse("TASK_POLLER_TIMEOUT_SECS", value)?);
    }

    if let Some(value) = lookup("TASK_POLLER_RESULT_STYLE") {
      config.result_style = parse("TASK_POLLER_RESULT_STYLE", value)?;
    }

    if let Some(value) = lookup("TASK_POLLER_DIALECT") {
      config.dialect = parse("TASK_POLLER_DIALECT", value)?;
    }

    Ok(config)
  }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
  T: FromStr,
  T::Err: ToString,
{
  value.trim().parse().map_err(|error: T::Err| ConfigError::Invalid {
    name,
    reason: error.to_string(),
    value,
  })
}
