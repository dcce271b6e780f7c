use task_poller_core::{
  reply::{CONNECTION_FAILURE, TASK_FAILED},
  AddressError, ReplyError,
};

/// Failure of a single call to the data-cube server.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("request could not be completed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("server answered with HTTP {0}")]
  Status(reqwest::StatusCode),

  #[error("reply body is not JSON: {0}")]
  Decode(#[from] serde_json::Error),

  #[error(transparent)]
  Reply(#[from] ReplyError),

  #[error(transparent)]
  Address(#[from] AddressError),
}

impl ApiError {
  /// Transport failures mean the server was never reached or refused the
  /// request. Everything else is a reply we could not make sense of.
  pub fn is_transport(&self) -> bool {
    matches!(
      self,
      ApiError::Transport(_) | ApiError::Status(_) | ApiError::Address(_)
    )
  }
}

/// Terminal failure of a task lifecycle. Each one ends in exactly one
/// `ERROR` notification.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
  #[error("connectivity failure: {0}")]
  Transport(#[source] ApiError),

  #[error("task failed: {message}")]
  Application {
    message: String,
    #[source]
    cause: Option<ApiError>,
  },
}

impl PollError {
  /// Classifies a failed call. Replies that cannot be interpreted are
  /// reported with `fallback`, the generic message for the current stage.
  pub fn from_api(error: ApiError, fallback: &str) -> Self {
    if error.is_transport() {
      PollError::Transport(error)
    } else {
      PollError::Application {
        message: fallback.to_string(),
        cause: Some(error),
      }
    }
  }

  /// A failure the server reported in a well-formed reply.
  pub fn reported(message: Option<String>, fallback: &str) -> Self {
    PollError::Application {
      message: message.unwrap_or_else(|| fallback.to_string()),
      cause: None,
    }
  }

  pub fn task_failed(message: Option<String>) -> Self {
    Self::reported(message, TASK_FAILED)
  }

  /// Text shown to the user in the `ERROR` notification.
  pub fn user_message(&self) -> &str {
    match self {
      PollError::Transport(_) => CONNECTION_FAILURE,
      PollError::Application { message, .. } => message,
    }
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("invalid value {value:?} for {name}: {reason}")]
  Invalid {
    name: &'static str,
    value: String,
    reason: String,
  },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("worker no longer accepts messages")]
pub struct WorkerClosed;
