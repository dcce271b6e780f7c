use std::str::FromStr;

use serde::Serialize;
use serde_json::{json, Value};

use crate::task::{Task, TaskId};

/// Lifecycle notifications a worker posts back to its host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum Notification {
  /// The task was accepted; carries a snapshot of the record.
  Start { task: Task },
  /// Progress of a task that is still running, in percent.
  Update {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<TaskId>,
    value: f64,
  },
  Result { task: Task },
  Error {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<TaskId>,
    message: String,
  },
}

/// Field naming used when notifications leave the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
  #[default]
  Canonical,
  /// `msg`/`query`/`error_msg`, as read by the original page scripts.
  Legacy,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown notification dialect {0:?}, expected `canonical` or `legacy`")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
  type Err = UnknownDialect;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "canonical" => Ok(Dialect::Canonical),
      "legacy" => Ok(Dialect::Legacy),
      _ => Err(UnknownDialect(s.to_string())),
    }
  }
}

/// Legacy pages expect `-1` for a task the server never accepted.
const LEGACY_UNSUBMITTED_ID: i64 = -1;

impl Notification {
  pub fn kind(&self) -> &'static str {
    match self {
      Notification::Start { .. } => "START",
      Notification::Update { .. } => "UPDATE",
      Notification::Result { .. } => "RESULT",
      Notification::Error { .. } => "ERROR",
    }
  }

  pub fn to_wire(&self, dialect: Dialect) -> Result<Value, serde_json::Error> {
    match dialect {
      Dialect::Canonical => serde_json::to_value(self),
      Dialect::Legacy => self.to_legacy(),
    }
  }

  fn to_legacy(&self) -> Result<Value, serde_json::Error> {
    let legacy_id = |id: &Option<TaskId>| {
      id.as_ref()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| Value::from(LEGACY_UNSUBMITTED_ID))
    };

    Ok(match self {
      Notification::Start { task } => json!({ "msg": "START", "query": serde_json::to_value(task)? }),
      Notification::Update { id, value } => {
        json!({ "status": "UPDATE", "id": legacy_id(id), "value": value })
      }
      Notification::Result { task } => json!({ "msg": "RESULT", "query": serde_json::to_value(task)? }),
      Notification::Error { id, message } => {
        json!({ "msg": "ERROR", "id": legacy_id(id), "error_msg": message })
      }
    })
  }
}
