use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier the server assigns to a task. Tools hand out integers or
/// strings, so the raw JSON value is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Value);

impl TaskId {
  /// Only scalar ids are usable in a request url.
  pub fn from_value(value: Value) -> Option<Self> {
    match value {
      Value::Number(_) | Value::String(_) => Some(TaskId(value)),
      _ => None,
    }
  }
}

impl From<i64> for TaskId {
  fn from(id: i64) -> Self {
    TaskId(Value::from(id))
  }
}

impl From<&str> for TaskId {
  fn from(id: &str) -> Self {
    TaskId(Value::from(id))
  }
}

impl Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.0 {
      Value::String(id) => f.write_str(id),
      other => write!(f, "{}", other),
    }
  }
}

/// Titles are free-form on the server side. Non-string titles are kept in
/// their JSON text form, a null title is no title.
pub fn title_from_value(value: Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(title) => Some(title),
    other => Some(other.to_string()),
  }
}

/// The record a worker owns for the task it is tracking.
///
/// `id` is `None` until the server accepted the submission. Attributes of the
/// completed result are flattened next to `id` and `title`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Task {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<TaskId>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(flatten)]
  pub attributes: Map<String, Value>,
}

impl Task {
  pub fn unsubmitted() -> Self {
    Self::default()
  }

  pub fn from_history(id: TaskId, title: Option<String>) -> Self {
    Self {
      id: Some(id),
      title,
      attributes: Map::new(),
    }
  }

  pub fn assign(&mut self, id: TaskId, title: Option<String>) {
    self.id = Some(id);
    self.title = title;
  }

  /// Copies every attribute of a completed result into the record. `id` and
  /// `title` overwrite the record's own fields, everything else lands in
  /// `attributes`.
  pub fn merge(&mut self, result: Map<String, Value>) {
    for (key, value) in result {
      match key.as_str() {
        "id" => self.id = Some(TaskId(value)),
        "title" => self.title = title_from_value(value),
        _ => {
          self.attributes.insert(key, value);
        }
      }
    }
  }
}
