//! Inbound request envelopes.
//!
//! The host posts a single JSON object to a worker. Its discriminator lives in
//! `msg`, older pages send it as `status`, and the task id may arrive as
//! `query_id`. Both spellings are accepted.

use serde::Deserialize;
use serde_json::Value;

use crate::task::{title_from_value, TaskId};

/// Per-worker request context. Every outbound call is addressed to
/// `tool_name` and carries `csrf` as its anti-forgery header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
  pub tool_name: String,
  pub csrf: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
  /// Submit a new task from URL-encoded form data.
  New { form_data: String },
  /// Resume a task the server already knows about.
  History { id: TaskId, title: Option<String> },
  /// Submit a single-item task keyed by an id and a date.
  Single { id: TaskId, date: String },
}

impl RequestKind {
  pub fn name(&self) -> &'static str {
    match self {
      RequestKind::New { .. } => "NEW",
      RequestKind::History { .. } => "HISTORY",
      RequestKind::Single { .. } => "SINGLE",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub context: SessionContext,
  pub kind: RequestKind,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
  #[error("envelope is not a valid request object: {0}")]
  Malformed(#[from] serde_json::Error),

  #[error("unknown request discriminator: {0:?}")]
  UnknownDiscriminator(Option<String>),

  #[error("{kind} request is missing `{field}`")]
  MissingField {
    kind: &'static str,
    field: &'static str,
  },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
  #[serde(default)]
  tool_name: Option<String>,
  #[serde(default, alias = "status")]
  msg: Option<String>,
  #[serde(default)]
  form_data: Option<String>,
  #[serde(default, alias = "query_id")]
  id: Option<Value>,
  #[serde(default)]
  title: Option<Value>,
  #[serde(default)]
  date: Option<String>,
  #[serde(default)]
  csrf: Option<String>,
}

impl Request {
  pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
    Self::from_value(serde_json::from_str(raw)?)
  }

  pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
    let raw: RawEnvelope = serde_json::from_value(value)?;

    let kind = match raw.msg.as_deref() {
      Some("NEW") => RequestKind::New {
        form_data: raw.form_data.unwrap_or_default(),
      },
      Some("HISTORY") => RequestKind::History {
        id: required_id(raw.id, "HISTORY")?,
        title: raw.title.and_then(title_from_value),
      },
      Some("SINGLE") => RequestKind::Single {
        id: required_id(raw.id, "SINGLE")?,
        date: raw.date.ok_or(EnvelopeError::MissingField {
          kind: "SINGLE",
          field: "date",
        })?,
      },
      _ => return Err(EnvelopeError::UnknownDiscriminator(raw.msg)),
    };

    let tool_name = raw
      .tool_name
      .filter(|name| !name.is_empty())
      .ok_or(EnvelopeError::MissingField {
        kind: kind.name(),
        field: "tool_name",
      })?;

    Ok(Request {
      context: SessionContext {
        tool_name,
        csrf: raw.csrf,
      },
      kind,
    })
  }
}

fn required_id(id: Option<Value>, kind: &'static str) -> Result<TaskId, EnvelopeError> {
  id.and_then(TaskId::from_value)
    .ok_or(EnvelopeError::MissingField { kind, field: "id" })
}
