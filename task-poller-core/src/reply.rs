//! Server replies to submissions and status polls.
//!
//! Replies are JSON objects discriminated by `status` (older tools use `msg`).
//! `ERROR` and `WAIT` are the only statuses with a fixed meaning: anything
//! else, including no status at all, is a finished task.

use serde_json::{Map, Value};

use crate::task::{title_from_value, TaskId};

pub const CONNECTION_FAILURE: &str =
  "There was a problem submitting your task, please check your connection.";
pub const SUBMISSION_REJECTED: &str = "There was a problem submitting your task, please try again.";
pub const TASK_FAILED: &str = "There was a problem with your task, please try again.";

const STATUS_ERROR: &str = "ERROR";
const STATUS_WAIT: &str = "WAIT";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplyError {
  #[error("reply body is not a JSON object")]
  NotAnObject,
  #[error("submission reply carries no usable task id")]
  MissingId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
  Accepted { id: TaskId, title: Option<String> },
  Rejected { message: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusReply {
  Failed { message: Option<String> },
  Waiting { progress: Option<f64> },
  /// Every attribute of the reply except its status discriminator.
  Complete { attributes: Map<String, Value> },
}

impl SubmitReply {
  pub fn from_value(value: Value) -> Result<Self, ReplyError> {
    let body = into_object(value)?;

    if status_of(&body).map(|(_, status)| status) == Some(STATUS_ERROR) {
      return Ok(SubmitReply::Rejected {
        message: error_message(&body),
      });
    }

    let id = body
      .get("id")
      .or_else(|| body.get("query_id"))
      .cloned()
      .and_then(TaskId::from_value)
      .ok_or(ReplyError::MissingId)?;

    let title = body.get("title").cloned().and_then(title_from_value);

    Ok(SubmitReply::Accepted { id, title })
  }
}

impl StatusReply {
  pub fn from_value(value: Value) -> Result<Self, ReplyError> {
    let mut body = into_object(value)?;

    let status = status_of(&body).map(|(key, status)| (key, status.to_string()));

    Ok(match status {
      Some((_, ref status)) if status == STATUS_ERROR => StatusReply::Failed {
        message: error_message(&body),
      },
      Some((_, ref status)) if status == STATUS_WAIT => StatusReply::Waiting {
        progress: progress_percent(&body),
      },
      Some((key, _)) => {
        body.remove(key);
        StatusReply::Complete { attributes: body }
      }
      None => StatusReply::Complete { attributes: body },
    })
  }
}

fn into_object(value: Value) -> Result<Map<String, Value>, ReplyError> {
  match value {
    Value::Object(body) => Ok(body),
    _ => Err(ReplyError::NotAnObject),
  }
}

/// Returns the discriminator key in use and its value.
fn status_of(body: &Map<String, Value>) -> Option<(&'static str, &str)> {
  ["status", "msg"]
    .into_iter()
    .find_map(|key| body.get(key).and_then(Value::as_str).map(|status| (key, status)))
}

fn error_message(body: &Map<String, Value>) -> Option<String> {
  ["message", "error_msg"]
    .into_iter()
    .filter_map(|key| body.get(key).and_then(Value::as_str))
    .find(|message| !message.is_empty())
    .map(str::to_string)
}

/// Reads the progress figure of a `WAIT` reply as a percentage.
///
/// `progress` is either `{processed, total}` or a bare number; older tools
/// report `result: {scenes_processed, total_scenes}` instead.
pub fn progress_percent(body: &Map<String, Value>) -> Option<f64> {
  match body.get("progress") {
    Some(Value::Number(value)) => return value.as_f64(),
    Some(Value::Object(progress)) => {
      return ratio(progress.get("processed")?, progress.get("total")?);
    }
    _ => {}
  }

  let legacy = body.get("result")?.as_object()?;
  ratio(legacy.get("scenes_processed")?, legacy.get("total_scenes")?)
}

fn ratio(processed: &Value, total: &Value) -> Option<f64> {
  let processed = processed.as_f64()?;
  let total = total.as_f64()?;
  if total == 0.0 {
    return Some(0.0);
  }
  Some(processed / total * 100.0)
}
