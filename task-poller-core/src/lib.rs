use std::fmt::Debug;

use url::Url;

pub mod envelope;
pub mod notification;
pub mod reply;
pub mod task;

pub use envelope::{EnvelopeError, Request, RequestKind, SessionContext};
pub use notification::{Dialect, Notification};
pub use reply::{ReplyError, StatusReply, SubmitReply};
pub use task::{Task, TaskId};

/// Base URL of the data-cube server. Tool endpoints hang off it as
/// `/{tool_name}/{endpoint}`.
#[derive(Clone, PartialEq, Eq)]
pub struct Address(pub Url);

impl Debug for Address {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.as_str().trim_end_matches('/'))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
  Submit,
  SubmitSingle,
  Result,
}

impl Endpoint {
  pub fn path(&self) -> &'static str {
    match self {
      Endpoint::Submit => "submit",
      Endpoint::SubmitSingle => "submit_single",
      Endpoint::Result => "result",
    }
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
  #[error("base url {0} cannot carry a path")]
  CannotBeABase(String),
}

impl Address {
  pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
    Ok(Address(Url::parse(raw)?))
  }

  /// Resolves the url of `endpoint` for the given tool. The tool name is
  /// pushed as a single path segment, so it is percent-encoded if needed.
  pub fn endpoint(&self, tool_name: &str, endpoint: Endpoint) -> Result<Url, AddressError> {
    let mut url = self.0.clone();
    url.set_query(None);
    url
      .path_segments_mut()
      .map_err(|_| AddressError::CannotBeABase(self.0.to_string()))?
      .pop_if_empty()
      .push(tool_name)
      .push(endpoint.path());
    Ok(url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn endpoint_appends_tool_and_leaf() {
    let address = Address::parse("http://localhost:8000").unwrap();
    let url = address.endpoint("cube", Endpoint::Submit).unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/cube/submit");
  }

  #[test]
  fn endpoint_keeps_base_path_prefix() {
    let address = Address::parse("https://example.org/datacube/").unwrap();
    let url = address.endpoint("water_detection", Endpoint::SubmitSingle).unwrap();
    assert_eq!(
      url.as_str(),
      "https://example.org/datacube/water_detection/submit_single"
    );
  }

  #[test]
  fn endpoint_encodes_tool_name_as_one_segment() {
    let address = Address::parse("http://localhost").unwrap();
    let url = address.endpoint("a/b", Endpoint::Result).unwrap();
    assert_eq!(url.path(), "/a%2Fb/result");
  }

  #[test]
  fn endpoint_rejects_opaque_base() {
    let address = Address::parse("mailto:someone@example.org").unwrap();
    assert!(matches!(
      address.endpoint("cube", Endpoint::Result),
      Err(AddressError::CannotBeABase(_))
    ));
  }

  #[test]
  fn debug_omits_trailing_slash() {
    let address = Address::parse("http://localhost:8000/").unwrap();
    assert_eq!(format!("{:?}", address), "http://localhost:8000");
  }
}
