use std::future::Future;

use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder};
use serde_json::Value;
use task_poller_core::{Address, Endpoint, SessionContext, TaskId};
use tracing::debug;
use url::form_urlencoded;

use crate::{
  error::ApiError,
  worker_config::{ResultStyle, WorkerConfig},
};

pub const CSRF_HEADER: &str = "X-CSRFToken";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The three calls a worker makes against a tool. Each resolves to the raw
/// JSON reply; interpreting it is up to the poller.
pub trait TaskApi: Send + Sync + 'static {
  fn submit(
    &self,
    context: &SessionContext,
    form_data: &str,
  ) -> impl Future<Output = Result<Value, ApiError>> + Send;

  fn submit_single(
    &self,
    context: &SessionContext,
    id: &TaskId,
    date: &str,
  ) -> impl Future<Output = Result<Value, ApiError>> + Send;

  fn check(
    &self,
    context: &SessionContext,
    id: &TaskId,
  ) -> impl Future<Output = Result<Value, ApiError>> + Send;
}

pub struct HttpTaskApi {
  client: Client,
  address: Address,
  result_style: ResultStyle,
}

impl HttpTaskApi {
  pub fn new(config: &WorkerConfig) -> Result<Self, ApiError> {
    let client = Client::builder().timeout(config.request_timeout).build()?;

    Ok(Self {
      client,
      address: config.server_address.clone(),
      result_style: config.result_style,
    })
  }

  fn post_form(&self, url: url::Url, body: String) -> RequestBuilder {
    self
      .client
      .post(url)
      .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
      .body(body)
  }

  async fn send(&self, context: &SessionContext, request: RequestBuilder) -> Result<Value, ApiError> {
    let request = match &context.csrf {
      Some(token) => request.header(CSRF_HEADER, token),
      None => request,
    };

    let response = request.send().await?;
    let status = response.status();
    debug!("{} answered {}", response.url(), status);

    if !status.is_success() {
      return Err(ApiError::Status(status));
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
  }
}

impl TaskApi for HttpTaskApi {
  async fn submit(&self, context: &SessionContext, form_data: &str) -> Result<Value, ApiError> {
    let url = self.address.endpoint(&context.tool_name, Endpoint::Submit)?;
    self
      .send(context, self.post_form(url, form_data.to_string()))
      .await
  }

  async fn submit_single(
    &self,
    context: &SessionContext,
    id: &TaskId,
    date: &str,
  ) -> Result<Value, ApiError> {
    let url = self
      .address
      .endpoint(&context.tool_name, Endpoint::SubmitSingle)?;
    let body = form_urlencoded::Serializer::new(String::new())
      .append_pair("id", &id.to_string())
      .append_pair("date", date)
      .finish();
    self.send(context, self.post_form(url, body)).await
  }

  async fn check(&self, context: &SessionContext, id: &TaskId) -> Result<Value, ApiError> {
    let mut url = self.address.endpoint(&context.tool_name, Endpoint::Result)?;

    let request = match self.result_style {
      ResultStyle::Query => {
        url.query_pairs_mut().append_pair("id", &id.to_string());
        self.client.get(url)
      }
      ResultStyle::Form => {
        let body = form_urlencoded::Serializer::new(String::new())
          .append_pair("query_id", &id.to_string())
          .finish();
        self.post_form(url, body)
      }
    };

    self.send(context, request).await
  }
}

/// In-memory [`TaskApi`] that answers from a script and records every call.
#[cfg(test)]
pub mod testing {
  use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
  };

  use super::*;

  #[derive(Debug, Clone, PartialEq, Eq)]
  pub enum Call {
    Submit { tool: String, form_data: String },
    SubmitSingle { tool: String, id: TaskId, date: String },
    Check { tool: String, id: TaskId },
  }

  #[derive(Clone, Default)]
  pub struct ScriptedApi {
    replies: Arc<Mutex<VecDeque<Result<Value, ApiError>>>>,
    calls: Arc<Mutex<Vec<(Call, tokio::time::Instant)>>>,
  }

  impl ScriptedApi {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn reply(self, body: Value) -> Self {
      self.replies.lock().unwrap().push_back(Ok(body));
      self
    }

    pub fn fail(self, error: ApiError) -> Self {
      self.replies.lock().unwrap().push_back(Err(error));
      self
    }

    pub fn calls(&self) -> Vec<Call> {
      self
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(call, _)| call.clone())
        .collect()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
      self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    fn answer(&self, call: Call) -> Result<Value, ApiError> {
      self
        .calls
        .lock()
        .unwrap()
        .push((call, tokio::time::Instant::now()));
      self
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(Err(ApiError::Status(
          reqwest::StatusCode::SERVICE_UNAVAILABLE,
        )))
    }
  }

  impl TaskApi for ScriptedApi {
    async fn submit(&self, context: &SessionContext, form_data: &str) -> Result<Value, ApiError> {
      self.answer(Call::Submit {
        tool: context.tool_name.clone(),
        form_data: form_data.to_string(),
      })
    }

    async fn submit_single(
      &self,
      context: &SessionContext,
      id: &TaskId,
      date: &str,
    ) -> Result<Value, ApiError> {
      self.answer(Call::SubmitSingle {
        tool: context.tool_name.clone(),
        id: id.clone(),
        date: date.to_string(),
      })
    }

    async fn check(&self, context: &SessionContext, id: &TaskId) -> Result<Value, ApiError> {
      self.answer(Call::Check {
        tool: context.tool_name.clone(),
        id: id.clone(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use mockito::Matcher;
  use serde_json::json;

  use super::*;

  fn api(server_url: &str, result_style: ResultStyle) -> HttpTaskApi {
    HttpTaskApi::new(&WorkerConfig {
      server_address: Address::parse(server_url).unwrap(),
      result_style,
      ..WorkerConfig::default()
    })
    .unwrap()
  }

  fn context() -> SessionContext {
    SessionContext {
      tool_name: "cube".into(),
      csrf: Some("tok3n".into()),
    }
  }

  #[tokio::test]
  async fn submit_posts_form_data_with_csrf_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/cube/submit")
      .match_header("x-csrftoken", "tok3n")
      .match_header("content-type", FORM_CONTENT_TYPE)
      .match_body("latitude_min=0&latitude_max=1")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"status":"OK","id":7,"title":"T"}"#)
      .create_async()
      .await;

    let reply = api(&server.url(), ResultStyle::Query)
      .submit(&context(), "latitude_min=0&latitude_max=1")
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(reply, json!({ "status": "OK", "id": 7, "title": "T" }));
  }

  #[tokio::test]
  async fn submit_single_encodes_id_and_date() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/cube/submit_single")
      .match_body(Matcher::AllOf(vec![
        Matcher::UrlEncoded("id".into(), "12".into()),
        Matcher::UrlEncoded("date".into(), "2016-05-01".into()),
      ]))
      .with_status(200)
      .with_body(r#"{"status":"OK","id":13}"#)
      .create_async()
      .await;

    api(&server.url(), ResultStyle::Query)
      .submit_single(&context(), &TaskId::from(12), "2016-05-01")
      .await
      .unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn check_uses_query_string_by_default() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/cube/result")
      .match_query(Matcher::UrlEncoded("id".into(), "7".into()))
      .match_header("x-csrftoken", "tok3n")
      .with_status(200)
      .with_body(r#"{"status":"WAIT"}"#)
      .create_async()
      .await;

    let reply = api(&server.url(), ResultStyle::Query)
      .check(&context(), &TaskId::from(7))
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(reply, json!({ "status": "WAIT" }));
  }

  #[tokio::test]
  async fn check_can_post_legacy_query_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/cube/result")
      .match_body("query_id=abc")
      .with_status(200)
      .with_body(r#"{"msg":"WAIT"}"#)
      .create_async()
      .await;

    api(&server.url(), ResultStyle::Form)
      .check(&context(), &TaskId::from("abc"))
      .await
      .unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn missing_token_sends_no_csrf_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/cube/result")
      .match_query(Matcher::Any)
      .match_header("x-csrftoken", Matcher::Missing)
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;

    let context = SessionContext {
      tool_name: "cube".into(),
      csrf: None,
    };
    api(&server.url(), ResultStyle::Query)
      .check(&context, &TaskId::from(1))
      .await
      .unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn non_success_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/cube/submit")
      .with_status(500)
      .create_async()
      .await;

    let err = api(&server.url(), ResultStyle::Query)
      .submit(&context(), "")
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Status(status) if status.as_u16() == 500));
    assert!(err.is_transport());
  }

  #[tokio::test]
  async fn html_body_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/cube/result")
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body("<html>login</html>")
      .create_async()
      .await;

    let err = api(&server.url(), ResultStyle::Query)
      .check(&context(), &TaskId::from(7))
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Decode(_)));
    assert!(!err.is_transport());
  }

  #[tokio::test]
  async fn unreachable_server_is_a_transport_error() {
    let err = api("http://127.0.0.1:1", ResultStyle::Query)
      .check(&context(), &TaskId::from(7))
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Transport(_)));
  }
}
