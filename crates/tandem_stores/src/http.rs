//! HTTP client abstraction.
//!
//! Adapters build [`HttpRequest`]s and hand them to an [`HttpClient`]. The
//! production implementation is [`ReqwestClient`]; tests drive adapters with
//! a [`ScriptedClient`] that replays canned responses.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

/// Longest response body kept in error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, including the query string.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request with a JSON body.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Creates a PATCH request with a JSON body.
    pub fn patch(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Patch,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a bearer `Authorization` header.
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response as seen by the adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
    /// Parsed `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Creates a 200 response with a JSON body.
    pub fn json_ok(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts non-2xx responses into errors.
    ///
    /// 429 becomes [`StoreError::RateLimited`]; every other failure becomes
    /// [`StoreError::Status`], which is retryable for 5xx only.
    pub fn error_for_status(self) -> StoreResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        if self.status == 429 {
            return Err(StoreError::RateLimited {
                retry_after: self.retry_after,
            });
        }
        let mut body = self.body;
        if body.len() > ERROR_BODY_LIMIT {
            let mut cut = ERROR_BODY_LIMIT;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(StoreError::Status {
            status: self.status,
            body,
        })
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_str(&self.body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// HTTP client abstraction.
///
/// Implementations must enforce their own per-request timeout and report it
/// as [`StoreError::Timeout`].
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    fn execute(&self, request: &HttpRequest) -> StoreResult<HttpResponse>;
}

/// Blocking HTTP client backed by `reqwest`.
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client whose every request times out after `timeout`.
    pub fn new(timeout: Duration) -> StoreResult<Self> {
        let inner = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::transport_fatal(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: &HttpRequest) -> StoreResult<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.inner.get(&request.url),
            Method::Post => self.inner.post(&request.url),
            Method::Patch => self.inner.patch(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().map_err(classify_reqwest_error)?;

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else if err.is_builder() {
        StoreError::transport_fatal(err.to_string())
    } else {
        StoreError::transport_retryable(err.to_string())
    }
}

/// A canned outcome for [`ScriptedClient`].
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this response.
    Respond(HttpResponse),
    /// Fail with [`StoreError::Timeout`].
    Timeout,
    /// Fail with a retryable transport error.
    ConnectionReset,
}

/// An HTTP client that replays scripted outcomes in order and records every
/// request it receives.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedClient {
    /// Creates a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome.
    pub fn push(&self, outcome: Scripted) -> &Self {
        self.script.lock().push_back(outcome);
        self
    }

    /// Queues a 200 response with a JSON body.
    pub fn push_json(&self, body: Value) -> &Self {
        self.push(Scripted::Respond(HttpResponse::json_ok(&body)))
    }

    /// Queues a response with the given status and body.
    pub fn push_status(&self, status: u16, body: impl Into<String>) -> &Self {
        self.push(Scripted::Respond(HttpResponse::new(status, body)))
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl HttpClient for ScriptedClient {
    fn execute(&self, request: &HttpRequest) -> StoreResult<HttpResponse> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Timeout) => Err(StoreError::Timeout),
            Some(Scripted::ConnectionReset) => {
                Err(StoreError::transport_retryable("connection reset by peer"))
            }
            None => Err(StoreError::transport_fatal(format!(
                "no scripted response for {:?} {}",
                request.method, request.url
            ))),
        }
    }
}
