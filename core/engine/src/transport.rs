//! Transport seam for replaying HTTP-shaped requests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use backhaul_common::{Error, Method, Result};
use backhaul_store::PendingAction;

/// An HTTP-shaped request, as the application describes it. The engine
/// never interprets the payload.
#[derive(Debug, Clone)]
pub struct Request {
    pub target: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request with no headers or body.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

impl From<&PendingAction> for Request {
    fn from(action: &PendingAction) -> Self {
        Self {
            target: action.target.clone(),
            method: action.method,
            headers: action.headers.clone(),
            body: action.body.clone(),
        }
    }
}

/// The remote's answer. An error status is still a `Response`; only an
/// unreachable target is an `Err`.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network transport used for direct attempts and queue replay.
///
/// # Errors
/// - [`Error::Transport`] when the target could not be reached at all.
///   A reachable target returning an error status is an `Ok` response
///   the caller classifies.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response>;
}

/// Production transport over `reqwest` with a bounded per-request timeout,
/// so one unreachable target cannot stall a whole drain.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.target);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .to_vec();

        Ok(Response { status, body })
    }
}
