//! HTTP backend seam
//!
//! [`ControllerClient`](crate::ControllerClient) speaks to the network only
//! through [`HttpBackend`]. Production code uses [`ReqwestBackend`]; tests
//! substitute scripted backends that record and count calls.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tooling::error::describe_chain;
use url::Url;

/// Failures that prevented an HTTP response from being received
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Connect(_) | BackendError::Timeout(_))
    }
}

/// A file sent as one multipart part
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Multipart form kept as plain data so requests stay cloneable for retries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    pub text: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

/// Request body variants
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

/// One outgoing HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Replace a header, or add it when absent
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// One received HTTP response
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// JSON response with a matching content type
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }

    /// Body parsed as JSON; `Null` for an empty body, `None` if it does not parse
    pub fn json_body(&self) -> Option<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Some(Value::Null);
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// Body as lossy UTF-8 for messages and diagnostics
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes HTTP requests
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BackendError>;
}

/// [`HttpBackend`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Build a client honouring TLS verification and user agent settings
    pub fn new(verify_tls: bool, user_agent: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .user_agent(user_agent)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn classify(err: reqwest::Error) -> BackendError {
        let message = describe_chain(&err);
        if err.is_timeout() {
            BackendError::Timeout(message)
        } else if err.is_connect() {
            BackendError::Connect(message)
        } else if err.is_builder() {
            BackendError::Request(message)
        } else if err.is_body() || err.is_decode() {
            BackendError::Body(message)
        } else {
            BackendError::Connect(message)
        }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => {
                let mut multipart = reqwest::multipart::Form::new();
                for (name, value) in form.text {
                    multipart = multipart.text(name, value);
                }
                if let Some(file) = form.file {
                    let part = reqwest::multipart::Part::bytes(file.content)
                        .file_name(file.file_name)
                        .mime_str(&file.content_type)
                        .map_err(Self::classify)?;
                    multipart = multipart.part(file.field, part);
                }
                builder.multipart(multipart)
            }
        };

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(Self::classify)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
