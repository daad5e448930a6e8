//! Outbound HTTP: one trait, one production implementation.
//!
//! Every remote call in the crate goes through [`HttpTransport`]. The
//! production [`ReqwestTransport`] applies the configured connect and request
//! timeouts to every call, so nothing can block a caller indefinitely.
//! Tests swap in a scripted transport without touching orchestration code.
//!
//! The transport never interprets status codes: a 404 is a successful
//! exchange that returned a [`RemoteResponse`] with `status_code == 404`.
//! Only failures below HTTP (DNS, refused connection, timeout) are
//! [`TransportError`]s.

use crate::config::RelayConfig;
use crate::error::RelayError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A response as it came off the wire. Never persisted.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status_code: u16,
    pub declared_content_type: Option<String>,
    pub raw_bytes: Vec<u8>,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Request payload variants the dialects need.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// One field of a multipart upload.
#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

/// A fully described outbound call.
///
/// Headers may hold credentials, so log [`OutboundRequest::describe`] rather
/// than the `Debug` form.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl OutboundRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(url: Url, body: Value) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_multipart(url: Url, parts: Vec<FormPart>) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: Vec::new(),
            body: RequestBody::Multipart(parts),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<N, V>(mut self, headers: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(n, v)| (n.into(), v.into())));
        self
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `METHOD url` with any `key=` query value masked, safe for logs.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, redact_url(&self.url))
    }
}

/// Mask credential-bearing query parameters.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "key") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "key" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

/// Failure below the HTTP layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("{0}")]
    Failed(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// Map into the crate taxonomy: timeouts always become
    /// [`RelayError::TransportTimeout`]; other failures go through `otherwise`.
    pub fn into_relay(self, url: &Url, otherwise: impl FnOnce(String) -> RelayError) -> RelayError {
        match self {
            TransportError::Timeout { secs } => RelayError::TransportTimeout {
                url: redact_url(url),
                secs,
            },
            TransportError::Failed(reason) => otherwise(reason),
        }
    }
}

/// The seam every remote call goes through.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> Result<RemoteResponse, TransportError>;
}

/// Production transport backed by a single `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
}

impl ReqwestTransport {
    /// Build a client carrying the config's timeouts and `User-Agent`.
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RelayError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            connect_timeout_secs: config.connect_timeout_secs,
            request_timeout_secs: config.request_timeout_secs,
        })
    }

    /// The URL is stripped from the error: interview fallbacks carry the
    /// API key in the query string.
    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_bound(e.is_connect()),
            }
        } else {
            TransportError::Failed(e.without_url().to_string())
        }
    }

    /// The limit that tripped: connect timeouts fire before the request
    /// timeout can.
    fn timeout_bound(&self, during_connect: bool) -> u64 {
        if during_connect {
            self.connect_timeout_secs
        } else {
            self.request_timeout_secs
        }
    }
}

fn build_form(parts: Vec<FormPart>) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => {
                let file = Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(&mime_type)
                    .map_err(|e| TransportError::Failed(format!("invalid MIME type '{mime_type}': {e}")))?;
                form.part(name, file)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<RemoteResponse, TransportError> {
        debug!("→ {}", request.describe());

        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status_code = response.status().as_u16();
        let declared_content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let raw_bytes = response.bytes().await.map_err(|e| self.map_error(e))?.to_vec();

        debug!(
            "← HTTP {} ({} bytes, content-type {:?})",
            status_code,
            raw_bytes.len(),
            declared_content_type
        );

        Ok(RemoteResponse {
            status_code,
            declared_content_type,
            raw_bytes,
        })
    }
}
