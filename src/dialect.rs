//! Remote engine dialects.
//!
//! Each supported engine speaks a slightly different request/response shape.
//! Rather than one client per engine, a single orchestrator and resolver are
//! parameterised by a [`Dialect`] value that knows the engine's endpoints and
//! credentials and nothing else.
//!
//! | Dialect | Submission | Artifact arrives as |
//! |---------|------------|---------------------|
//! | [`InterviewDialect`] | session create → advance → state | attachment URL or numeric file handle |
//! | [`MergeDialect`] | JSON `{templateHtml, assetDataUris, textPlaceholders}` | raw PDF or `{data: {file_url}}` |
//! | [`ConvertDialect`] | multipart HTML upload | raw PDF |

use crate::error::RelayError;
use crate::session::{SessionKey, Variables};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};

/// Header carrying the interview engine's API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// A supported remote engine shape.
#[derive(Debug, Clone)]
pub enum Dialect {
    Interview(InterviewDialect),
    Merge(MergeDialect),
    Convert(ConvertDialect),
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Interview(_) => "interview",
            Dialect::Merge(_) => "merge",
            Dialect::Convert(_) => "convert",
        }
    }
}

/// Parse an http(s) endpoint, rejecting other schemes up front.
fn parse_endpoint(raw: &str) -> Result<Url, RelayError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| RelayError::InvalidConfig(format!("invalid endpoint '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RelayError::InvalidConfig(format!(
            "endpoint '{raw}' must use http or https, got '{other}'"
        ))),
    }
}

fn require_secret(name: &str, value: String) -> Result<SecretString, RelayError> {
    if value.trim().is_empty() {
        return Err(RelayError::InvalidConfig(format!("{name} must not be empty")));
    }
    Ok(SecretString::new(value))
}

// ── Interview engine ─────────────────────────────────────────────────────

/// A session-based interview engine (`/api/session/...`).
#[derive(Debug, Clone)]
pub struct InterviewDialect {
    base_url: Url,
    api_key: SecretString,
}

impl InterviewDialect {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, RelayError> {
        let mut base_url = parse_endpoint(base_url)?;
        // `Url::join` drops the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            api_key: require_secret("interview API key", api_key.into())?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, RelayError> {
        self.base_url
            .join(path)
            .map_err(|e| RelayError::InvalidConfig(format!("cannot join '{path}' onto base: {e}")))
    }

    /// `GET /api/session/new?i=<template>&<var>=<val>...`
    pub fn session_new_url(&self, template_id: &str, variables: &Variables) -> Result<Url, RelayError> {
        let mut url = self.endpoint("api/session/new")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("i", template_id);
            for (name, value) in variables {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// `POST /api/session`
    pub fn session_url(&self) -> Result<Url, RelayError> {
        self.endpoint("api/session")
    }

    /// `GET /api/session?i=<template>&session=<id>`
    pub fn session_state_url(&self, key: &SessionKey) -> Result<Url, RelayError> {
        let mut url = self.session_url()?;
        url.query_pairs_mut()
            .append_pair("i", &key.template_id)
            .append_pair("session", &key.session_id);
        Ok(url)
    }

    /// `GET /api/file/<handle>?i=<template>&session=<id>`
    pub fn file_url(&self, handle: u64, key: &SessionKey) -> Result<Url, RelayError> {
        let mut url = self.endpoint(&format!("api/file/{handle}"))?;
        url.query_pairs_mut()
            .append_pair("i", &key.template_id)
            .append_pair("session", &key.session_id);
        Ok(url)
    }

    /// `GET /interview?i=...&session=...&attachment=<handle>&key=<apiKey>`
    pub fn attachment_url(&self, handle: u64, key: &SessionKey) -> Result<Url, RelayError> {
        let mut url = self.endpoint("interview")?;
        url.query_pairs_mut()
            .append_pair("i", &key.template_id)
            .append_pair("session", &key.session_id)
            .append_pair("attachment", &handle.to_string())
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    /// Resolve an attachment URL from a snapshot, which may be relative.
    /// Returns `None` for links that cannot form an http(s) URL.
    pub fn resolve_link(&self, raw: &str) -> Option<Url> {
        self.base_url
            .join(raw.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
    }

    /// True when `url` is served by this engine, so credentials may be sent.
    pub fn same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin()
    }

    /// Primary auth: the API-key header.
    pub fn key_headers(&self) -> Vec<(&'static str, String)> {
        vec![(API_KEY_HEADER, self.api_key.expose_secret().clone())]
    }

    /// Secondary auth for browser-style endpoints: header plus cookie.
    pub fn cookie_headers(&self) -> Vec<(&'static str, String)> {
        let key = self.api_key.expose_secret();
        vec![
            (API_KEY_HEADER, key.clone()),
            ("Cookie", format!("{API_KEY_HEADER}={key}")),
        ]
    }
}

// ── Merge engine ─────────────────────────────────────────────────────────

/// A template-merge engine that accepts a whole HTML document as JSON.
#[derive(Debug, Clone)]
pub struct MergeDialect {
    endpoint: Url,
    api_key: SecretString,
    api_key_header: String,
}

impl MergeDialect {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, RelayError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            api_key: require_secret("merge API key", api_key.into())?,
            api_key_header: "apikey".to_string(),
        })
    }

    /// Override the header name carrying the API key. Default: `apikey`.
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn api_key_header(&self) -> &str {
        &self.api_key_header
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

// ── Convert engine ───────────────────────────────────────────────────────

/// An HTML-to-PDF conversion engine that accepts multipart uploads.
#[derive(Debug, Clone)]
pub struct ConvertDialect {
    endpoint: Url,
    api_key: SecretString,
    api_secret: SecretString,
    workspace_id: String,
    workspace_header: String,
}

impl ConvertDialect {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Result<Self, RelayError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            api_key: require_secret("convert API key", api_key.into())?,
            api_secret: require_secret("convert API secret", api_secret.into())?,
            workspace_id: workspace_id.into(),
            workspace_header: "X-Workspace-Id".to_string(),
        })
    }

    /// Override the header name carrying the workspace id. Default: `X-Workspace-Id`.
    pub fn with_workspace_header(mut self, header: impl Into<String>) -> Self {
        self.workspace_header = header.into();
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn workspace_header(&self) -> &str {
        &self.workspace_header
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// `Authorization` header value: `Bearer base64(key:secret)`.
    pub fn authorization(&self) -> String {
        let pair = format!(
            "{}:{}",
            self.api_key.expose_secret(),
            self.api_secret.expose_secret()
        );
        format!("Bearer {}", STANDARD.encode(pair))
    }
}
