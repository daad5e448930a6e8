//! Configuration types for document generation.
//!
//! All behaviour is controlled through [`RelayConfig`], built via its
//! [`RelayConfigBuilder`]. Credentials arrive here from the process that
//! starts the relay (CLI flags, environment) and are threaded into the
//! [`Dialect`]; nothing in the library embeds an endpoint or a key.

use crate::dialect::Dialect;
use crate::error::RelayError;
use crate::output::Disposition;

/// Default `User-Agent` for artifact downloads. Some engines reject clients
/// that do not identify themselves.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; DocRelay/0.1)";

/// Configuration for one relay instance.
///
/// # Example
/// ```rust
/// use doc_relay::{Dialect, InterviewDialect, RelayConfig};
///
/// let dialect = InterviewDialect::new("http://localhost:8000", "my-api-key").unwrap();
/// let config = RelayConfig::builder(Dialect::Interview(dialect))
///     .request_timeout_secs(30)
///     .file_name("agreement.pdf")
///     .build()
///     .unwrap();
/// assert_eq!(config.request_timeout_secs, 30);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Which remote engine to talk to, with its endpoints and credentials.
    pub dialect: Dialect,

    /// TCP/TLS connect timeout per outbound call, in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout per outbound call (connect + send + body), in
    /// seconds. Default: 60.
    ///
    /// Session engines occasionally hang while assembling a document. Without
    /// a bound the caller would block forever; with it the call fails with
    /// [`RelayError::TransportTimeout`].
    pub request_timeout_secs: u64,

    /// `User-Agent` sent on every call. Default: [`DEFAULT_USER_AGENT`].
    pub user_agent: String,

    /// File name announced for the artifact (convert uploads, disposition). Default: `document.pdf`.
    pub file_name: String,

    /// How the artifact is offered to the end user. Default: attachment.
    pub disposition: Disposition,
}

impl RelayConfig {
    /// Create a new builder for the given dialect.
    pub fn builder(dialect: Dialect) -> RelayConfigBuilder {
        RelayConfigBuilder {
            config: Self::new(dialect),
        }
    }

    /// A config with every default applied.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            file_name: "document.pdf".to_string(),
            disposition: Disposition::default(),
        }
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.config.file_name = name.into();
        self
    }

    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.config.disposition = disposition;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RelayConfig, RelayError> {
        let c = &self.config;
        if c.connect_timeout_secs == 0 || c.request_timeout_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "Timeouts must be ≥ 1 second; unbounded calls are not allowed".into(),
            ));
        }
        if c.connect_timeout_secs > c.request_timeout_secs {
            return Err(RelayError::InvalidConfig(format!(
                "Connect timeout ({}s) exceeds request timeout ({}s)",
                c.connect_timeout_secs, c.request_timeout_secs
            )));
        }
        if c.user_agent.trim().is_empty() {
            return Err(RelayError::InvalidConfig("User-Agent must not be empty".into()));
        }
        let name = c.file_name.trim();
        if name.is_empty() || name.contains(['/', '\\', '"']) {
            return Err(RelayError::InvalidConfig(format!(
                "Invalid artifact file name '{}'",
                c.file_name
            )));
        }
        Ok(self.config)
    }
}
