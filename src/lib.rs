//! # doc-relay
//!
//! Drive remote document-generation engines to a finished PDF.
//!
//! Engines that assemble documents (interview servers, template mergers,
//! HTML converters) rarely hand back the PDF in one call. Some need a session
//! created, advanced and inspected before the file can be located; some
//! answer with the PDF itself, or with a small (occasionally single-quoted)
//! JSON note saying where to fetch it. This crate hides those differences
//! behind two calls that either return bytes starting with `%PDF` or fail
//! with a typed error naming the stage that broke.
//!
//! ## Flow Overview
//!
//! ```text
//! interview:  create ─▶ advance ─▶ fetch-state ─▶ resolve ─▶ download ─▶ validate
//! merge/convert:  merge ─▶ submit ─▶ classify ─▶ [download] ─▶ validate
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc_relay::{Dialect, InterviewDialect, RelayConfig, SessionOrchestrator, Variables};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key = std::env::var("DOCRELAY_API_KEY")?;
//!     let dialect = InterviewDialect::new("http://localhost:8000", api_key)?;
//!     let config = RelayConfig::builder(Dialect::Interview(dialect)).build()?;
//!     let relay = SessionOrchestrator::from_config(config)?;
//!
//!     let mut vars = Variables::new();
//!     vars.insert("client_name".into(), "Ann Lee".into());
//!     let pdf = relay.generate_document("docassemble.demo:data/questions/agreement.yml", &vars).await?;
//!     relay.delivery().write_artifact(&pdf, std::path::Path::new("agreement.pdf"))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docrelay` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doc-relay = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dialect;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod schema;
pub mod session;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RelayConfig, RelayConfigBuilder, DEFAULT_USER_AGENT};
pub use dialect::{ConvertDialect, Dialect, InterviewDialect, MergeDialect};
pub use error::{DocumentGenerationError, ErrorReport, RelayError, Stage};
pub use orchestrator::{validate_artifact, SessionOrchestrator};
pub use output::{ArtifactDelivery, Disposition};
pub use pipeline::classify::{classify, Classification};
pub use pipeline::merge::{merge, EmbeddedAsset, MergeContext};
pub use pipeline::resolve::{ArtifactLocator, ArtifactReference, ArtifactResolver, FetchStrategy, FetchedArtifact};
pub use progress::{GenerationObserver, GenerationState, NoopObserver};
pub use session::{Session, SessionKey, SessionStatus, Variables};
pub use transport::{HttpTransport, OutboundRequest, RemoteResponse, ReqwestTransport, TransportError};
