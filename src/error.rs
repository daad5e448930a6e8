//! Error types for the doc-relay library.
//!
//! Three layers reflect three audiences:
//!
//! * [`RelayError`]: **What went wrong**: one variant per failure kind
//!   (session creation, missing artifact, bad download, …). Components such as
//!   the classifier and resolver return it directly.
//!
//! * [`DocumentGenerationError`]: **Where it went wrong**: the single terminal
//!   failure of a generation flow, pairing the [`Stage`] that failed with its
//!   [`RelayError`] cause.
//!
//! * [`ErrorReport`]: **What the caller sees**: a serialisable summary with a
//!   kind, a message, and an optional bounded preview of the offending
//!   payload. It never carries a binary body.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure kind a generation flow can surface.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Session lifecycle ─────────────────────────────────────────────────
    /// The engine did not hand back a usable session identifier.
    #[error("Session creation failed: {reason}")]
    SessionCreation { reason: String },

    /// The session snapshot was empty, unreadable, or refused.
    #[error("Session state unavailable: {reason}")]
    SessionState { reason: String },

    // ── Artifact location ────────────────────────────────────────────────
    /// The snapshot named neither an attachment URL nor a numeric file handle.
    #[error("No PDF in session: no 'attachments' URL and no _internal.docvar PDF number. Keys: {keys:?}")]
    NoArtifact { keys: Vec<String> },

    /// A response was neither a PDF nor a recognisable locator payload.
    #[error("Unrecognized response: {reason}\nResponse preview: {preview}")]
    UnrecognizedResponse { reason: String, preview: String },

    // ── Transfer ─────────────────────────────────────────────────────────
    /// Every download strategy was tried and none produced a body.
    #[error("Download failed after {} attempt(s): {}", attempts.len(), attempts.join("; "))]
    Download { attempts: Vec<String> },

    /// The downloaded payload does not start with the PDF signature.
    #[error("Engine did not return a PDF (got {received} bytes).\nResponse preview: {preview}")]
    ArtifactValidation { received: usize, preview: String },

    /// An outbound call exceeded its connect or request timeout.
    #[error("Request to '{url}' timed out after {secs}s")]
    TransportTimeout { url: String, secs: u64 },

    /// An outbound call failed below HTTP (DNS, refused connection, TLS) or
    /// returned an unusable status where no more specific kind applies.
    #[error("Request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    // ── Delivery ─────────────────────────────────────────────────────────
    /// The validated artifact could not be written to disk.
    #[error("Failed to write output to '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed, or a flow was invoked against a dialect
    /// that does not support it.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Stable, machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::SessionCreation { .. } => "SessionCreationError",
            RelayError::SessionState { .. } => "SessionStateError",
            RelayError::NoArtifact { .. } => "NoArtifactError",
            RelayError::UnrecognizedResponse { .. } => "UnrecognizedResponseError",
            RelayError::Download { .. } => "DownloadError",
            RelayError::ArtifactValidation { .. } => "ArtifactValidationError",
            RelayError::TransportTimeout { .. } => "TransportTimeoutError",
            RelayError::Transport { .. } => "TransportError",
            RelayError::OutputWrite { .. } => "OutputWriteError",
            RelayError::InvalidConfig(_) => "InvalidConfig",
        }
    }

    /// Bounded diagnostic preview of the payload that caused the failure, if any.
    pub fn preview(&self) -> Option<&str> {
        match self {
            RelayError::UnrecognizedResponse { preview, .. }
            | RelayError::ArtifactValidation { preview, .. } => Some(preview),
            _ => None,
        }
    }

    /// Attach the stage that failed, producing the terminal error.
    pub fn at(self, stage: Stage) -> DocumentGenerationError {
        DocumentGenerationError { stage, cause: self }
    }
}

/// The step of a generation flow that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Session creation (interview dialect).
    Create,
    /// Variable submission and run-to-completion (interview dialect).
    Advance,
    /// Session snapshot retrieval (interview dialect).
    FetchState,
    /// Turning a snapshot into an artifact reference.
    Resolve,
    /// Downloading the artifact bytes.
    Download,
    /// Checking the PDF signature.
    Validate,
    /// Local placeholder merge (whole-document dialects).
    Merge,
    /// Whole-document submission (merge / convert dialects).
    Submit,
    /// Classifying the submission response.
    Classify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Create => "create",
            Stage::Advance => "advance",
            Stage::FetchState => "fetch-state",
            Stage::Resolve => "resolve",
            Stage::Download => "download",
            Stage::Validate => "validate",
            Stage::Merge => "merge",
            Stage::Submit => "submit",
            Stage::Classify => "classify",
        };
        f.write_str(name)
    }
}

/// The single terminal failure of a generation flow.
#[derive(Debug, Error)]
#[error("Document generation failed at stage '{stage}': {cause}")]
pub struct DocumentGenerationError {
    pub stage: Stage,
    #[source]
    pub cause: RelayError,
}

impl DocumentGenerationError {
    /// Build the caller-facing summary of this failure.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            success: false,
            timestamp: Utc::now(),
            stage: self.stage,
            kind: self.cause.kind(),
            message: self.cause.to_string(),
            preview: self.cause.preview().map(str::to_owned),
        }
    }
}

/// Serialisable failure description handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub success: bool,
    /// When the report was built, serialised as RFC 3339 UTC.
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}
