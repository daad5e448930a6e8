//! Handing a validated artifact to its consumer.
//!
//! [`ArtifactDelivery`] renders the two response headers an HTTP layer needs
//! to serve the PDF, and writes it to disk atomically for the CLI.

use crate::error::RelayError;
use crate::pipeline::classify::PDF_CONTENT_TYPE;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// How the artifact is offered to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Download prompt.
    #[default]
    Attachment,
    /// Displayed in the browser.
    Inline,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// Outbound description of a finished artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDelivery {
    pub file_name: String,
    pub disposition: Disposition,
}

impl ArtifactDelivery {
    pub fn new(file_name: impl Into<String>, disposition: Disposition) -> Self {
        Self {
            file_name: file_name.into(),
            disposition,
        }
    }

    /// `Content-Type` header value.
    pub fn content_type(&self) -> &'static str {
        PDF_CONTENT_TYPE
    }

    /// `Content-Disposition` header value, e.g. `attachment; filename="a.pdf"`.
    ///
    /// Quotes, backslashes and control characters in the file name are
    /// dropped so the header stays well-formed.
    pub fn content_disposition(&self) -> String {
        let safe: String = self
            .file_name
            .chars()
            .filter(|c| !matches!(c, '"' | '\\') && !c.is_control())
            .collect();
        format!("{}; filename=\"{}\"", self.disposition.as_str(), safe)
    }

    /// Write `bytes` to `path` atomically.
    ///
    /// The bytes go to a temporary file in the target directory which is then
    /// renamed over `path`, so readers never observe a partial PDF. Missing
    /// parent directories are created.
    pub fn write_artifact(&self, bytes: &[u8], path: &Path) -> Result<(), RelayError> {
        let write_err = |source: std::io::Error| RelayError::OutputWrite {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        info!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}
