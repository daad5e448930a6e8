//! Response classification: is this the PDF, or a note saying where it is?
//!
//! Engines answer a submission with either the finished document or a small
//! structured payload pointing at it. Intermediary gateways sometimes label a
//! PDF as `application/octet-stream` (or drop the header entirely), so the
//! `%PDF` signature is authoritative over the declared type. One engine
//! family emits Python-style single-quoted maps; quotes are normalised before
//! parsing as a best-effort shim.

use crate::error::RelayError;
use crate::schema::LocatorEnvelope;

/// First four bytes of every PDF.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Media type of the artifact format.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Upper bound on diagnostic previews, in bytes.
pub const PREVIEW_LIMIT: usize = 200;

/// What a response turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The body is the artifact itself.
    Binary,
    /// The body names where to fetch the artifact.
    StructuredPayload { locator: String },
}

/// True when `bytes` starts with the PDF signature.
pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// True when the declared type is exactly `application/pdf`, ignoring
/// parameters and case.
pub fn declares_pdf(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
}

/// Classify a response body.
///
/// # Errors
/// [`RelayError::UnrecognizedResponse`] when the body is empty, is not
/// parseable even after quote normalisation, or carries no locator.
pub fn classify(raw: &[u8], declared_content_type: Option<&str>) -> Result<Classification, RelayError> {
    if raw.is_empty() {
        return Err(RelayError::UnrecognizedResponse {
            reason: "empty response body".into(),
            preview: String::new(),
        });
    }
    if has_pdf_signature(raw) || declares_pdf(declared_content_type) {
        return Ok(Classification::Binary);
    }

    let text = String::from_utf8_lossy(raw);
    let normalised = normalise_quotes(&text);
    let envelope: LocatorEnvelope =
        serde_json::from_str(&normalised).map_err(|e| RelayError::UnrecognizedResponse {
            reason: format!("not a PDF and not parseable as JSON ({e})"),
            preview: preview(raw),
        })?;

    match envelope.locator() {
        Some(locator) => Ok(Classification::StructuredPayload {
            locator: locator.to_string(),
        }),
        None => Err(RelayError::UnrecognizedResponse {
            reason: "no file_url or download_url in response".into(),
            preview: preview(raw),
        }),
    }
}

/// Replace single quotes with double quotes.
///
/// Turns `{'data': {'file_url': '…'}}` into valid JSON. A value that itself
/// contains an apostrophe will not survive this; the shim only targets the
/// engines that emit quote-delimited maps of plain URLs.
pub fn normalise_quotes(text: &str) -> String {
    text.replace('\'', "\"")
}

/// A short, log-safe rendering of a payload.
///
/// At most [`PREVIEW_LIMIT`] input bytes are decoded (lossily), whitespace
/// runs collapse to one space, and the result is cut on a char boundary so
/// it never exceeds [`PREVIEW_LIMIT`] bytes.
pub fn preview(bytes: &[u8]) -> String {
    let head = &bytes[..bytes.len().min(PREVIEW_LIMIT)];
    let text = String::from_utf8_lossy(head);
    let mut collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > PREVIEW_LIMIT {
        let mut cut = PREVIEW_LIMIT;
        while !collapsed.is_char_boundary(cut) {
            cut -= 1;
        }
        collapsed.truncate(cut);
    }
    collapsed
}
