//! Typed response schemas, decoded once at the network boundary.
//!
//! Remote engines drift: a field that used to be an object becomes a string, a
//! list gains `null` entries. Every optional field here is decoded with
//! [`lenient`], so an unexpected shape degrades to "absent" instead of failing
//! the whole document. Required structure (the top-level object) is still
//! enforced by the callers.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Decode an optional field, treating any shape mismatch as absence.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

// ── Interview engine ─────────────────────────────────────────────────────

/// Body of `GET /api/session/new`.
#[derive(Debug, Default, Deserialize)]
pub struct NewSessionResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub session: Option<String>,
    /// Engine-normalised template identifier.
    #[serde(default, deserialize_with = "lenient")]
    pub i: Option<String>,
}

impl NewSessionResponse {
    /// The session id, if present and non-blank.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// The normalised template id, if present and non-blank.
    pub fn template_id(&self) -> Option<&str> {
        self.i.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Body of `GET /api/session`: the session snapshot.
#[derive(Debug, Default, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(rename = "_internal", default, deserialize_with = "lenient")]
    pub internal: Option<InternalState>,
    /// Top-level keys of the raw snapshot, kept for diagnostics.
    #[serde(skip)]
    pub keys: Vec<String>,
}

/// One entry of the snapshot's `attachments` list.
#[derive(Debug, Default, Deserialize)]
pub struct Attachment {
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
}

/// The snapshot's `_internal` block.
#[derive(Debug, Default, Deserialize)]
pub struct InternalState {
    /// Per-document state keyed by document index (`"0"`, `"1"`, …). Values
    /// stay raw so one malformed entry cannot hide the others.
    #[serde(default, deserialize_with = "lenient")]
    pub docvar: Option<BTreeMap<String, Value>>,
}

/// One decoded `docvar` entry.
#[derive(Debug, Default, Deserialize)]
pub struct DocVar {
    #[serde(default, deserialize_with = "lenient")]
    pub pdf: Option<DocFile>,
}

/// The `pdf` block of a `docvar` entry.
#[derive(Debug, Default, Deserialize)]
pub struct DocFile {
    #[serde(default, deserialize_with = "lenient")]
    pub number: Option<Value>,
}

impl DocFile {
    /// The numeric file handle, if it is a positive integer.
    pub fn handle(&self) -> Option<u64> {
        let handle = match self.number.as_ref()? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 1.0).map(|f| f as u64)),
            _ => None,
        };
        handle.filter(|&n| n > 0)
    }
}

/// Why a snapshot could not be decoded.
#[derive(Debug, PartialEq, Eq)]
pub enum SnapshotDecodeError {
    /// Zero bytes, `null`, or `{}`.
    Empty,
    /// Not JSON, or JSON but not an object.
    Malformed(String),
}

impl SessionSnapshot {
    /// Decode a snapshot body, rejecting empty and non-object documents.
    pub fn decode(body: &[u8]) -> Result<Self, SnapshotDecodeError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(SnapshotDecodeError::Empty);
        }
        let value: Value =
            serde_json::from_slice(body).map_err(|e| SnapshotDecodeError::Malformed(e.to_string()))?;
        let keys: Vec<String> = match &value {
            Value::Null => return Err(SnapshotDecodeError::Empty),
            Value::Object(map) if map.is_empty() => return Err(SnapshotDecodeError::Empty),
            Value::Object(map) => map.keys().cloned().collect(),
            other => {
                return Err(SnapshotDecodeError::Malformed(format!(
                    "expected a JSON object, got {}",
                    json_type(other)
                )))
            }
        };
        let mut snapshot: SessionSnapshot =
            serde_json::from_value(value).map_err(|e| SnapshotDecodeError::Malformed(e.to_string()))?;
        snapshot.keys = keys;
        Ok(snapshot)
    }

    /// URL of the first attachment, if that entry carries one.
    pub fn first_attachment_url(&self) -> Option<&str> {
        self.attachments
            .as_ref()?
            .first()?
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// First positive `pdf.number` across `_internal.docvar`, scanning
    /// numeric keys in ascending order, then any other keys lexicographically.
    pub fn first_pdf_handle(&self) -> Option<u64> {
        let docvar = self.internal.as_ref()?.docvar.as_ref()?;
        let mut keys: Vec<&String> = docvar.keys().collect();
        keys.sort_by_key(|k| match k.parse::<u64>() {
            Ok(n) => (0, n, (*k).clone()),
            Err(_) => (1, 0, (*k).clone()),
        });
        keys.into_iter().find_map(|k| {
            let entry: DocVar = serde_json::from_value(docvar[k].clone()).ok()?;
            entry.pdf?.handle()
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Merge engine ─────────────────────────────────────────────────────────

/// A structured "fetch it from here" response.
#[derive(Debug, Default, Deserialize)]
pub struct LocatorEnvelope {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<LocatorFields>,
    #[serde(flatten)]
    pub top: LocatorFields,
}

/// The two locator spellings engines use.
#[derive(Debug, Default, Deserialize)]
pub struct LocatorFields {
    #[serde(default, deserialize_with = "lenient")]
    pub file_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub download_url: Option<String>,
}

impl LocatorEnvelope {
    /// Probe `data.file_url`, `data.download_url`, `file_url`, `download_url`
    /// in that order; the first non-blank string wins.
    pub fn locator(&self) -> Option<&str> {
        let nested = self.data.as_ref();
        [
            nested.and_then(|d| d.file_url.as_deref()),
            nested.and_then(|d| d.download_url.as_deref()),
            self.top.file_url.as_deref(),
            self.top.download_url.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
    }
}
