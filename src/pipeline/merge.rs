//! Placeholder merge: `{{token}}` → text or embedded data URI.
//!
//! ## Single pass
//!
//! The template is scanned once with a token regex; every match is looked up
//! in the asset and text maps and replaced in the same sweep. Cost stays near
//! linear in template size no matter how many tokens it holds, and a
//! substituted value is never rescanned, so a value that looks like a token
//! (or like a data URI) passes through untouched.
//!
//! ## Permissive
//!
//! Tokens with no value are copied byte-for-byte. Templates routinely carry
//! optional tokens (a co-signer's name, a second signature) that the caller
//! leaves out.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

static RE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("token regex is valid"));

/// A binary asset to inline into the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EmbeddedAsset {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Load an asset from disk, inferring the MIME type from its extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::new(bytes, mime_for_path(path)))
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// MIME type for common image extensions; `application/octet-stream` otherwise.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Everything a merge needs.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub template_bytes: Vec<u8>,
    pub text_placeholders: BTreeMap<String, String>,
    pub embedded_assets: BTreeMap<String, EmbeddedAsset>,
}

impl MergeContext {
    pub fn new(template_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            template_bytes: template_bytes.into(),
            ..Default::default()
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.text_placeholders.insert(name.into(), value.into());
        self
    }

    pub fn asset(mut self, name: impl Into<String>, asset: EmbeddedAsset) -> Self {
        self.embedded_assets.insert(name.into(), asset);
        self
    }

    /// Data URIs for every embedded asset, keyed by token name.
    pub fn asset_data_uris(&self) -> BTreeMap<String, String> {
        self.embedded_assets
            .iter()
            .map(|(name, asset)| (name.clone(), asset.data_uri()))
            .collect()
    }
}

/// Merge the context into its template.
///
/// Assets take precedence when a name appears in both maps. The template is
/// decoded as UTF-8; invalid sequences are replaced with U+FFFD.
pub fn merge(ctx: &MergeContext) -> String {
    let template = String::from_utf8_lossy(&ctx.template_bytes);
    // Encode each asset once, not once per occurrence.
    let uris = ctx.asset_data_uris();
    let mut substituted = 0usize;

    let merged = RE_TOKEN.replace_all(&template, |caps: &Captures| {
        let name = &caps[1];
        if let Some(uri) = uris.get(name) {
            substituted += 1;
            uri.clone()
        } else if let Some(text) = ctx.text_placeholders.get(name) {
            substituted += 1;
            text.clone()
        } else {
            caps[0].to_string()
        }
    });

    debug!(
        "Merged {} placeholder(s) into {}-byte template",
        substituted,
        ctx.template_bytes.len()
    );
    merged.into_owned()
}

/// Cheap check that a template is probably HTML.
pub fn looks_like_html(text: &str) -> bool {
    !text.trim().is_empty()
        && (text.contains("<html") || text.contains("<HTML") || text.contains("<!DOCTYPE"))
}
