//! Artifact resolution and download.
//!
//! ## Resolution priority
//!
//! 1. `attachments[0].url`: a direct link, possibly relative to the engine.
//! 2. `_internal.docvar.<n>.pdf.number`: a numeric file handle.
//!
//! ## Fetch fallback
//!
//! A numeric handle is first fetched from the dedicated file endpoint. When
//! that fails for any reason, including a timeout, the handle is retried
//! against the browser-style interview endpoint with cookie auth. This is the
//! only place in the crate where a failure is absorbed.

use crate::dialect::{Dialect, InterviewDialect};
use crate::error::RelayError;
use crate::schema::SessionSnapshot;
use crate::session::SessionKey;
use crate::transport::{redact_url, HttpTransport, OutboundRequest, TransportError};
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an artifact can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocator {
    DirectUrl(Url),
    NumericHandle(u64),
}

/// A resolved artifact. Consumed by value in [`ArtifactResolver::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub locator: ArtifactLocator,
    /// Absent only for whole-document dialects, which have no remote session.
    pub owning_session: Option<SessionKey>,
}

/// Which download attempt produced the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    FileByHandle,
    InterviewAttachment,
    Direct,
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchStrategy::FileByHandle => "file-by-handle",
            FetchStrategy::InterviewAttachment => "interview-attachment",
            FetchStrategy::Direct => "direct",
        })
    }
}

/// Downloaded artifact bytes plus the strategy that produced them.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub bytes: Vec<u8>,
    pub strategy: FetchStrategy,
}

/// One failed download attempt.
#[derive(Debug)]
struct AttemptFailure {
    url: String,
    reason: String,
    timeout_secs: Option<u64>,
}

/// Turns session state or locator strings into bytes.
pub struct ArtifactResolver {
    transport: Arc<dyn HttpTransport>,
    engine: Option<InterviewDialect>,
    user_agent: String,
}

impl ArtifactResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, dialect: &Dialect, user_agent: impl Into<String>) -> Self {
        let engine = match dialect {
            Dialect::Interview(engine) => Some(engine.clone()),
            Dialect::Merge(_) | Dialect::Convert(_) => None,
        };
        Self {
            transport,
            engine,
            user_agent: user_agent.into(),
        }
    }

    /// Locate the artifact in a session snapshot.
    ///
    /// # Errors
    /// [`RelayError::NoArtifact`] when neither an attachment link nor a PDF
    /// handle is present; [`RelayError::InvalidConfig`] when the resolver was
    /// not built for the interview dialect.
    pub fn resolve(&self, snapshot: &SessionSnapshot, session: &SessionKey) -> Result<ArtifactReference, RelayError> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            RelayError::InvalidConfig("session snapshots can only be resolved for the interview dialect".into())
        })?;

        if let Some(raw) = snapshot.first_attachment_url() {
            match engine.resolve_link(raw) {
                Some(url) => {
                    debug!("Resolved attachment link: {}", redact_url(&url));
                    return Ok(ArtifactReference {
                        locator: ArtifactLocator::DirectUrl(url),
                        owning_session: Some(session.clone()),
                    });
                }
                None => warn!("Ignoring unusable attachment link {:?}", raw),
            }
        }

        if let Some(handle) = snapshot.first_pdf_handle() {
            debug!("Resolved PDF file handle {}", handle);
            return Ok(ArtifactReference {
                locator: ArtifactLocator::NumericHandle(handle),
                owning_session: Some(session.clone()),
            });
        }

        Err(RelayError::NoArtifact {
            keys: snapshot.keys.clone(),
        })
    }

    /// Build a reference from a structured-payload locator, resolving relative
    /// locators against the endpoint that returned them.
    pub fn reference_from_locator(&self, locator: &str, origin: &Url) -> Result<ArtifactReference, RelayError> {
        let url = origin
            .join(locator.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| RelayError::UnrecognizedResponse {
                reason: "locator is not an http(s) URL".into(),
                preview: crate::pipeline::classify::preview(locator.as_bytes()),
            })?;
        Ok(ArtifactReference {
            locator: ArtifactLocator::DirectUrl(url),
            owning_session: None,
        })
    }

    /// Download the referenced artifact, falling back between strategies.
    ///
    /// A non-2xx status or an empty body fails the attempt. When every
    /// applicable attempt fails the result is [`RelayError::Download`], or
    /// [`RelayError::TransportTimeout`] if all of them timed out.
    pub async fn fetch(&self, reference: ArtifactReference) -> Result<FetchedArtifact, RelayError> {
        let mut failures = Vec::new();

        match &reference.locator {
            ArtifactLocator::NumericHandle(handle) => {
                let (engine, key) = match (&self.engine, &reference.owning_session) {
                    (Some(engine), Some(key)) => (engine, key),
                    _ => {
                        return Err(RelayError::InvalidConfig(
                            "numeric file handles need an interview engine and an owning session".into(),
                        ))
                    }
                };

                let primary = OutboundRequest::get(engine.file_url(*handle, key)?).headers(engine.key_headers());
                match self.attempt(primary).await {
                    Ok(bytes) => return Ok(Self::fetched(bytes, FetchStrategy::FileByHandle)),
                    Err(failure) => {
                        warn!(
                            "File endpoint failed for handle {} ({}); falling back to interview attachment",
                            handle, failure.reason
                        );
                        failures.push(failure);
                    }
                }

                let fallback =
                    OutboundRequest::get(engine.attachment_url(*handle, key)?).headers(engine.cookie_headers());
                match self.attempt(fallback).await {
                    Ok(bytes) => return Ok(Self::fetched(bytes, FetchStrategy::InterviewAttachment)),
                    Err(failure) => failures.push(failure),
                }
            }
            ArtifactLocator::DirectUrl(url) => {
                let mut request = OutboundRequest::get(url.clone()).header("User-Agent", self.user_agent.as_str());
                if let Some(engine) = self.engine.as_ref().filter(|e| e.same_origin(url)) {
                    request = request.headers(engine.cookie_headers());
                }
                match self.attempt(request).await {
                    Ok(bytes) => return Ok(Self::fetched(bytes, FetchStrategy::Direct)),
                    Err(failure) => failures.push(failure),
                }
            }
        }

        Err(exhausted(failures))
    }

    fn fetched(bytes: Vec<u8>, strategy: FetchStrategy) -> FetchedArtifact {
        info!("Downloaded artifact via {} ({} bytes)", strategy, bytes.len());
        FetchedArtifact { bytes, strategy }
    }

    async fn attempt(&self, request: OutboundRequest) -> Result<Vec<u8>, AttemptFailure> {
        let url = redact_url(&request.url);
        debug!("Download attempt: {}", request.describe());
        match self.transport.execute(request).await {
            Err(e) => {
                let timeout_secs = match &e {
                    TransportError::Timeout { secs } => Some(*secs),
                    TransportError::Failed(_) => None,
                };
                Err(AttemptFailure {
                    url,
                    reason: e.to_string(),
                    timeout_secs,
                })
            }
            Ok(response) if !response.is_success() => Err(AttemptFailure {
                url,
                reason: format!("HTTP {}", response.status_code),
                timeout_secs: None,
            }),
            Ok(response) if response.raw_bytes.is_empty() => Err(AttemptFailure {
                url,
                reason: "empty body".into(),
                timeout_secs: None,
            }),
            Ok(response) => Ok(response.raw_bytes),
        }
    }
}

fn exhausted(failures: Vec<AttemptFailure>) -> RelayError {
    let all_timed_out = !failures.is_empty() && failures.iter().all(|f| f.timeout_secs.is_some());
    if all_timed_out {
        if let Some(last) = failures.last() {
            return RelayError::TransportTimeout {
                url: last.url.clone(),
                secs: last.timeout_secs.unwrap_or_default(),
            };
        }
    }
    RelayError::Download {
        attempts: failures
            .into_iter()
            .map(|f| format!("{}: {}", f.url, f.reason))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RemoteResponse, TransportError};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl HttpTransport for Unreachable {
        async fn execute(&self, _request: OutboundRequest) -> Result<RemoteResponse, TransportError> {
            Err(TransportError::Failed("no network in unit tests".into()))
        }
    }

    /// Refuses the file endpoint, serves a PDF everywhere else.
    struct FileEndpointDown;

    #[async_trait]
    impl HttpTransport for FileEndpointDown {
        async fn execute(&self, request: OutboundRequest) -> Result<RemoteResponse, TransportError> {
            if request.url.path().starts_with("/api/file/") {
                return Err(TransportError::Failed("connection refused".into()));
            }
            Ok(RemoteResponse {
                status_code: 200,
                declared_content_type: Some("application/pdf".into()),
                raw_bytes: b"%PDF-1.4".to_vec(),
            })
        }
    }

    fn resolver_over(transport: Arc<dyn HttpTransport>) -> ArtifactResolver {
        let engine = InterviewDialect::new("http://localhost:8000", "k").unwrap();
        ArtifactResolver::new(transport, &Dialect::Interview(engine), "test-agent")
    }

    fn resolver() -> ArtifactResolver {
        resolver_over(Arc::new(Unreachable))
    }

    fn key() -> SessionKey {
        SessionKey {
            session_id: "s".into(),
            template_id: "t".into(),
        }
    }

    #[test]
    fn attachment_beats_pdf_number() {
        let snapshot = SessionSnapshot::decode(
            br#"{"attachments": [{"url": "/files/a.pdf"}],
                 "_internal": {"docvar": {"0": {"pdf": {"number": 9}}}}}"#,
        )
        .unwrap();
        let reference = resolver().resolve(&snapshot, &key()).unwrap();
        assert_eq!(
            reference.locator,
            ArtifactLocator::DirectUrl(Url::parse("http://localhost:8000/files/a.pdf").unwrap())
        );
        assert_eq!(reference.owning_session, Some(key()));
    }

    #[test]
    fn attachment_without_url_falls_through_to_handle() {
        let snapshot = SessionSnapshot::decode(
            br#"{"attachments": [{"name": "doc"}],
                 "_internal": {"docvar": {"0": {"pdf": {"number": 9}}}}}"#,
        )
        .unwrap();
        let reference = resolver().resolve(&snapshot, &key()).unwrap();
        assert_eq!(reference.locator, ArtifactLocator::NumericHandle(9));
    }

    #[test]
    fn nothing_to_resolve_lists_keys() {
        let snapshot = SessionSnapshot::decode(br#"{"questionText": "Sign here", "steps": 3}"#).unwrap();
        match resolver().resolve(&snapshot, &key()).unwrap_err() {
            RelayError::NoArtifact { keys } => {
                assert_eq!(keys, vec!["questionText".to_string(), "steps".to_string()])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn locator_resolution_rejects_non_http() {
        let r = resolver();
        let origin = Url::parse("https://api.merge.example/v1/templates/1/merge").unwrap();
        let ok = r.reference_from_locator("/files/out.pdf", &origin).unwrap();
        assert_eq!(
            ok.locator,
            ArtifactLocator::DirectUrl(Url::parse("https://api.merge.example/files/out.pdf").unwrap())
        );
        assert!(ok.owning_session.is_none());
        assert!(r.reference_from_locator("javascript:alert(1)", &origin).is_err());
    }

    #[tokio::test]
    async fn exhausted_transport_errors_become_download_error() {
        let reference = ArtifactReference {
            locator: ArtifactLocator::NumericHandle(3),
            owning_session: Some(key()),
        };
        match resolver().fetch(reference).await.unwrap_err() {
            RelayError::Download { attempts } => assert_eq!(attempts.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_reports_the_strategy_that_worked() {
        let r = resolver_over(Arc::new(FileEndpointDown));

        let by_handle = r
            .fetch(ArtifactReference {
                locator: ArtifactLocator::NumericHandle(3),
                owning_session: Some(key()),
            })
            .await
            .unwrap();
        assert_eq!(by_handle.strategy, FetchStrategy::InterviewAttachment);
        assert_eq!(by_handle.bytes, b"%PDF-1.4");

        let direct = r
            .fetch(ArtifactReference {
                locator: ArtifactLocator::DirectUrl(Url::parse("http://localhost:8000/files/a.pdf").unwrap()),
                owning_session: Some(key()),
            })
            .await
            .unwrap();
        assert_eq!(direct.strategy, FetchStrategy::Direct);
    }
}
