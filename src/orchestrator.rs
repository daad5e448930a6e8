//! Generation flows: drive a remote engine from request to validated PDF.
//!
//! ## Interview flow
//!
//! ```text
//! create ──▶ advance ──▶ fetch-state ──▶ resolve ──▶ download ──▶ validate
//! (session)  (tolerated)  (snapshot)     (locator)   (fallback)   (%PDF)
//! ```
//!
//! ## Whole-document flow
//!
//! ```text
//! merge ──▶ submit ──▶ classify ──▶ [download] ──▶ validate
//! (local)   (merge/convert)  (PDF or locator)
//! ```
//!
//! Every remote call is awaited in sequence; a flow holds no state after it
//! returns. Dropping the returned future abandons any in-flight request.

use crate::config::RelayConfig;
use crate::dialect::{ConvertDialect, Dialect, InterviewDialect, MergeDialect};
use crate::error::{DocumentGenerationError, RelayError, Stage};
use crate::output::ArtifactDelivery;
use crate::pipeline::classify::{self, Classification};
use crate::pipeline::merge::{self, MergeContext};
use crate::pipeline::resolve::ArtifactResolver;
use crate::progress::{GenerationState, NoopObserver, Observer, StateTracker};
use crate::schema::{NewSessionResponse, SessionSnapshot, SnapshotDecodeError};
use crate::session::{Session, SessionKey, SessionStatus, Variables};
use crate::transport::{FormPart, HttpTransport, OutboundRequest, RemoteResponse, ReqwestTransport};
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs generation flows against the configured [`Dialect`].
pub struct SessionOrchestrator {
    config: RelayConfig,
    transport: Arc<dyn HttpTransport>,
    resolver: ArtifactResolver,
    observer: Observer,
}

impl SessionOrchestrator {
    /// Build an orchestrator over an explicit transport.
    pub fn new(config: RelayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let resolver = ArtifactResolver::new(Arc::clone(&transport), &config.dialect, config.user_agent.clone());
        Self {
            config,
            transport,
            resolver,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Build an orchestrator over a [`ReqwestTransport`] carrying the
    /// config's timeouts.
    pub fn from_config(config: RelayConfig) -> Result<Self, RelayError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Report state transitions to `observer`.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Header values and file writer for the configured file name and disposition.
    pub fn delivery(&self) -> ArtifactDelivery {
        ArtifactDelivery::new(self.config.file_name.clone(), self.config.disposition)
    }

    // ── Interview flow ───────────────────────────────────────────────────

    /// Generate a document through a remote interview session.
    ///
    /// Returns bytes that start with `%PDF`.
    ///
    /// # Errors
    /// A [`DocumentGenerationError`] naming the failed [`Stage`]. Only the
    /// advance step and the primary file download are allowed to fail
    /// without ending the flow.
    pub async fn generate_document(
        &self,
        template_id: &str,
        variables: &Variables,
    ) -> Result<Vec<u8>, DocumentGenerationError> {
        let mut tracker = StateTracker::new(self.observer.as_ref());

        let engine = match &self.config.dialect {
            Dialect::Interview(engine) => engine,
            other => {
                let err = RelayError::InvalidConfig(format!(
                    "generate_document needs the interview dialect, configured dialect is '{}'",
                    other.name()
                ));
                return Err(tracker.fail(err.at(Stage::Create)));
            }
        };

        info!("Generating document from template '{}'", template_id);
        match self.run_session(engine, template_id, variables, &mut tracker).await {
            Ok(bytes) => {
                tracker.complete(bytes.len());
                Ok(bytes)
            }
            Err(e) => {
                warn!("Document generation failed at {}: {}", e.stage, e.cause);
                Err(tracker.fail(e))
            }
        }
    }

    async fn run_session(
        &self,
        engine: &InterviewDialect,
        template_id: &str,
        variables: &Variables,
        tracker: &mut StateTracker<'_>,
    ) -> Result<Vec<u8>, DocumentGenerationError> {
        tracker.stage(Stage::Create);
        let mut session = self
            .create_session(engine, template_id, variables)
            .await
            .map_err(|e| e.at(Stage::Create))?;
        tracker.advance(GenerationState::SessionCreated);

        let result = self.drive_session(engine, &mut session, tracker).await;
        if result.is_err() {
            session.mark(SessionStatus::Failed);
        }
        debug!("Session {} finished as {:?}", session.id(), session.status());
        result
    }

    async fn drive_session(
        &self,
        engine: &InterviewDialect,
        session: &mut Session,
        tracker: &mut StateTracker<'_>,
    ) -> Result<Vec<u8>, DocumentGenerationError> {
        tracker.stage(Stage::Advance);
        self.advance_session(engine, session).await;
        session.mark(SessionStatus::Submitted);
        tracker.advance(GenerationState::Submitted);

        tracker.stage(Stage::FetchState);
        let snapshot = self
            .fetch_state(engine, session.key())
            .await
            .map_err(|e| e.at(Stage::FetchState))?;
        session.mark(SessionStatus::StateFetched);
        tracker.advance(GenerationState::StateFetched);

        let reference = self
            .resolver
            .resolve(&snapshot, session.key())
            .map_err(|e| e.at(Stage::Resolve))?;
        tracker.advance(GenerationState::ArtifactResolved);

        tracker.stage(Stage::Download);
        let fetched = self.resolver.fetch(reference).await.map_err(|e| e.at(Stage::Download))?;
        tracker.advance(GenerationState::Downloaded);

        validate_artifact(fetched.bytes).map_err(|e| e.at(Stage::Validate))
    }

    async fn create_session(
        &self,
        engine: &InterviewDialect,
        template_id: &str,
        variables: &Variables,
    ) -> Result<Session, RelayError> {
        let url = engine.session_new_url(template_id, variables)?;
        let request = OutboundRequest::get(url.clone()).headers(engine.key_headers());
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| e.into_relay(&url, |reason| RelayError::SessionCreation { reason }))?;

        if !response.is_success() {
            return Err(RelayError::SessionCreation {
                reason: format!(
                    "HTTP {} from session/new: {}",
                    response.status_code,
                    classify::preview(&response.raw_bytes)
                ),
            });
        }

        let body: NewSessionResponse =
            serde_json::from_slice(&response.raw_bytes).map_err(|e| RelayError::SessionCreation {
                reason: format!(
                    "undecodable session/new response ({e}): {}",
                    classify::preview(&response.raw_bytes)
                ),
            })?;

        let session_id = body.session_id().ok_or_else(|| RelayError::SessionCreation {
            reason: format!(
                "no session id in response: {}",
                classify::preview(&response.raw_bytes)
            ),
        })?;

        let normalised = body.template_id().unwrap_or(template_id);
        if normalised != template_id {
            debug!("Engine normalised template id '{}' → '{}'", template_id, normalised);
        }
        info!("Created session {} for '{}'", session_id, normalised);

        Ok(Session::created(
            session_id.to_owned(),
            normalised.to_owned(),
            variables.clone(),
        ))
    }

    /// Submit the variables and ask the engine to run to completion.
    ///
    /// The engine's answer is not authoritative (the snapshot is), so every
    /// failure here is logged and swallowed.
    async fn advance_session(&self, engine: &InterviewDialect, session: &Session) {
        let url = match engine.session_url() {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping session advance: {}", e);
                return;
            }
        };
        let body = json!({
            "i": session.template_id(),
            "session": session.id(),
            "variables": session.variables(),
            "question": 1,
        });
        let request = OutboundRequest::post_json(url, body).headers(engine.key_headers());

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => debug!("Session {} advanced", session.id()),
            Ok(response) => warn!(
                "Session advance returned HTTP {}; continuing to fetch state",
                response.status_code
            ),
            Err(e) => warn!("Session advance failed ({}); continuing to fetch state", e),
        }
    }

    async fn fetch_state(&self, engine: &InterviewDialect, key: &SessionKey) -> Result<SessionSnapshot, RelayError> {
        let url = engine.session_state_url(key)?;
        let request = OutboundRequest::get(url.clone()).headers(engine.key_headers());
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| e.into_relay(&url, |reason| RelayError::SessionState { reason }))?;

        if !response.is_success() {
            return Err(RelayError::SessionState {
                reason: format!(
                    "HTTP {} from session state: {}",
                    response.status_code,
                    classify::preview(&response.raw_bytes)
                ),
            });
        }

        SessionSnapshot::decode(&response.raw_bytes).map_err(|e| match e {
            SnapshotDecodeError::Empty => RelayError::SessionState {
                reason: "empty session snapshot".into(),
            },
            SnapshotDecodeError::Malformed(detail) => RelayError::SessionState {
                reason: format!(
                    "unreadable session snapshot ({detail}): {}",
                    classify::preview(&response.raw_bytes)
                ),
            },
        })
    }

    // ── Whole-document flow ──────────────────────────────────────────────

    /// Merge a template locally and submit it to a merge or convert engine.
    ///
    /// Returns bytes that start with `%PDF`.
    pub async fn render_template(&self, context: &MergeContext) -> Result<Vec<u8>, DocumentGenerationError> {
        let mut tracker = StateTracker::new(self.observer.as_ref());

        if let Dialect::Interview(_) = &self.config.dialect {
            let err = RelayError::InvalidConfig(
                "render_template needs the merge or convert dialect, configured dialect is 'interview'".into(),
            );
            return Err(tracker.fail(err.at(Stage::Submit)));
        }

        match self.run_render(context, &mut tracker).await {
            Ok(bytes) => {
                tracker.complete(bytes.len());
                Ok(bytes)
            }
            Err(e) => {
                warn!("Template rendering failed at {}: {}", e.stage, e.cause);
                Err(tracker.fail(e))
            }
        }
    }

    async fn run_render(
        &self,
        context: &MergeContext,
        tracker: &mut StateTracker<'_>,
    ) -> Result<Vec<u8>, DocumentGenerationError> {
        tracker.stage(Stage::Merge);
        let html = merge::merge(context);

        tracker.stage(Stage::Submit);
        let (request, origin) = match &self.config.dialect {
            Dialect::Merge(d) => (self.merge_request(d, context, html), d.endpoint().clone()),
            Dialect::Convert(d) => (self.convert_request(d, html), d.endpoint().clone()),
            Dialect::Interview(_) => {
                return Err(RelayError::InvalidConfig("interview dialect cannot render templates".into())
                    .at(Stage::Submit))
            }
        };

        info!("Submitting merged template to {} engine", self.config.dialect.name());
        let response = self.submit(request, &origin).await.map_err(|e| e.at(Stage::Submit))?;
        tracker.advance(GenerationState::Submitted);

        let classification = classify::classify(&response.raw_bytes, response.declared_content_type.as_deref())
            .map_err(|e| e.at(Stage::Classify))?;

        let bytes = match classification {
            Classification::Binary => {
                debug!("Engine answered with the artifact itself");
                response.raw_bytes
            }
            Classification::StructuredPayload { locator } => {
                let reference = self
                    .resolver
                    .reference_from_locator(&locator, &origin)
                    .map_err(|e| e.at(Stage::Classify))?;
                tracker.advance(GenerationState::ArtifactResolved);

                tracker.stage(Stage::Download);
                self.resolver
                    .fetch(reference)
                    .await
                    .map_err(|e| e.at(Stage::Download))?
                    .bytes
            }
        };
        tracker.advance(GenerationState::Downloaded);

        validate_artifact(bytes).map_err(|e| e.at(Stage::Validate))
    }

    fn merge_request(&self, dialect: &MergeDialect, context: &MergeContext, html: String) -> OutboundRequest {
        let body = json!({
            "templateHtml": html,
            "assetDataUris": context.asset_data_uris(),
            "textPlaceholders": context.text_placeholders,
        });
        OutboundRequest::post_json(dialect.endpoint().clone(), body)
            .header(dialect.api_key_header(), dialect.api_key())
    }

    fn convert_request(&self, dialect: &ConvertDialect, html: String) -> OutboundRequest {
        let html_name = match self.config.file_name.rsplit_once('.') {
            Some((stem, _)) => format!("{stem}.html"),
            None => format!("{}.html", self.config.file_name),
        };
        let parts = vec![
            FormPart::File {
                name: "file".into(),
                file_name: html_name,
                mime_type: "text/html".into(),
                bytes: html.into_bytes(),
            },
            FormPart::Text {
                name: "output_type".into(),
                value: "pdf".into(),
            },
            FormPart::Text {
                name: "output_file_name".into(),
                value: self.config.file_name.clone(),
            },
        ];
        OutboundRequest::post_multipart(dialect.endpoint().clone(), parts)
            .header("Authorization", dialect.authorization())
            .header(dialect.workspace_header(), dialect.workspace_id())
    }

    /// Send a whole-document submission. Non-2xx and empty bodies are
    /// unrecognised responses.
    async fn submit(&self, request: OutboundRequest, origin: &Url) -> Result<RemoteResponse, RelayError> {
        let response = self.transport.execute(request).await.map_err(|e| {
            e.into_relay(origin, |reason| RelayError::Transport {
                url: origin.to_string(),
                reason,
            })
        })?;

        if !response.is_success() {
            return Err(RelayError::UnrecognizedResponse {
                reason: format!("engine returned HTTP {}", response.status_code),
                preview: classify::preview(&response.raw_bytes),
            });
        }
        if response.raw_bytes.is_empty() {
            return Err(RelayError::UnrecognizedResponse {
                reason: "engine returned an empty body".into(),
                preview: String::new(),
            });
        }
        Ok(response)
    }

    // ── Blocking wrappers ────────────────────────────────────────────────

    /// Synchronous wrapper around [`SessionOrchestrator::generate_document`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn generate_document_blocking(
        &self,
        template_id: &str,
        variables: &Variables,
    ) -> Result<Vec<u8>, DocumentGenerationError> {
        runtime(Stage::Create)?.block_on(self.generate_document(template_id, variables))
    }

    /// Synchronous wrapper around [`SessionOrchestrator::render_template`].
    pub fn render_template_blocking(&self, context: &MergeContext) -> Result<Vec<u8>, DocumentGenerationError> {
        runtime(Stage::Submit)?.block_on(self.render_template(context))
    }
}

fn runtime(stage: Stage) -> Result<tokio::runtime::Runtime, DocumentGenerationError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RelayError::InvalidConfig(format!("Failed to create tokio runtime: {e}")).at(stage))
}

/// Check the PDF signature, returning the bytes unchanged on success.
///
/// # Errors
/// [`RelayError::ArtifactValidation`] carrying the byte count and a preview
/// of at most 200 bytes.
pub fn validate_artifact(bytes: Vec<u8>) -> Result<Vec<u8>, RelayError> {
    if classify::has_pdf_signature(&bytes) {
        debug!("Artifact validated ({} bytes)", bytes.len());
        return Ok(bytes);
    }
    Err(RelayError::ArtifactValidation {
        received: bytes.len(),
        preview: classify::preview(&bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_accepts_pdf_signature() {
        let bytes = b"%PDF-1.7\n%\xE2\xE3".to_vec();
        assert_eq!(validate_artifact(bytes.clone()).unwrap(), bytes);
    }

    #[test]
    fn validation_rejects_html_with_short_preview() {
        let page = format!("<html><body>{}</body></html>", "Please log in. ".repeat(100));
        match validate_artifact(page.clone().into_bytes()).unwrap_err() {
            RelayError::ArtifactValidation { received, preview } => {
                assert_eq!(received, page.len());
                assert!(preview.len() <= 200);
                assert!(preview.starts_with("<html><body>Please log in."));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_empty_and_truncated() {
        assert!(validate_artifact(Vec::new()).is_err());
        assert!(validate_artifact(b"%PD".to_vec()).is_err());
    }
}
