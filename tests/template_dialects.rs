//! Whole-document flows: merge and convert engines.

mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::*;
use doc_relay::transport::{FormPart, RequestBody};
use doc_relay::{Dialect, EmbeddedAsset, GenerationState, MergeContext, MergeDialect, Stage};
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;

const MERGE_PATH: &str = "/api/v1/templates/42/merge";
const CONVERT_PATH: &str = "/api/v2/convert";
const PNG_HEAD: [u8; 4] = [0x89, b'P', b'N', b'G'];

fn context() -> MergeContext {
    MergeContext::new("<html><body>Hello {{name}}, img: {{pic}} {{ co_client_name }}</body></html>")
        .text("name", "Ann")
        .asset("pic", EmbeddedAsset::new(PNG_HEAD.to_vec(), "image/png"))
}

// ── Merge dialect ────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_engine_returning_pdf_bytes() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        MERGE_PATH,
        Reply::raw(200, "application/octet-stream", pdf_body()),
    );

    let trail = Arc::new(StateTrail::default());
    let pdf = orchestrator(merge_dialect(), &t)
        .with_observer(trail.clone())
        .render_template(&context())
        .await
        .unwrap();

    assert_eq!(pdf, pdf_body());
    assert_eq!(t.requests().len(), 1);
    assert_eq!(
        trail.states(),
        vec![
            GenerationState::Submitted,
            GenerationState::Downloaded,
            GenerationState::Validated
        ]
    );
}

#[tokio::test]
async fn merge_payload_carries_merged_html_and_maps() {
    let t = ScriptedTransport::new();
    t.on(Method::POST, MERGE_PATH, Reply::pdf());

    orchestrator(merge_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap();

    let request = &t.requests()[0];
    assert_eq!(request.header_value("apikey"), Some("merge-key"));
    let body = match &request.body {
        RequestBody::Json(body) => body,
        other => panic!("expected JSON body, got {other:?}"),
    };
    let uri = format!("data:image/png;base64,{}", STANDARD.encode(PNG_HEAD));
    let html = body["templateHtml"].as_str().unwrap();
    assert!(html.contains(&format!("Hello Ann, img: {uri}")), "{html}");
    assert!(html.contains("{{ co_client_name }}"), "{html}");
    assert_eq!(body["assetDataUris"]["pic"], uri);
    assert_eq!(body["textPlaceholders"]["name"], "Ann");
}

#[tokio::test]
async fn merge_api_key_header_is_configurable() {
    let t = ScriptedTransport::new();
    t.on(Method::POST, MERGE_PATH, Reply::pdf());
    let dialect = Dialect::Merge(
        MergeDialect::new(MERGE_ENDPOINT, "merge-key")
            .unwrap()
            .with_api_key_header("X-Merge-Token"),
    );

    orchestrator(dialect, &t).render_template(&context()).await.unwrap();

    let request = &t.requests()[0];
    assert_eq!(request.header_value("X-Merge-Token"), Some("merge-key"));
    assert_eq!(request.header_value("apikey"), None);
}

#[tokio::test]
async fn single_quoted_locator_is_followed() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        MERGE_PATH,
        Reply::raw(
            200,
            "text/plain",
            "{'data': {'file_url': 'https://files.merge.test/out/agreement.pdf'}}",
        ),
    )
    .on(Method::GET, "/out/agreement.pdf", Reply::pdf());

    let trail = Arc::new(StateTrail::default());
    let pdf = orchestrator(merge_dialect(), &t)
        .with_observer(trail.clone())
        .render_template(&context())
        .await
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let download = &t.requests_to("/out/agreement.pdf")[0];
    assert_eq!(download.url.host_str(), Some("files.merge.test"));
    assert!(download.header_value("User-Agent").is_some());
    assert_eq!(download.header_value("apikey"), None);
    assert!(trail.states().contains(&GenerationState::ArtifactResolved));
}

#[tokio::test]
async fn relative_locator_resolves_against_endpoint() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        MERGE_PATH,
        Reply::json(200, json!({"download_url": "/files/abc.pdf"})),
    )
    .on(Method::GET, "/files/abc.pdf", Reply::pdf());

    orchestrator(merge_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap();
    let download = &t.requests_to("/files/abc.pdf")[0];
    assert_eq!(download.url.host_str(), Some("api.merge.test"));
}

#[tokio::test]
async fn locator_download_failure_is_download_error() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        MERGE_PATH,
        Reply::json(200, json!({"data": {"file_url": "https://files.merge.test/x.pdf"}})),
    )
    .on(Method::GET, "/x.pdf", Reply::empty(200));

    let err = orchestrator(merge_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Download);
    assert_eq!(err.cause.kind(), "DownloadError");
}

#[tokio::test]
async fn payload_without_locator_fails_at_classify() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        MERGE_PATH,
        Reply::json(200, json!({"status": "queued", "id": 17})),
    );

    let err = orchestrator(merge_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Classify);
    assert_eq!(err.cause.kind(), "UnrecognizedResponseError");
    assert!(err.cause.preview().unwrap().contains("queued"));
}

#[tokio::test]
async fn merge_error_status_is_unrecognized() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        MERGE_PATH,
        Reply::json(401, json!({"detail": "Invalid token"})),
    );

    let err = orchestrator(merge_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Submit);
    assert_eq!(err.cause.kind(), "UnrecognizedResponseError");
    assert!(err.to_string().contains("HTTP 401"));
    assert!(err.cause.preview().unwrap().contains("Invalid token"));
}

#[tokio::test]
async fn merge_empty_body_is_unrecognized() {
    let t = ScriptedTransport::new();
    t.on(Method::POST, MERGE_PATH, Reply::empty(200));

    let err = orchestrator(merge_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Submit);
    assert_eq!(err.cause.kind(), "UnrecognizedResponseError");
}

// ── Convert dialect ──────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_sends_multipart_with_auth_headers() {
    let t = ScriptedTransport::new();
    t.on(Method::POST, CONVERT_PATH, Reply::pdf());

    let pdf = orchestrator(convert_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let request = &t.requests()[0];
    assert_eq!(
        request.header_value("Authorization"),
        Some(format!("Bearer {}", STANDARD.encode("convert-key:convert-secret")).as_str())
    );
    assert_eq!(request.header_value("X-Workspace-Id"), Some("ws-9"));

    let parts = match &request.body {
        RequestBody::Multipart(parts) => parts,
        other => panic!("expected multipart body, got {other:?}"),
    };
    let mut saw_file = false;
    let mut texts = Vec::new();
    for part in parts {
        match part {
            FormPart::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => {
                assert_eq!(name, "file");
                assert_eq!(file_name, "agreement.html");
                assert_eq!(mime_type, "text/html");
                assert!(String::from_utf8_lossy(bytes).contains("Hello Ann"));
                saw_file = true;
            }
            FormPart::Text { name, value } => texts.push((name.as_str(), value.as_str())),
        }
    }
    assert!(saw_file);
    assert!(texts.contains(&("output_type", "pdf")));
    assert!(texts.contains(&("output_file_name", "agreement.pdf")));
}

#[tokio::test]
async fn convert_transport_failure_is_transport_error() {
    let t = ScriptedTransport::new();
    t.on(Method::POST, CONVERT_PATH, Reply::Refused);

    let err = orchestrator(convert_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Submit);
    assert_eq!(err.cause.kind(), "TransportError");
}

#[tokio::test]
async fn convert_timeout_is_transport_timeout() {
    let t = ScriptedTransport::new();
    t.on(Method::POST, CONVERT_PATH, Reply::Timeout);

    let err = orchestrator(convert_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.cause.kind(), "TransportTimeoutError");
}

#[tokio::test]
async fn convert_html_response_fails_at_classify() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        CONVERT_PATH,
        Reply::raw(200, "text/html", "<html><body>Maintenance</body></html>"),
    );

    let err = orchestrator(convert_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Classify);
    assert_eq!(err.report().preview.as_deref(), Some("<html><body>Maintenance</body></html>"));
}

#[tokio::test]
async fn declared_pdf_without_signature_fails_validation() {
    let t = ScriptedTransport::new();
    t.on(
        Method::POST,
        CONVERT_PATH,
        Reply::raw(200, "application/pdf", "not really a pdf"),
    );

    let err = orchestrator(convert_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Validate);
    assert_eq!(err.cause.kind(), "ArtifactValidationError");
}

// ── Dialect checks ───────────────────────────────────────────────────────────

#[tokio::test]
async fn interview_dialect_cannot_render_templates() {
    let t = ScriptedTransport::new();
    let err = orchestrator(interview_dialect(), &t)
        .render_template(&context())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Submit);
    assert_eq!(err.cause.kind(), "InvalidConfig");
    assert!(t.requests().is_empty());
}

#[test]
fn blocking_render() {
    let t = ScriptedTransport::new();
    t.on(Method::POST, MERGE_PATH, Reply::pdf());
    let pdf = orchestrator(merge_dialect(), &t)
        .render_template_blocking(&context())
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}
