//! Shared helpers for the integration tests: a scripted in-memory transport
//! and canned engine replies.
#![allow(dead_code)]

use async_trait::async_trait;
use doc_relay::progress::GenerationObserver;
use doc_relay::transport::{HttpTransport, OutboundRequest, RemoteResponse, TransportError};
use doc_relay::{
    ConvertDialect, Dialect, DocumentGenerationError, GenerationState, InterviewDialect, MergeDialect, RelayConfig,
    SessionOrchestrator,
};
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

pub const ENGINE: &str = "http://engine.test";
pub const API_KEY: &str = "test-api-key";
pub const MERGE_ENDPOINT: &str = "https://api.merge.test/api/v1/templates/42/merge";
pub const CONVERT_ENDPOINT: &str = "https://convert.test/api/v2/convert";

/// Route library logs through the test harness. `RUST_LOG=doc_relay=debug`
/// shows them for failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// A minimal but signature-valid PDF body.
pub fn pdf_body() -> Vec<u8> {
    b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n".to_vec()
}

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Http {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },
    Timeout,
    Refused,
}

impl Reply {
    pub fn pdf() -> Self {
        Reply::Http {
            status: 200,
            content_type: Some("application/pdf".into()),
            body: pdf_body(),
        }
    }

    pub fn json(status: u16, value: Value) -> Self {
        Reply::Http {
            status,
            content_type: Some("application/json".into()),
            body: value.to_string().into_bytes(),
        }
    }

    pub fn raw(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Reply::Http {
            status,
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Reply::Http {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }
}

/// Routes requests by `(method, path)` to queued replies and records every
/// request. The last reply on a route repeats; unrouted requests get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<OutboundRequest> {
        self.requests().into_iter().filter(|r| r.url.path() == path).collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url.path()))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<RemoteResponse, TransportError> {
        let key = (request.method.clone(), request.url.path().to_string());
        self.requests.lock().unwrap().push(request);

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply.unwrap_or_else(|| Reply::empty(404)) {
            Reply::Http {
                status,
                content_type,
                body,
            } => Ok(RemoteResponse {
                status_code: status,
                declared_content_type: content_type,
                raw_bytes: body,
            }),
            Reply::Timeout => Err(TransportError::Timeout { secs: 60 }),
            Reply::Refused => Err(TransportError::Failed("connection refused".into())),
        }
    }
}

/// Records every state the orchestrator moves into.
#[derive(Default)]
pub struct StateTrail {
    pub states: Mutex<Vec<GenerationState>>,
    pub failures: Mutex<Vec<String>>,
}

impl GenerationObserver for StateTrail {
    fn on_transition(&self, _from: GenerationState, to: GenerationState) {
        self.states.lock().unwrap().push(to);
    }

    fn on_failure(&self, error: &DocumentGenerationError) {
        self.failures.lock().unwrap().push(error.stage.to_string());
    }
}

impl StateTrail {
    pub fn states(&self) -> Vec<GenerationState> {
        self.states.lock().unwrap().clone()
    }
}

pub fn interview_dialect() -> Dialect {
    Dialect::Interview(InterviewDialect::new(ENGINE, API_KEY).unwrap())
}

pub fn merge_dialect() -> Dialect {
    Dialect::Merge(MergeDialect::new(MERGE_ENDPOINT, "merge-key").unwrap())
}

pub fn convert_dialect() -> Dialect {
    Dialect::Convert(ConvertDialect::new(CONVERT_ENDPOINT, "convert-key", "convert-secret", "ws-9").unwrap())
}

pub fn orchestrator(dialect: Dialect, transport: &Arc<ScriptedTransport>) -> SessionOrchestrator {
    init_tracing();
    let config = RelayConfig::builder(dialect)
        .file_name("agreement.pdf")
        .build()
        .unwrap();
    SessionOrchestrator::new(config, transport.clone())
}

/// Script the create and advance calls of a healthy interview engine.
pub fn script_session_start(transport: &ScriptedTransport) {
    transport
        .on(
            Method::GET,
            "/api/session/new",
            Reply::json(200, serde_json::json!({"session": "sess-1", "i": "docassemble.demo:agreement.yml"})),
        )
        .on(Method::POST, "/api/session", Reply::json(200, serde_json::json!({})));
}

/// Script the state call with a snapshot body.
pub fn script_snapshot(transport: &ScriptedTransport, snapshot: Value) {
    transport.on(Method::GET, "/api/session", Reply::json(200, snapshot));
}

/// Query value `name` of a request URL.
pub fn query(request: &OutboundRequest, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
