//! Observer trait for generation state transitions.
//!
//! Inject an [`Arc<dyn GenerationObserver>`] via
//! [`crate::orchestrator::SessionOrchestrator::with_observer`] to follow a
//! flow as it moves through its states. The CLI drives a spinner from it;
//! a service could forward the events to its own telemetry.
//!
//! # Example
//!
//! ```rust
//! use doc_relay::{GenerationObserver, GenerationState};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Trail(Mutex<Vec<GenerationState>>);
//!
//! impl GenerationObserver for Trail {
//!     fn on_transition(&self, _from: GenerationState, to: GenerationState) {
//!         self.0.lock().unwrap().push(to);
//!     }
//! }
//! ```

use crate::error::{DocumentGenerationError, Stage};
use std::fmt;
use std::sync::Arc;

/// Where a generation flow is.
///
/// Interview flows walk every state in order. Whole-document flows skip
/// `SessionCreated` and `StateFetched`, and skip `ArtifactResolved` when the
/// engine answers with the PDF itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    SessionCreated,
    Submitted,
    StateFetched,
    ArtifactResolved,
    Downloaded,
    /// Terminal success.
    Validated,
    /// Terminal failure.
    Failed,
}

impl GenerationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationState::Validated | GenerationState::Failed)
    }

    /// Short label for progress displays.
    pub fn label(self) -> &'static str {
        match self {
            GenerationState::Idle => "starting",
            GenerationState::SessionCreated => "session created",
            GenerationState::Submitted => "submitted",
            GenerationState::StateFetched => "state fetched",
            GenerationState::ArtifactResolved => "artifact located",
            GenerationState::Downloaded => "downloaded",
            GenerationState::Validated => "validated",
            GenerationState::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the orchestrator as a flow advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait GenerationObserver: Send + Sync {
    /// Called on every state change, including the final one.
    fn on_transition(&self, from: GenerationState, to: GenerationState) {
        let _ = (from, to);
    }

    /// Called once when a flow fails, after the transition to `Failed`.
    fn on_failure(&self, error: &DocumentGenerationError) {
        let _ = error;
    }

    /// Called once when a validated artifact is ready.
    ///
    /// # Arguments
    /// * `bytes`: size of the artifact
    fn on_complete(&self, bytes: usize) {
        let _ = bytes;
    }

    /// Called when a stage starts that may take a while (remote calls).
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }
}

/// Observer used when none is configured.
pub struct NoopObserver;

impl GenerationObserver for NoopObserver {}

/// Shared observer handle stored by the orchestrator.
pub type Observer = Arc<dyn GenerationObserver>;

/// Tracks the current state and reports each change to an observer.
pub(crate) struct StateTracker<'a> {
    state: GenerationState,
    observer: &'a dyn GenerationObserver,
}

impl<'a> StateTracker<'a> {
    pub(crate) fn new(observer: &'a dyn GenerationObserver) -> Self {
        Self {
            state: GenerationState::Idle,
            observer,
        }
    }

    pub(crate) fn state(&self) -> GenerationState {
        self.state
    }

    pub(crate) fn stage(&self, stage: Stage) {
        self.observer.on_stage(stage);
    }

    /// Move to `next`. Transitions out of a terminal state are ignored.
    pub(crate) fn advance(&mut self, next: GenerationState) {
        if self.state.is_terminal() || self.state == next {
            return;
        }
        let from = std::mem::replace(&mut self.state, next);
        tracing::debug!("Generation state: {} → {}", from, next);
        self.observer.on_transition(from, next);
    }

    pub(crate) fn fail(&mut self, error: DocumentGenerationError) -> DocumentGenerationError {
        self.advance(GenerationState::Failed);
        self.observer.on_failure(&error);
        error
    }

    pub(crate) fn complete(&mut self, bytes: usize) {
        self.advance(GenerationState::Validated);
        self.observer.on_complete(bytes);
    }
}
