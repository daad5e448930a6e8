//! Pipeline stages shared by the generation flows.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestrator only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! merge ──▶ (submit) ──▶ classify ──▶ resolve ──▶ (validate)
//! (tokens)               (PDF/locator) (fetch + fallback)
//! ```
//!
//! 1. [`merge`]: substitute `{{token}}` placeholders with text or data
//!    URIs; pure, no I/O
//! 2. [`classify`]: decide whether a response body is the PDF or a pointer
//!    to it; pure, no I/O
//! 3. [`resolve`]: turn a session snapshot or locator into a reference and
//!    download it; the only stage with network I/O

pub mod classify;
pub mod merge;
pub mod resolve;
