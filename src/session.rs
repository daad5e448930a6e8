//! Request-scoped session values.
//!
//! A [`Session`] lives exactly as long as one `generate_document` call. It is
//! never cached or shared; abandoned remote sessions expire on the engine side.

use serde::Serialize;
use std::collections::BTreeMap;

/// Caller-supplied template variables. Ordered so outbound query strings are
/// deterministic.
pub type Variables = BTreeMap<String, String>;

/// Where a session is in its remote lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Created,
    Submitted,
    StateFetched,
    Failed,
}

/// The `(i, session)` pair every session-scoped URL carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionKey {
    pub session_id: String,
    pub template_id: String,
}

/// One remote interview session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    key: SessionKey,
    variables: Variables,
    status: SessionStatus,
}

impl Session {
    /// Record a freshly created remote session.
    ///
    /// `template_id` should already be the engine-normalised identifier when
    /// the engine returned one.
    pub fn created(session_id: String, template_id: String, variables: Variables) -> Self {
        Self {
            key: SessionKey {
                session_id,
                template_id,
            },
            variables,
            status: SessionStatus::Created,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        &self.key.session_id
    }

    pub fn template_id(&self) -> &str {
        &self.key.template_id
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub(crate) fn mark(&mut self, status: SessionStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_session_keeps_identifier() {
        let mut vars = Variables::new();
        vars.insert("first_name".into(), "Ann".into());
        let mut session = Session::created("abc".into(), "pkg:form.yml".into(), vars);
        assert_eq!(session.status(), SessionStatus::Created);
        assert_eq!(session.id(), "abc");
        assert_eq!(session.template_id(), "pkg:form.yml");

        session.mark(SessionStatus::Submitted);
        session.mark(SessionStatus::StateFetched);
        assert_eq!(session.status(), SessionStatus::StateFetched);
        assert_eq!(session.id(), "abc");
        assert_eq!(session.variables()["first_name"], "Ann");
    }
}
