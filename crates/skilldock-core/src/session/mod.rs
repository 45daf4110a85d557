//! Session state for one agent-skill interaction.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::audit::AuditEvent;
use crate::error::{Result, SkilldockError};

/// State machine for the skill interaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillState {
    Discovered,
    Selected,
    InstructionsLoaded,
    ResourceNeeded,
    ScriptNeeded,
    Verifying,
    Done,
    Failed,
}

impl SkillState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Selected => "selected",
            Self::InstructionsLoaded => "instructions_loaded",
            Self::ResourceNeeded => "resource_needed",
            Self::ScriptNeeded => "script_needed",
            Self::Verifying => "verifying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is in the allowed-edge set.
    pub fn can_transition_to(self, next: SkillState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Self::Discovered, Self::Selected)
                | (Self::Selected, Self::InstructionsLoaded)
                | (Self::InstructionsLoaded, Self::ResourceNeeded)
                | (Self::InstructionsLoaded, Self::ScriptNeeded)
                | (Self::ResourceNeeded, Self::ScriptNeeded)
                | (Self::ScriptNeeded, Self::ResourceNeeded)
                | (Self::ResourceNeeded, Self::Verifying)
                | (Self::ScriptNeeded, Self::Verifying)
                | (Self::Verifying, Self::Done)
        )
    }
}

/// Stateful container tracking one agent-skill conversation.
///
/// A session is single-owner: concurrent use from multiple threads is
/// serialized by the [`SessionManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSession {
    pub session_id: String,
    pub skill_name: Option<String>,
    pub state: SkillState,
    /// Caller-keyed stash for script outputs between tool calls; values are
    /// opaque to the runtime.
    pub artifacts: Map<String, Value>,
    pub audit: Vec<AuditEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    bytes_consumed: u64,
    #[serde(default)]
    closed: bool,
}

impl SkillSession {
    fn new(skill_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            skill_name,
            state: SkillState::Discovered,
            artifacts: Map::new(),
            audit: Vec::new(),
            created_at: now,
            updated_at: now,
            bytes_consumed: 0,
            closed: false,
        }
    }

    /// Move to `next`, rejecting edges outside the allowed set.
    pub fn transition(&mut self, next: SkillState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SkilldockError::InvalidState(format!(
                "illegal transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            )));
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    /// Apply `next` when the edge is legal, otherwise leave the state alone.
    ///
    /// Tool calls use this to nudge the machine along without failing an
    /// otherwise-successful operation that arrives out of band (e.g. a
    /// reference read while the session is already `Verifying`).
    pub(crate) fn advance_if_legal(&mut self, next: SkillState) {
        if self.state != next && self.state.can_transition_to(next) {
            self.state = next;
            self.touch();
        }
    }

    pub fn put_artifact(&mut self, key: impl Into<String>, value: Value) {
        self.artifacts.insert(key.into(), value);
        self.touch();
    }

    pub fn record(&mut self, event: AuditEvent) {
        self.audit.push(event);
        self.touch();
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    pub(crate) fn charge_bytes(&mut self, bytes: u64) {
        self.bytes_consumed += bytes;
        self.touch();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Allocates sessions and serializes access to them.
///
/// Handles carry session identifiers, never session pointers; every
/// operation resolves the identifier here at call time.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, SkillSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new session in the `Discovered` state and return its id.
    pub fn create(&self, skill_name: Option<&str>) -> String {
        let session = SkillSession::new(skill_name.map(str::to_string));
        let id = session.session_id.clone();
        self.sessions
            .lock()
            .expect("session table lock poisoned")
            .insert(id.clone(), session);
        id
    }

    /// Run `op` against the named session, failing for unknown or closed ids.
    pub fn with_session<T>(
        &self,
        session_id: &str,
        op: impl FnOnce(&mut SkillSession) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.sessions.lock().expect("session table lock poisoned");
        let session = sessions.get_mut(session_id).ok_or_else(|| {
            SkilldockError::InvalidArgument(format!("unknown session '{session_id}'"))
        })?;
        if session.is_closed() {
            return Err(SkilldockError::InvalidState(format!(
                "session '{session_id}' is closed"
            )));
        }
        op(session)
    }

    /// Strict state transition on the named session.
    pub fn transition(&self, session_id: &str, next: SkillState) -> Result<()> {
        self.with_session(session_id, |session| session.transition(next))
    }

    /// Close a session; subsequent operations on it fail.
    pub fn close(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, |session| {
            session.closed = true;
            session.touch();
            Ok(())
        })
    }

    /// Clone of the named session for inspection, closed or not.
    pub fn snapshot(&self, session_id: &str) -> Result<SkillSession> {
        let sessions = self.sessions.lock().expect("session table lock poisoned");
        sessions.get(session_id).cloned().ok_or_else(|| {
            SkilldockError::InvalidArgument(format!("unknown session '{session_id}'"))
        })
    }
}
