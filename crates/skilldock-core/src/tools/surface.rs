//! The five-tool surface agents call against a repository.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::audit::{AuditEvent, AuditKind};
use crate::error::{ErrorKind, Result, SkilldockError};
use crate::runtime::{SkillHandle, SkillsRepository};
use crate::session::{SessionManager, SkillSession, SkillState};
use crate::tools::envelope::{
    asset_response, error_response, execution_response, instructions_response, metadata_response,
    reference_response, search_response, ToolResponse,
};

const SEARCH_MAX_RESULTS: usize = 20;

/// Arguments for `skills.run`.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout_s: Option<u64>,
}

/// Wraps a repository and a session manager behind the uniform envelope.
///
/// Handles are created per skill per session and cached so instruction
/// memoization survives across calls; they are never shared between
/// sessions. All five operations return a [`ToolResponse`] and never raise.
pub struct SkillsToolbox {
    repository: Arc<SkillsRepository>,
    sessions: SessionManager,
    handles: Mutex<HashMap<(String, String), SkillHandle>>,
}

impl SkillsToolbox {
    pub fn new(repository: Arc<SkillsRepository>) -> Self {
        Self {
            repository,
            sessions: SessionManager::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<SkillsRepository> {
        &self.repository
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Allocate a fresh session for one agent conversation.
    pub fn open_session(&self) -> String {
        self.sessions.create(None)
    }

    /// Stash an opaque artifact on a session between tool calls.
    pub fn put_artifact(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        self.sessions.with_session(session_id, |session| {
            session.put_artifact(key, value);
            Ok(())
        })
    }

    fn record(&self, session: &mut SkillSession, event: AuditEvent) {
        self.repository.audit_sink().append(&event);
        session.record(event);
    }

    /// Resolve the per-session handle for a skill, creating it on first use.
    fn with_handle<T>(
        &self,
        session_id: &str,
        name: &str,
        op: impl FnOnce(&mut SkillHandle, &mut SkillSession) -> Result<T>,
    ) -> Result<T> {
        self.sessions.with_session(session_id, |session| {
            let mut handles = self.handles.lock().expect("handle table lock poisoned");
            let key = (session_id.to_string(), name.to_string());
            if !handles.contains_key(&key) {
                let handle = self.repository.open(name)?;
                handles.insert(key.clone(), handle);
            }
            let handle = handles.get_mut(&key).expect("handle just inserted");
            op(handle, session)
        })
    }

    /// Convert an operation failure into an error envelope, auditing it at
    /// the boundary unless the layer below already did.
    fn finish(
        &self,
        skill: &str,
        path: Option<&str>,
        result: Result<ToolResponse>,
        already_audited: impl Fn(ErrorKind) -> bool,
    ) -> ToolResponse {
        match result {
            Ok(response) => response,
            Err(error) => {
                if !already_audited(error.kind()) {
                    let kind = match error.kind() {
                        ErrorKind::PolicyViolation
                        | ErrorKind::PathTraversal
                        | ErrorKind::ResourceTooLarge
                        | ErrorKind::ScriptExecutionDisabled => AuditKind::PolicyViolation,
                        _ => AuditKind::Error,
                    };
                    let mut event = AuditEvent::new(kind, skill)
                        .with_detail("error_type", error.class_name())
                        .with_detail("message", error.to_string());
                    if let Some(path) = path {
                        event = event.with_path(path);
                    }
                    self.repository.audit_sink().append(&event);
                }
                error_response(skill, &error, path)
            }
        }
    }

    /// `skills.list`: the current catalog as metadata.
    pub fn list(&self, session_id: &str) -> ToolResponse {
        let result = self.sessions.with_session(session_id, |session| {
            let skills = self.repository.list();
            self.record(
                session,
                AuditEvent::new(AuditKind::List, "all").with_detail("count", skills.len()),
            );
            Ok(metadata_response("all", &skills))
        });
        self.finish("all", None, result, |_| false)
    }

    /// `skills.activate`: select a skill and load its instructions.
    pub fn activate(&self, session_id: &str, name: &str) -> ToolResponse {
        let result = self.with_handle(session_id, name, |handle, session| {
            if session.skill_name.is_none() {
                session.skill_name = Some(name.to_string());
            }
            let body = handle.instructions(session)?;
            session.advance_if_legal(SkillState::Selected);
            session.advance_if_legal(SkillState::InstructionsLoaded);
            Ok(instructions_response(name, &body, crate::SKILL_FILE_NAME))
        });
        self.finish(name, Some(crate::SKILL_FILE_NAME), result, |_| false)
    }

    /// `skills.read`: a reference or asset, chosen by extension.
    ///
    /// Paths with a text-allow-listed extension come back as `reference`
    /// envelopes; everything else is treated as a binary asset.
    pub fn read(&self, session_id: &str, name: &str, rel_path: &str) -> ToolResponse {
        let treat_as_text = Path::new(rel_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .is_some_and(|ext| self.repository.resource_policy().allows_text_extension(&ext));

        let result = self.with_handle(session_id, name, |handle, session| {
            let response = if treat_as_text {
                let read = handle.read_reference(session, rel_path, None)?;
                reference_response(name, rel_path, &read.content, read.truncated)
            } else {
                let read = handle.read_asset(session, rel_path, None)?;
                asset_response(name, rel_path, &read.content)
            };
            session.advance_if_legal(SkillState::ResourceNeeded);
            Ok(response)
        });
        self.finish(name, Some(rel_path), result, |_| false)
    }

    /// `skills.run`: execute a script under full policy enforcement.
    pub fn run(&self, session_id: &str, name: &str, script: &str, request: RunRequest) -> ToolResponse {
        let result = self.with_handle(session_id, name, |handle, session| {
            let outcome = handle.run_script(
                session,
                script,
                &request.args,
                request.stdin.as_deref(),
                request.timeout_s,
            )?;
            session.advance_if_legal(SkillState::ScriptNeeded);
            Ok(execution_response(name, script, &outcome))
        });
        // The handle audits every run attempt itself, whatever the outcome.
        self.finish(name, Some(script), result, |_| true)
    }

    /// `skills.search`: full-text search in one skill's references, or a
    /// catalog name/description filter when no skill is given.
    pub fn search(&self, session_id: &str, name: Option<&str>, query: &str) -> ToolResponse {
        let skill_label = name.unwrap_or("all");
        let result = match name {
            Some(name) => self.with_handle(session_id, name, |handle, session| {
                let hits = handle.search_references(query, SEARCH_MAX_RESULTS)?;
                let values = hits
                    .iter()
                    .map(|hit| serde_json::to_value(hit).map_err(SkilldockError::from))
                    .collect::<Result<Vec<_>>>()?;
                self.record(
                    session,
                    AuditEvent::new(AuditKind::List, name)
                        .with_detail("operation", "search")
                        .with_detail("query", query)
                        .with_detail("result_count", values.len()),
                );
                Ok(search_response(name, query, values))
            }),
            None => self.sessions.with_session(session_id, |session| {
                let needle = query.to_lowercase();
                let values: Vec<Value> = self
                    .repository
                    .list()
                    .into_iter()
                    .filter(|skill| {
                        skill.name.to_lowercase().contains(&needle)
                            || skill.description.to_lowercase().contains(&needle)
                    })
                    .take(SEARCH_MAX_RESULTS)
                    .map(|skill| {
                        serde_json::json!({
                            "name": skill.name,
                            "description": skill.description,
                        })
                    })
                    .collect();
                self.record(
                    session,
                    AuditEvent::new(AuditKind::List, "all")
                        .with_detail("operation", "search")
                        .with_detail("query", query)
                        .with_detail("result_count", values.len()),
                );
                Ok(search_response("all", query, values))
            }),
        };
        self.finish(skill_label, None, result, |_| false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn repository_with_demo(temp: &Path) -> Arc<SkillsRepository> {
        let skill = temp.join("demo");
        fs::create_dir_all(skill.join("references")).expect("references dir");
        fs::write(
            skill.join("SKILL.md"),
            "---\nname: demo\ndescription: A demo skill\n---\n# Demo\n\nFollow the guide.\n",
        )
        .expect("skill file");
        fs::write(skill.join("references/guide.md"), "The Widget guide.\n").expect("reference");

        let repo = Arc::new(SkillsRepository::new(vec![temp.to_path_buf()]));
        repo.refresh().expect("refresh");
        repo
    }

    #[test]
    fn list_returns_metadata_for_every_skill() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();

        let response = toolbox.list(&session);
        assert!(response.ok);
        assert_eq!(response.response_type, crate::tools::ResponseType::Metadata);
        assert_eq!(response.content[0]["name"], "demo");
        assert_eq!(response.meta["count"], 1);
    }

    #[test]
    fn activate_loads_instructions_and_walks_the_state_machine() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();

        let response = toolbox.activate(&session, "demo");
        assert!(response.ok, "{:?}", response.content);
        assert!(response.content.as_str().unwrap().contains("Follow the guide."));

        let snapshot = toolbox.sessions().snapshot(&session).expect("session");
        assert_eq!(snapshot.state, SkillState::InstructionsLoaded);
        assert_eq!(snapshot.skill_name.as_deref(), Some("demo"));
    }

    #[test]
    fn activating_an_unknown_skill_yields_an_error_envelope() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();

        let response = toolbox.activate(&session, "ghost");
        assert!(!response.ok);
        assert_eq!(response.meta["kind"], "skill_not_found");
    }

    #[test]
    fn traversal_through_the_read_tool_is_an_error_envelope() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();
        toolbox.activate(&session, "demo");

        let response = toolbox.read(&session, "demo", "../../etc/passwd");
        assert!(!response.ok);
        assert_eq!(response.meta["error_type"], "PathTraversalError");
    }

    #[test]
    fn run_with_default_policy_is_refused_without_spawning() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();
        toolbox.activate(&session, "demo");

        let response = toolbox.run(&session, "demo", "scripts/x.py", RunRequest::default());
        assert!(!response.ok);
        assert_eq!(response.meta["kind"], "script_execution_disabled");
    }

    #[test]
    fn a_failed_run_is_audited_exactly_once() {
        let temp = tempdir().expect("temp dir");
        let skill = temp.path().join("demo");
        fs::create_dir_all(skill.join("scripts")).expect("scripts dir");
        fs::write(
            skill.join("SKILL.md"),
            "---\nname: demo\ndescription: d\n---\nBody.\n",
        )
        .expect("skill file");
        fs::write(skill.join("scripts/x.sh"), "echo hi\n").expect("script");

        let sink = Arc::new(crate::audit::MemoryAuditSink::new());
        let repo = Arc::new(
            SkillsRepository::new(vec![temp.path().to_path_buf()]).with_audit_sink(sink.clone()),
        );
        repo.refresh().expect("refresh");
        let toolbox = SkillsToolbox::new(repo);
        let session = toolbox.open_session();

        let response = toolbox.run(&session, "demo", "scripts/x.sh", RunRequest::default());
        assert!(!response.ok);
        assert_eq!(
            sink.events_of_kind(AuditKind::PolicyViolation).len(),
            1,
            "one rejected attempt, one policy_violation event"
        );
        assert!(sink.events_of_kind(AuditKind::Error).is_empty());
    }

    #[test]
    fn search_without_a_skill_filters_the_catalog() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();

        let response = toolbox.search(&session, None, "demo");
        assert!(response.ok);
        assert_eq!(response.meta["result_count"], 1);
        assert_eq!(response.content[0]["name"], "demo");

        let miss = toolbox.search(&session, None, "no-such-thing");
        assert_eq!(miss.meta["result_count"], 0);
    }

    #[test]
    fn search_within_a_skill_reads_reference_lines() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();

        let response = toolbox.search(&session, Some("demo"), "widget");
        assert!(response.ok);
        assert_eq!(response.content[0]["path"], "references/guide.md");
        assert_eq!(response.content[0]["line"], 1);
    }

    #[test]
    fn artifacts_can_be_stashed_between_calls() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();

        toolbox
            .put_artifact(&session, "run-1", serde_json::json!({"exit_code": 0}))
            .expect("stash should succeed");
        let snapshot = toolbox.sessions().snapshot(&session).expect("session");
        assert_eq!(snapshot.artifacts["run-1"]["exit_code"], 0);
    }

    #[test]
    fn a_closed_session_turns_every_tool_into_an_error_envelope() {
        let temp = tempdir().expect("temp dir");
        let toolbox = SkillsToolbox::new(repository_with_demo(temp.path()));
        let session = toolbox.open_session();
        toolbox.sessions().close(&session).expect("close");

        let response = toolbox.list(&session);
        assert!(!response.ok);
        assert!(response.content.as_str().unwrap().contains("closed"));
    }
}
