//! Lazy, policy-enforced access to one skill.

use std::sync::Arc;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::error::{ErrorKind, Result, SkilldockError};
use crate::exec::ScriptRunner;
use crate::model::{ExecutionResult, SkillDescriptor};
use crate::parsing::parse_skill_text;
use crate::policy::{ExecutionPolicy, ResourcePolicy};
use crate::resources::{
    BinaryRead, CancelToken, FullTextSearcher, PathResolver, ResourceReader, SearchHit, TextRead,
};
use crate::session::SkillSession;
use crate::util::sha256_hex;
use crate::SKILL_FILE_NAME;

/// Binds one descriptor to the runtime's policies, reader, and runner.
///
/// Handles borrow descriptors and hold no session pointer; byte accounting
/// flows through the `SkillSession` passed into each operation. The SKILL.md
/// body is materialized on the first `instructions` call and memoized.
pub struct SkillHandle {
    descriptor: SkillDescriptor,
    resolver: PathResolver,
    reader: ResourceReader,
    runner: ScriptRunner,
    audit: Arc<dyn AuditSink>,
    instructions: Option<String>,
}

impl std::fmt::Debug for SkillHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl SkillHandle {
    pub(crate) fn bind(
        descriptor: SkillDescriptor,
        resource_policy: ResourcePolicy,
        execution_policy: ExecutionPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let resolver = PathResolver::new(&descriptor.path)?;
        Ok(Self {
            resolver,
            reader: ResourceReader::new(resource_policy),
            runner: ScriptRunner::with_local_sandbox(execution_policy),
            audit,
            descriptor,
            instructions: None,
        })
    }

    pub fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn record(&self, session: &mut SkillSession, event: AuditEvent) {
        self.audit.append(&event);
        session.record(event);
    }

    /// The SKILL.md body, read and budget-charged on first call only.
    ///
    /// Fails with a parse error if the file cannot be re-read or its bytes
    /// no longer hash to the descriptor's digest.
    pub fn instructions(&mut self, session: &mut SkillSession) -> Result<String> {
        if let Some(body) = &self.instructions {
            return Ok(body.clone());
        }

        let skill_md = self.descriptor.skill_md_path();
        let raw = std::fs::read(&skill_md).map_err(|error| SkilldockError::SkillParse {
            path: skill_md.clone(),
            message: format!("unable to re-read SKILL.md: {error}"),
        })?;
        if sha256_hex(&raw) != self.descriptor.hash {
            return Err(SkilldockError::SkillParse {
                path: skill_md,
                message: "SKILL.md changed on disk since the last scan".to_string(),
            });
        }

        let text = String::from_utf8_lossy(&raw);
        let body = parse_skill_text(&skill_md, &text)?.body;

        let bytes = body.len() as u64;
        let budget = self.reader.policy().max_total_bytes_per_session;
        if session.bytes_consumed() + bytes > budget {
            return Err(SkilldockError::ResourceTooLarge(format!(
                "instructions of {bytes} bytes exceed the remaining session budget"
            )));
        }
        session.charge_bytes(bytes);

        let sha256 = sha256_hex(body.as_bytes());
        self.record(
            session,
            AuditEvent::new(AuditKind::Activate, &self.descriptor.name)
                .with_path(SKILL_FILE_NAME)
                .with_bytes(bytes)
                .with_sha256(sha256),
        );

        self.instructions = Some(body.clone());
        Ok(body)
    }

    /// Read a text file inside the skill, subject to resource policy.
    pub fn read_reference(
        &self,
        session: &mut SkillSession,
        rel_path: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<TextRead> {
        let read = self
            .reader
            .read_text(session, &self.resolver, rel_path, cancel)?;
        self.record(
            session,
            AuditEvent::new(AuditKind::Read, &self.descriptor.name)
                .with_path(rel_path)
                .with_bytes(read.bytes)
                .with_sha256(read.sha256.clone())
                .with_detail("truncated", read.truncated),
        );
        Ok(read)
    }

    /// Read a binary asset inside the skill, subject to resource policy.
    pub fn read_asset(
        &self,
        session: &mut SkillSession,
        rel_path: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<BinaryRead> {
        let read = self
            .reader
            .read_binary(session, &self.resolver, rel_path, cancel)?;
        self.record(
            session,
            AuditEvent::new(AuditKind::Read, &self.descriptor.name)
                .with_path(rel_path)
                .with_bytes(read.bytes)
                .with_sha256(read.sha256.clone())
                .with_detail("binary", true),
        );
        Ok(read)
    }

    /// Execute a script inside the skill, subject to execution policy.
    ///
    /// Every attempt is audited: approvals as `execute`, policy rejections
    /// as `policy_violation`, anything else as `error`.
    pub fn run_script(
        &self,
        session: &mut SkillSession,
        rel_path: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        timeout_s: Option<u64>,
    ) -> Result<ExecutionResult> {
        let outcome = self.runner.run(
            self.resolver.skill_root(),
            &self.descriptor.name,
            rel_path,
            args,
            stdin,
            timeout_s,
        );

        match &outcome {
            Ok(result) => {
                self.record(
                    session,
                    AuditEvent::new(AuditKind::Execute, &self.descriptor.name)
                        .with_path(rel_path)
                        .with_detail("exit_code", result.exit_code)
                        .with_detail("duration_ms", result.duration_ms)
                        .with_detail("timeout", result.timed_out()),
                );
            }
            Err(error)
                if matches!(
                    error.kind(),
                    ErrorKind::PolicyViolation
                        | ErrorKind::PathTraversal
                        | ErrorKind::ScriptExecutionDisabled
                ) =>
            {
                self.record(
                    session,
                    AuditEvent::new(AuditKind::PolicyViolation, &self.descriptor.name)
                        .with_path(rel_path)
                        .with_detail("reason", error.to_string()),
                );
            }
            Err(error) => {
                self.record(
                    session,
                    AuditEvent::new(AuditKind::Error, &self.descriptor.name)
                        .with_path(rel_path)
                        .with_detail("error_type", error.class_name())
                        .with_detail("message", error.to_string()),
                );
            }
        }

        outcome
    }

    /// Case-insensitive full-text search over the skill's `references/`.
    pub fn search_references(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        FullTextSearcher::with_max_results(max_results).search(
            &self.resolver,
            "references",
            query,
            self.reader.policy(),
        )
    }
}
