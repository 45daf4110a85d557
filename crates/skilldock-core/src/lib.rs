//! Skilldock Core -- agent skills runtime
//!
//! A skill is a directory with a `SKILL.md` (YAML frontmatter plus markdown
//! body) and optional `references/`, `assets/`, and `scripts/` subtrees.
//! This crate discovers skills across configured roots, caches their
//! metadata, and lets agents pull content progressively -- metadata at scan
//! time, the body on activation, files on read, scripts on execute -- under
//! strict path, size, and execution policies.
//!
//! The outward surface is [`tools::SkillsToolbox`]: five operations that
//! each return a uniform [`tools::ToolResponse`] envelope and never raise.
//! Library users who want finer control can work with
//! [`runtime::SkillsRepository`] and [`runtime::SkillHandle`] directly.

pub mod audit;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod model;
pub mod parsing;
pub mod policy;
pub mod prompt;
pub mod resources;
pub mod runtime;
pub mod session;
pub mod tools;

mod util;

pub use audit::{AuditEvent, AuditKind, AuditSink, JsonlAuditSink, MemoryAuditSink, NullAuditSink};
pub use error::{ErrorKind, Result, SkilldockError};
pub use exec::{LocalProcessSandbox, Sandbox, ScriptRunner, SpawnSpec};
pub use model::{ExecutionResult, SkillDescriptor};
pub use policy::{ExecutionPolicy, ResourcePolicy, WorkdirMode};
pub use prompt::PromptFormat;
pub use runtime::{SkillHandle, SkillsRepository};
pub use session::{SessionManager, SkillSession, SkillState};
pub use tools::{RunRequest, SkillsToolbox, ToolResponse};

/// The file that marks a directory as a skill.
pub const SKILL_FILE_NAME: &str = "SKILL.md";
