//! Data types describing discovered skills and execution outcomes.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata-only record for one skill, produced by the scanner.
///
/// Descriptors never hold skill content; the SKILL.md body and any reference
/// or asset files are materialized on demand through a `SkillHandle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    /// Unique identifier across the repository.
    pub name: String,
    /// Short text shown in catalogs and prompts.
    pub description: String,
    /// Absolute path of the skill directory.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Free-form compatibility claims (framework tags, interpreter versions).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub compatibility: Map<String, Value>,
    /// Free-form author/version/category metadata, including any frontmatter
    /// keys the runtime does not recognize.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Tool names the skill declares it requires, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    /// SHA-256 of the SKILL.md bytes at scan time.
    pub hash: String,
    /// Modification timestamp of SKILL.md at scan time.
    pub mtime: DateTime<Utc>,
}

impl SkillDescriptor {
    /// Absolute path of the skill's SKILL.md file.
    pub fn skill_md_path(&self) -> PathBuf {
        self.path.join(crate::SKILL_FILE_NAME)
    }
}

/// Outcome of one script execution.
///
/// Non-zero exits are reported here rather than raised; `exit_code == -1`
/// is reserved for the deadline expiring (`meta.timeout == true`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Sandbox backend tag plus run-specific flags (`timeout`,
    /// `stdout_truncated`, `stderr_truncated`, `network_enforced`).
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ExecutionResult {
    pub fn timed_out(&self) -> bool {
        self.exit_code == -1 && self.meta.get("timeout").and_then(Value::as_bool) == Some(true)
    }
}
