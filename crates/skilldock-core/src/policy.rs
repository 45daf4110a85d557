//! Declarative limits on reading and executing skill content.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Limits applied to reference and asset reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Per-file cap for text reads; longer files are returned as a truncated prefix.
    pub max_file_bytes: u64,
    /// Total bytes a single session may consume across all reads.
    pub max_total_bytes_per_session: u64,
    /// File extensions (with leading dot) the text reader accepts.
    pub allow_extensions_text: BTreeSet<String>,
    /// Whether binary asset reads are permitted at all.
    pub allow_binary_assets: bool,
    /// Per-file cap for binary reads; binary content is never truncated.
    pub binary_max_bytes: u64,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: 200_000,
            max_total_bytes_per_session: 1_000_000,
            allow_extensions_text: [".md", ".txt", ".json", ".yaml", ".yml", ".csv", ".tsv", ".rst"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allow_binary_assets: true,
            binary_max_bytes: 2_000_000,
        }
    }
}

impl ResourcePolicy {
    pub fn allows_text_extension(&self, extension: &str) -> bool {
        self.allow_extensions_text.contains(extension)
    }
}

/// Working directory handed to executed scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkdirMode {
    /// Child cwd is the skill directory itself.
    #[default]
    SkillRoot,
    /// Child cwd is a staged temporary directory, removed after the run.
    Tempdir,
}

/// Permissions and constraints for script execution. Closed by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Master switch; everything below is moot while this is false.
    pub enabled: bool,
    /// Skill names permitted to execute scripts.
    pub allow_skills: BTreeSet<String>,
    /// Glob patterns a script's relative path must match (`*` within a
    /// segment, `**` across segments).
    pub allow_scripts_glob: Vec<String>,
    /// Deadline applied when the caller does not pass one; callers can only
    /// shorten it.
    pub timeout_s_default: u64,
    /// Whether children may reach the network. The local sandbox cannot
    /// enforce this and reports the fact in `ExecutionResult.meta`.
    pub network_access: bool,
    /// Parent environment variables forwarded to children.
    pub env_allowlist: BTreeSet<String>,
    pub workdir_mode: WorkdirMode,
    /// Interpreter used for `.py` scripts.
    pub python_interpreter: PathBuf,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_skills: BTreeSet::new(),
            allow_scripts_glob: Vec::new(),
            timeout_s_default: 60,
            network_access: false,
            env_allowlist: ["PATH", "HOME", "LANG", "LC_ALL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            workdir_mode: WorkdirMode::SkillRoot,
            python_interpreter: PathBuf::from("python3"),
        }
    }
}

impl ExecutionPolicy {
    /// An open policy scoped to exactly the given skills and script globs.
    pub fn allowing(
        skills: impl IntoIterator<Item = impl Into<String>>,
        globs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            enabled: true,
            allow_skills: skills.into_iter().map(Into::into).collect(),
            allow_scripts_glob: globs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}
