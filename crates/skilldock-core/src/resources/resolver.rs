//! Validation of caller-supplied paths inside a skill directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SkilldockError};
use crate::SKILL_FILE_NAME;

/// Maps skill-relative paths to validated absolute paths.
///
/// Normalization happens after symlink resolution: the candidate is
/// canonicalized first and only then compared against the canonical skill
/// root, so a symlink pointing outside the skill cannot smuggle content in.
#[derive(Debug, Clone)]
pub struct PathResolver {
    skill_root: PathBuf,
}

fn traversal(message: impl Into<String>) -> SkilldockError {
    SkilldockError::PathTraversal(message.into())
}

/// Windows drive (`C:`) and UNC (`\\host`) prefixes are refused on every
/// platform; on Unix they would otherwise read as relative paths.
fn has_windows_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if raw.starts_with("\\\\") || raw.starts_with("//") {
        return true;
    }
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl PathResolver {
    /// Bind a resolver to a skill directory, canonicalizing it once.
    pub fn new(skill_root: &Path) -> Result<Self> {
        let skill_root = skill_root.canonicalize().map_err(|error| {
            traversal(format!(
                "skill root '{}' cannot be resolved: {error}",
                skill_root.display()
            ))
        })?;
        Ok(Self { skill_root })
    }

    pub fn skill_root(&self) -> &Path {
        &self.skill_root
    }

    /// Resolve `rel_path` inside the skill, rejecting traversal.
    pub fn resolve(&self, rel_path: &str) -> Result<PathBuf> {
        if rel_path.is_empty() {
            return Err(traversal("empty path"));
        }
        if has_windows_prefix(rel_path) {
            return Err(traversal(format!("'{rel_path}' carries a drive or UNC prefix")));
        }

        let candidate = Path::new(rel_path);
        if candidate.is_absolute() {
            return Err(traversal(format!("'{rel_path}' is absolute")));
        }
        for component in candidate.components() {
            match component {
                Component::ParentDir => {
                    return Err(traversal(format!("'{rel_path}' contains a '..' component")));
                }
                Component::Prefix(_) | Component::RootDir => {
                    return Err(traversal(format!("'{rel_path}' is not skill-relative")));
                }
                Component::CurDir | Component::Normal(_) => {}
            }
        }

        let joined = self.skill_root.join(candidate);
        let resolved = joined.canonicalize().map_err(SkilldockError::Io)?;

        if !resolved.starts_with(&self.skill_root) {
            tracing::warn!(
                rel_path,
                resolved = %resolved.display(),
                "path escapes skill root after symlink resolution"
            );
            return Err(traversal(format!(
                "'{rel_path}' resolves outside the skill directory"
            )));
        }

        if resolved == self.skill_root.join(SKILL_FILE_NAME) {
            return Err(traversal(
                "SKILL.md is only reachable through the instructions API",
            ));
        }

        Ok(resolved)
    }
}
