//! Root walking and descriptor construction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{Result, SkilldockError};
use crate::model::SkillDescriptor;
use crate::parsing::parse_skill_text;
use crate::util::sha256_hex;
use crate::SKILL_FILE_NAME;

/// A directory that looks like a skill: it sits one level under a configured
/// root and contains a SKILL.md.
#[derive(Debug, Clone)]
pub struct SkillCandidate {
    /// Canonical skill directory path.
    pub dir: PathBuf,
    pub skill_md: PathBuf,
}

/// A non-fatal problem encountered while scanning.
#[derive(Debug, Clone)]
pub struct ScanIssue {
    pub path: PathBuf,
    pub message: String,
}

fn issue(path: &Path, message: impl Into<String>) -> ScanIssue {
    ScanIssue {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Walk each root one level deep and collect candidate skill directories.
///
/// Candidates are returned in root order, alphabetical within a root, so
/// later name-collision handling is deterministic. A symlinked candidate
/// whose real path lies outside every configured root is refused.
pub fn scan_roots(roots: &[PathBuf]) -> (Vec<SkillCandidate>, Vec<ScanIssue>) {
    let mut issues = Vec::new();

    let canonical_roots: Vec<PathBuf> = roots
        .iter()
        .filter_map(|root| match root.canonicalize() {
            Ok(canonical) => Some(canonical),
            Err(_) => {
                tracing::debug!(root = %root.display(), "skipping missing scan root");
                None
            }
        })
        .collect();

    let mut candidates = Vec::new();
    for root in &canonical_roots {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(error) => {
                issues.push(issue(root, format!("unable to read root: {error}")));
                continue;
            }
        };

        let mut names: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        names.sort();

        for child in names {
            // `is_dir` follows symlinks, which is what lets a linked skill
            // participate at all; containment is checked on the real path.
            if !child.is_dir() {
                continue;
            }
            let skill_md = child.join(SKILL_FILE_NAME);
            if !skill_md.is_file() {
                continue;
            }
            let dir = match child.canonicalize() {
                Ok(dir) => dir,
                Err(error) => {
                    issues.push(issue(&child, format!("unable to resolve candidate: {error}")));
                    continue;
                }
            };
            if !canonical_roots.iter().any(|r| dir.starts_with(r)) {
                issues.push(issue(
                    &child,
                    "symlinked skill directory resolves outside all configured roots",
                ));
                continue;
            }
            candidates.push(SkillCandidate {
                skill_md: dir.join(SKILL_FILE_NAME),
                dir,
            });
        }
    }

    (candidates, issues)
}

fn expect_object(
    path: &Path,
    key: &str,
    value: Value,
) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(SkilldockError::SkillParse {
            path: path.to_path_buf(),
            message: format!("frontmatter key '{key}' must be a mapping"),
        }),
    }
}

/// Read, hash, and parse a candidate's SKILL.md into a descriptor.
pub fn descriptor_from_candidate(candidate: &SkillCandidate) -> Result<SkillDescriptor> {
    let raw = std::fs::read(&candidate.skill_md)?;
    let hash = sha256_hex(&raw);
    let mtime: DateTime<Utc> = std::fs::metadata(&candidate.skill_md)?.modified()?.into();
    descriptor_from_parts(candidate, &raw, hash, mtime)
}

/// Parse already-read SKILL.md bytes into a descriptor. Callers that hashed
/// the bytes for a cache probe pass the digest through unchanged.
///
/// Known frontmatter keys populate their descriptor fields; everything else
/// is preserved verbatim under `metadata`.
pub fn descriptor_from_parts(
    candidate: &SkillCandidate,
    raw: &[u8],
    hash: String,
    mtime: DateTime<Utc>,
) -> Result<SkillDescriptor> {
    let text = String::from_utf8_lossy(raw);
    let parsed = parse_skill_text(&candidate.skill_md, &text)?;
    let mut fields = parsed.fields;

    if fields.is_empty() {
        return Err(SkilldockError::SkillParse {
            path: candidate.skill_md.clone(),
            message: "SKILL.md has no frontmatter block".to_string(),
        });
    }

    let name = fields
        .remove("name")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let description = fields
        .remove("description")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let license = match fields.remove("license") {
        Some(Value::String(license)) => Some(license),
        Some(other) => {
            fields.insert("license".to_string(), other);
            None
        }
        None => None,
    };

    let compatibility = match fields.remove("compatibility") {
        Some(value) => expect_object(&candidate.skill_md, "compatibility", value)?,
        None => Map::new(),
    };

    let mut metadata = match fields.remove("metadata") {
        Some(value) => expect_object(&candidate.skill_md, "metadata", value)?,
        None => Map::new(),
    };

    let allowed_tools = match fields.remove("allowed_tools") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(tool) => Ok(tool),
                _ => Err(SkilldockError::SkillParse {
                    path: candidate.skill_md.clone(),
                    message: "allowed_tools entries must be strings".to_string(),
                }),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(SkilldockError::SkillParse {
                path: candidate.skill_md.clone(),
                message: "allowed_tools must be a list".to_string(),
            });
        }
        None => Vec::new(),
    };

    // Unknown keys survive under metadata without clobbering explicit ones.
    for (key, value) in fields {
        metadata.entry(key).or_insert(value);
    }

    Ok(SkillDescriptor {
        name,
        description,
        path: candidate.dir.clone(),
        license,
        compatibility,
        metadata,
        allowed_tools,
        hash,
        mtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_skill(root: &Path, folder: &str, frontmatter: &str) -> PathBuf {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).expect("skill dir should be created");
        fs::write(dir.join("SKILL.md"), frontmatter).expect("skill file should be written");
        dir
    }

    #[test]
    fn scanning_finds_immediate_subdirectories_with_skill_md() {
        let temp = tempdir().expect("temp dir should be created");
        write_skill(temp.path(), "alpha", "---\nname: alpha\ndescription: a\n---\n");
        write_skill(temp.path(), "beta", "---\nname: beta\ndescription: b\n---\n");
        fs::create_dir_all(temp.path().join("not-a-skill")).expect("dir");
        fs::write(temp.path().join("stray.md"), "stray").expect("file");

        let (candidates, issues) = scan_roots(&[temp.path().to_path_buf()]);
        assert!(issues.is_empty());
        let names: Vec<_> = candidates
            .iter()
            .map(|c| c.dir.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn nested_skills_below_the_first_level_are_not_candidates() {
        let temp = tempdir().expect("temp dir should be created");
        let parent = temp.path().join("parent");
        fs::create_dir_all(&parent).expect("dir");
        write_skill(&parent, "nested", "---\nname: nested\ndescription: n\n---\n");

        let (candidates, _issues) = scan_roots(&[temp.path().to_path_buf()]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn missing_roots_are_skipped_quietly() {
        let temp = tempdir().expect("temp dir should be created");
        let (candidates, issues) = scan_roots(&[temp.path().join("absent")]);
        assert!(candidates.is_empty());
        assert!(issues.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn a_symlinked_skill_outside_every_root_is_refused() {
        let temp = tempdir().expect("temp dir should be created");
        let outside = temp.path().join("outside");
        write_skill(&outside, "escapee", "---\nname: escapee\ndescription: e\n---\n");

        let root = temp.path().join("root");
        fs::create_dir_all(&root).expect("dir");
        std::os::unix::fs::symlink(outside.join("escapee"), root.join("escapee"))
            .expect("symlink should be created");

        let (candidates, issues) = scan_roots(&[root]);
        assert!(candidates.is_empty());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("outside"), "{}", issues[0].message);
    }

    #[cfg(unix)]
    #[test]
    fn a_symlinked_skill_inside_a_configured_root_is_accepted() {
        let temp = tempdir().expect("temp dir should be created");
        let storage = temp.path().join("storage");
        write_skill(&storage, "real", "---\nname: real\ndescription: r\n---\n");

        let root = temp.path().join("root");
        fs::create_dir_all(&root).expect("dir");
        std::os::unix::fs::symlink(storage.join("real"), root.join("linked"))
            .expect("symlink should be created");

        let (candidates, _issues) =
            scan_roots(&[root, storage]);
        // The link resolves into the second configured root, so it stays.
        assert!(candidates.iter().any(|c| c.dir.ends_with("storage/real")));
    }

    #[test]
    fn descriptors_capture_known_keys_and_preserve_unknown_ones() {
        let temp = tempdir().expect("temp dir should be created");
        let dir = write_skill(
            temp.path(),
            "rich",
            "---\nname: rich\ndescription: a rich skill\nlicense: Apache-2.0\ncompatibility:\n  python: '>=3.10'\nmetadata:\n  author: team\nallowed_tools:\n  - bash\n  - python\nx-custom: kept\n---\nBody text.\n",
        );
        let (candidates, _) = scan_roots(&[temp.path().to_path_buf()]);
        let candidate = candidates
            .iter()
            .find(|c| c.dir.ends_with("rich"))
            .expect("candidate should be found");

        let descriptor = descriptor_from_candidate(candidate).expect("descriptor should build");
        assert_eq!(descriptor.name, "rich");
        assert_eq!(descriptor.description, "a rich skill");
        assert_eq!(descriptor.license.as_deref(), Some("Apache-2.0"));
        assert_eq!(descriptor.compatibility["python"], ">=3.10");
        assert_eq!(descriptor.metadata["author"], "team");
        assert_eq!(descriptor.metadata["x-custom"], "kept");
        assert_eq!(descriptor.allowed_tools, vec!["bash", "python"]);
        assert!(descriptor.path.ends_with("rich"));
        assert_eq!(descriptor.hash.len(), 64);
        let _ = dir;
    }

    #[test]
    fn a_skill_md_without_frontmatter_fails_descriptor_construction() {
        let temp = tempdir().expect("temp dir should be created");
        write_skill(temp.path(), "plain", "Just prose, no frontmatter.\n");
        let (candidates, _) = scan_roots(&[temp.path().to_path_buf()]);

        let error = descriptor_from_candidate(&candidates[0]).expect_err("should fail");
        assert_eq!(error.class_name(), "SkillParseError");
    }

    #[test]
    fn a_non_list_allowed_tools_is_a_parse_error() {
        let temp = tempdir().expect("temp dir should be created");
        write_skill(
            temp.path(),
            "bad-tools",
            "---\nname: bad-tools\ndescription: d\nallowed_tools: bash\n---\n",
        );
        let (candidates, _) = scan_roots(&[temp.path().to_path_buf()]);
        let error = descriptor_from_candidate(&candidates[0]).expect_err("should fail");
        assert!(error.to_string().contains("allowed_tools"), "{error}");
    }

    #[test]
    fn descriptor_hash_matches_the_file_bytes() {
        let temp = tempdir().expect("temp dir should be created");
        let content = "---\nname: hashed\ndescription: d\n---\nbody\n";
        write_skill(temp.path(), "hashed", content);
        let (candidates, _) = scan_roots(&[temp.path().to_path_buf()]);

        let descriptor = descriptor_from_candidate(&candidates[0]).expect("descriptor");
        assert_eq!(descriptor.hash, sha256_hex(content.as_bytes()));
    }
}
