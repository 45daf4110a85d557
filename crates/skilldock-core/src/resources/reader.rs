//! Bounded reads of skill files with per-session byte accounting.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SkilldockError};
use crate::policy::ResourcePolicy;
use crate::resources::resolver::PathResolver;
use crate::session::SkillSession;
use crate::util::sha256_hex;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Cooperative cancellation signal checked at read chunk boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A completed text read.
#[derive(Debug, Clone)]
pub struct TextRead {
    pub content: String,
    /// Bytes actually returned (and charged), after any truncation.
    pub bytes: u64,
    pub sha256: String,
    pub truncated: bool,
}

/// A completed binary read. Binary content is never truncated.
#[derive(Debug, Clone)]
pub struct BinaryRead {
    pub content: Vec<u8>,
    pub bytes: u64,
    pub sha256: String,
}

/// Reads files subject to a [`ResourcePolicy`] and a session byte budget.
#[derive(Debug, Clone)]
pub struct ResourceReader {
    policy: ResourcePolicy,
}

fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

fn read_prefix(path: &Path, limit: u64, cancel: Option<&CancelToken>) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::with_capacity(limit.min(1 << 20) as usize);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    while (buf.len() as u64) < limit {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(SkilldockError::Io(io::Error::new(
                io::ErrorKind::Interrupted,
                "read cancelled",
            )));
        }
        let want = ((limit - buf.len() as u64) as usize).min(chunk.len());
        let n = file.read(&mut chunk[..want])?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(buf)
}

/// Drop trailing bytes of an incomplete UTF-8 sequence left by a byte-bounded
/// cut. Bytes that are invalid in the middle of the buffer are left alone;
/// the caller replaces those lossily.
fn trim_split_utf8_sequence(buf: &mut Vec<u8>) {
    if let Err(error) = std::str::from_utf8(buf) {
        if error.error_len().is_none() {
            buf.truncate(error.valid_up_to());
        }
    }
}

impl ResourceReader {
    pub fn new(policy: ResourcePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    fn remaining_budget(&self, session: &SkillSession) -> u64 {
        self.policy
            .max_total_bytes_per_session
            .saturating_sub(session.bytes_consumed())
    }

    /// Read a text file, truncating to the per-file cap or the remaining
    /// session budget, whichever binds first. Only bytes actually returned
    /// are charged; failed reads charge nothing.
    pub fn read_text(
        &self,
        session: &mut SkillSession,
        resolver: &PathResolver,
        rel_path: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<TextRead> {
        let resolved = resolver.resolve(rel_path)?;
        let metadata = std::fs::metadata(&resolved)?;
        if !metadata.is_file() {
            return Err(SkilldockError::PolicyViolation(format!(
                "'{rel_path}' is not a regular file"
            )));
        }

        let extension = dotted_extension(&resolved).unwrap_or_default();
        if !self.policy.allows_text_extension(&extension) {
            return Err(SkilldockError::PolicyViolation(format!(
                "extension '{extension}' is not in the text allowlist"
            )));
        }

        let size = metadata.len();
        let remaining = self.remaining_budget(session);
        // A zero-byte file fits any budget; only non-empty reads need room.
        if size > 0 && remaining == 0 {
            return Err(SkilldockError::ResourceTooLarge(format!(
                "session budget of {} bytes exhausted",
                self.policy.max_total_bytes_per_session
            )));
        }

        let limit = size.min(self.policy.max_file_bytes).min(remaining);
        let mut raw = read_prefix(&resolved, limit, cancel)?;
        let truncated = (raw.len() as u64) < size;
        if truncated {
            trim_split_utf8_sequence(&mut raw);
        }

        let content = String::from_utf8_lossy(&raw).into_owned();
        let bytes = content.len() as u64;
        let sha256 = sha256_hex(content.as_bytes());
        session.charge_bytes(bytes);

        tracing::debug!(rel_path, bytes, truncated, "text read");
        Ok(TextRead {
            content,
            bytes,
            sha256,
            truncated,
        })
    }

    /// Read a binary asset in full. Oversized assets and assets that would
    /// blow the session budget fail outright.
    pub fn read_binary(
        &self,
        session: &mut SkillSession,
        resolver: &PathResolver,
        rel_path: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<BinaryRead> {
        if !self.policy.allow_binary_assets {
            return Err(SkilldockError::PolicyViolation(
                "binary asset access is disabled by policy".to_string(),
            ));
        }

        let resolved = resolver.resolve(rel_path)?;
        let metadata = std::fs::metadata(&resolved)?;
        if !metadata.is_file() {
            return Err(SkilldockError::PolicyViolation(format!(
                "'{rel_path}' is not a regular file"
            )));
        }

        let size = metadata.len();
        if size > self.policy.binary_max_bytes {
            return Err(SkilldockError::ResourceTooLarge(format!(
                "asset is {size} bytes, cap is {}",
                self.policy.binary_max_bytes
            )));
        }
        if size > self.remaining_budget(session) {
            return Err(SkilldockError::ResourceTooLarge(format!(
                "asset of {size} bytes exceeds remaining session budget"
            )));
        }

        let content = read_prefix(&resolved, size, cancel)?;
        let bytes = content.len() as u64;
        let sha256 = sha256_hex(&content);
        session.charge_bytes(bytes);

        tracing::debug!(rel_path, bytes, "binary read");
        Ok(BinaryRead {
            content,
            bytes,
            sha256,
        })
    }
}

/// One matching line from a full-text search.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    /// Path relative to the skill directory.
    pub path: String,
    /// 1-based line number.
    pub line: u64,
    pub text: String,
}

/// Case-insensitive substring search across a skill's text files.
#[derive(Debug, Clone)]
pub struct FullTextSearcher {
    max_results: usize,
}

impl Default for FullTextSearcher {
    fn default() -> Self {
        Self { max_results: 20 }
    }
}

impl FullTextSearcher {
    pub fn with_max_results(max_results: usize) -> Self {
        Self { max_results }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Search every allow-listed text file under `subdir` of the skill.
    /// A missing subdirectory yields an empty result set.
    pub fn search(
        &self,
        resolver: &PathResolver,
        subdir: &str,
        query: &str,
        policy: &ResourcePolicy,
    ) -> Result<Vec<SearchHit>> {
        let dir = resolver.skill_root().join(subdir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        self.search_dir(&dir, resolver.skill_root(), &needle, policy, &mut hits)?;
        Ok(hits)
    }

    fn search_dir(
        &self,
        dir: &Path,
        skill_root: &Path,
        needle: &str,
        policy: &ResourcePolicy,
        hits: &mut Vec<SearchHit>,
    ) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<_>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            if hits.len() >= self.max_results {
                return Ok(());
            }
            let path = entry.path();
            if path.is_dir() {
                self.search_dir(&path, skill_root, needle, policy, hits)?;
                continue;
            }
            let extension = dotted_extension(&path).unwrap_or_default();
            if !policy.allows_text_extension(&extension) {
                continue;
            }
            let Ok(raw) = std::fs::read(&path) else {
                continue;
            };
            let text = String::from_utf8_lossy(&raw);
            let rel = path
                .strip_prefix(skill_root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            for (index, line) in text.lines().enumerate() {
                if line.to_lowercase().contains(needle) {
                    hits.push(SearchHit {
                        path: rel.clone(),
                        line: (index + 1) as u64,
                        text: line.to_string(),
                    });
                    if hits.len() >= self.max_results {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}
