//! On-disk cache of skill descriptors keyed by content hash and mtime.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::SkillDescriptor;

pub const CACHE_FILE_NAME: &str = "skills_index.json";
const CACHE_VERSION: u32 = 1;

/// One cached descriptor plus the freshness key it was recorded under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Absolute skill directory path (the cache key).
    pub path: PathBuf,
    /// SHA-256 of the SKILL.md bytes at record time.
    pub hash: String,
    /// SKILL.md modification timestamp at record time.
    pub mtime: DateTime<Utc>,
    pub descriptor: SkillDescriptor,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// Single-document JSON cache under the configured cache directory.
///
/// Reads need no lock. Writes serialize through an in-process mutex and an
/// advisory file lock, so concurrent scans from one process (or a sibling
/// process) cannot interleave partial documents. A corrupt or
/// version-mismatched cache is treated as empty, never as fatal.
pub struct MetadataCache {
    file_path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataCache {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            file_path: cache_dir.join(CACHE_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Load all entries, keyed by skill path. Missing, unreadable, corrupt,
    /// or wrong-version caches all come back empty.
    pub fn load(&self) -> HashMap<PathBuf, CacheEntry> {
        let raw = match std::fs::read_to_string(&self.file_path) {
            Ok(raw) => raw,
            Err(_) => return HashMap::new(),
        };
        let parsed: CacheFile = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    path = %self.file_path.display(),
                    %error,
                    "treating corrupt skills index as empty"
                );
                return HashMap::new();
            }
        };
        if parsed.version != CACHE_VERSION {
            tracing::warn!(
                version = parsed.version,
                "treating skills index with unknown version as empty"
            );
            return HashMap::new();
        }
        parsed
            .entries
            .into_iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect()
    }

    /// Look up an entry that is still fresh for the given hash and mtime.
    pub fn lookup<'a>(
        entries: &'a HashMap<PathBuf, CacheEntry>,
        path: &Path,
        hash: &str,
        mtime: DateTime<Utc>,
    ) -> Option<&'a CacheEntry> {
        entries
            .get(path)
            .filter(|entry| entry.hash == hash && entry.mtime == mtime)
    }

    /// Replace the cache document with the given entries.
    pub fn store(&self, entries: Vec<CacheEntry>) -> Result<()> {
        let _serialize_writes = self.write_lock.lock().expect("cache write lock poisoned");

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let document = CacheFile {
            version: CACHE_VERSION,
            entries,
        };
        let serialized = serde_json::to_string_pretty(&document)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.file_path)?;
        file.lock()?;
        let outcome = file
            .set_len(0)
            .and_then(|()| file.write_all(serialized.as_bytes()))
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.flush());
        let _ = file.unlock();
        outcome?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tempfile::tempdir;

    fn descriptor(name: &str, path: &Path) -> SkillDescriptor {
        SkillDescriptor {
            name: name.to_string(),
            description: "cached".to_string(),
            path: path.to_path_buf(),
            license: None,
            compatibility: Map::new(),
            metadata: Map::new(),
            allowed_tools: Vec::new(),
            hash: "abc123".to_string(),
            mtime: Utc::now(),
        }
    }

    fn entry(name: &str, dir: &Path) -> CacheEntry {
        let descriptor = descriptor(name, dir);
        CacheEntry {
            path: dir.to_path_buf(),
            hash: descriptor.hash.clone(),
            mtime: descriptor.mtime,
            descriptor,
        }
    }

    #[test]
    fn entries_round_trip_through_the_cache_file() {
        let dir = tempdir().expect("temp dir should be created");
        let cache = MetadataCache::new(dir.path());
        let skill_dir = dir.path().join("demo");

        cache.store(vec![entry("demo", &skill_dir)]).expect("store should succeed");

        let loaded = cache.load();
        assert_eq!(loaded.len(), 1);
        let restored = &loaded[&skill_dir];
        assert_eq!(restored.descriptor.name, "demo");
        assert_eq!(restored.hash, "abc123");
    }

    #[test]
    fn lookup_requires_both_hash_and_mtime_to_match() {
        let dir = tempdir().expect("temp dir should be created");
        let skill_dir = dir.path().join("demo");
        let entry = entry("demo", &skill_dir);
        let mut entries = HashMap::new();
        entries.insert(skill_dir.clone(), entry.clone());

        assert!(MetadataCache::lookup(&entries, &skill_dir, "abc123", entry.mtime).is_some());
        assert!(MetadataCache::lookup(&entries, &skill_dir, "different", entry.mtime).is_none());
        assert!(
            MetadataCache::lookup(&entries, &skill_dir, "abc123", entry.mtime + chrono::Duration::seconds(1))
                .is_none()
        );
    }

    #[test]
    fn a_corrupt_cache_file_loads_as_empty() {
        let dir = tempdir().expect("temp dir should be created");
        let cache = MetadataCache::new(dir.path());
        std::fs::write(cache.file_path(), "{ this is not json").expect("write junk");
        assert!(cache.load().is_empty());
    }

    #[test]
    fn a_version_mismatch_loads_as_empty() {
        let dir = tempdir().expect("temp dir should be created");
        let cache = MetadataCache::new(dir.path());
        std::fs::write(cache.file_path(), r#"{"version": 99, "entries": []}"#).expect("write");
        assert!(cache.load().is_empty());
    }

    #[test]
    fn a_missing_cache_file_loads_as_empty() {
        let dir = tempdir().expect("temp dir should be created");
        let cache = MetadataCache::new(&dir.path().join("never-created"));
        assert!(cache.load().is_empty());
    }

    #[test]
    fn store_replaces_the_previous_document_entirely() {
        let dir = tempdir().expect("temp dir should be created");
        let cache = MetadataCache::new(dir.path());
        let first = dir.path().join("first");
        let second = dir.path().join("second");

        cache.store(vec![entry("first", &first)]).expect("store");
        cache.store(vec![entry("second", &second)]).expect("store");

        let loaded = cache.load();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&second));
    }
}
