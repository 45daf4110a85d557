//! Skill discovery: root scanning and the on-disk metadata cache.

mod cache;
mod scanner;

pub use cache::{CacheEntry, MetadataCache, CACHE_FILE_NAME};
pub use scanner::{
    descriptor_from_candidate, descriptor_from_parts, scan_roots, ScanIssue, SkillCandidate,
};
