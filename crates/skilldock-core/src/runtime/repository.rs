//! The top-level skill registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::audit::{AuditEvent, AuditKind, AuditSink, NullAuditSink};
use crate::discovery::{
    descriptor_from_parts, scan_roots, CacheEntry, MetadataCache, SkillCandidate,
};
use crate::error::{Result, SkilldockError};
use crate::model::SkillDescriptor;
use crate::policy::{ExecutionPolicy, ResourcePolicy};
use crate::prompt::{render_catalog, PromptFormat};
use crate::runtime::handle::SkillHandle;
use crate::util::sha256_hex;

/// Immutable view of one completed scan. `refresh` builds a new catalog and
/// swaps it in atomically, so concurrent readers always see a consistent
/// snapshot.
#[derive(Default)]
struct Catalog {
    ordered: Vec<SkillDescriptor>,
    by_name: HashMap<String, usize>,
}

/// Central registry: discovery, lookup, and prompt-catalog materialization.
///
/// Policies are passed by value at construction and never mutated afterward;
/// the cache directory is the only filesystem configuration input.
pub struct SkillsRepository {
    roots: Vec<PathBuf>,
    cache: Option<MetadataCache>,
    resource_policy: ResourcePolicy,
    execution_policy: ExecutionPolicy,
    audit: Arc<dyn AuditSink>,
    catalog: RwLock<Arc<Catalog>>,
}

impl SkillsRepository {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            cache: None,
            resource_policy: ResourcePolicy::default(),
            execution_policy: ExecutionPolicy::default(),
            audit: Arc::new(NullAuditSink),
            catalog: RwLock::new(Arc::new(Catalog::default())),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: &Path) -> Self {
        self.cache = Some(MetadataCache::new(cache_dir));
        self
    }

    pub fn with_resource_policy(mut self, policy: ResourcePolicy) -> Self {
        self.resource_policy = policy;
        self
    }

    pub fn with_execution_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.execution_policy = policy;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        self.audit.clone()
    }

    pub fn resource_policy(&self) -> &ResourcePolicy {
        &self.resource_policy
    }

    pub fn execution_policy(&self) -> &ExecutionPolicy {
        &self.execution_policy
    }

    fn scan_event(&self, candidate: &SkillCandidate, name: &str) -> AuditEvent {
        AuditEvent::new(AuditKind::Scan, name).with_path(candidate.dir.to_string_lossy())
    }

    /// Scan the configured roots and replace the catalog.
    ///
    /// Per-skill failures (unreadable SKILL.md, parse errors, duplicate
    /// names) are audited and skipped; an empty catalog is a valid outcome.
    /// Cache hits are observable through the `parsed` detail on `scan`
    /// events.
    pub fn refresh(&self) -> Result<Vec<SkillDescriptor>> {
        let (candidates, issues) = scan_roots(&self.roots);
        for issue in issues {
            self.audit.append(
                &AuditEvent::new(AuditKind::Scan, "")
                    .with_path(issue.path.to_string_lossy())
                    .with_detail("error", issue.message),
            );
        }

        let cached = self.cache.as_ref().map(|cache| cache.load()).unwrap_or_default();

        let mut ordered: Vec<SkillDescriptor> = Vec::with_capacity(candidates.len());
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut entries: Vec<CacheEntry> = Vec::with_capacity(candidates.len());

        for candidate in &candidates {
            let raw = match std::fs::read(&candidate.skill_md) {
                Ok(raw) => raw,
                Err(error) => {
                    self.audit.append(
                        &self
                            .scan_event(candidate, "")
                            .with_detail("error", format!("unable to read SKILL.md: {error}")),
                    );
                    continue;
                }
            };
            let hash = sha256_hex(&raw);
            let mtime = match std::fs::metadata(&candidate.skill_md).and_then(|m| m.modified()) {
                Ok(modified) => modified.into(),
                Err(error) => {
                    self.audit.append(
                        &self
                            .scan_event(candidate, "")
                            .with_detail("error", format!("unable to stat SKILL.md: {error}")),
                    );
                    continue;
                }
            };

            let (descriptor, parsed) =
                match MetadataCache::lookup(&cached, &candidate.dir, &hash, mtime) {
                    Some(entry) => (entry.descriptor.clone(), false),
                    None => match descriptor_from_parts(candidate, &raw, hash.clone(), mtime) {
                        Ok(descriptor) => (descriptor, true),
                        Err(error) => {
                            tracing::warn!(
                                skill = %candidate.dir.display(),
                                %error,
                                "skipping unparseable skill"
                            );
                            self.audit.append(
                                &self
                                    .scan_event(candidate, "")
                                    .with_detail("error", error.to_string()),
                            );
                            continue;
                        }
                    },
                };

            if let Some(&winner) = by_name.get(&descriptor.name) {
                let winner_path = ordered[winner].path.clone();
                tracing::warn!(
                    name = %descriptor.name,
                    winner = %winner_path.display(),
                    loser = %candidate.dir.display(),
                    "duplicate skill name, keeping first"
                );
                self.audit.append(
                    &self
                        .scan_event(candidate, &descriptor.name)
                        .with_detail("error", "duplicate skill name")
                        .with_detail("winner", winner_path.to_string_lossy()),
                );
                continue;
            }

            self.audit.append(
                &self
                    .scan_event(candidate, &descriptor.name)
                    .with_sha256(hash.clone())
                    .with_detail("parsed", parsed),
            );

            entries.push(CacheEntry {
                path: candidate.dir.clone(),
                hash,
                mtime,
                descriptor: descriptor.clone(),
            });
            by_name.insert(descriptor.name.clone(), ordered.len());
            ordered.push(descriptor);
        }

        if let Some(cache) = &self.cache {
            if let Err(error) = cache.store(entries) {
                tracing::warn!(%error, "unable to write skills index, continuing without it");
            }
        }

        let catalog = Arc::new(Catalog {
            ordered: ordered.clone(),
            by_name,
        });
        *self.catalog.write().expect("catalog lock poisoned") = catalog;

        Ok(ordered)
    }

    fn snapshot(&self) -> Arc<Catalog> {
        self.catalog.read().expect("catalog lock poisoned").clone()
    }

    /// The catalog from the most recent `refresh`.
    pub fn list(&self) -> Vec<SkillDescriptor> {
        self.snapshot().ordered.clone()
    }

    /// A new handle bound to the named skill.
    pub fn open(&self, name: &str) -> Result<SkillHandle> {
        let catalog = self.snapshot();
        let Some(&index) = catalog.by_name.get(name) else {
            return Err(SkilldockError::SkillNotFound {
                name: name.to_string(),
            });
        };
        let descriptor = catalog.ordered[index].clone();
        self.audit.append(
            &AuditEvent::new(AuditKind::Open, name).with_path(descriptor.path.to_string_lossy()),
        );
        SkillHandle::bind(
            descriptor,
            self.resource_policy.clone(),
            self.execution_policy.clone(),
            self.audit.clone(),
        )
    }

    /// Render the current catalog for inclusion in an agent prompt.
    pub fn to_prompt(&self, format: PromptFormat, include_location: bool) -> String {
        render_catalog(&self.snapshot().ordered, format, include_location)
    }
}
