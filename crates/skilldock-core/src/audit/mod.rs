//! Append-only audit trail for skill operations.
//!
//! Every runtime operation (scan, list, open, activate, read, execute, and
//! every rejection) produces an [`AuditEvent`]. Events flow to an
//! [`AuditSink`], which owns durability; the runtime only guarantees that
//! events are appended in the order their operations complete.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// The closed set of audited operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Scan,
    List,
    Open,
    Activate,
    Read,
    Execute,
    PolicyViolation,
    Error,
}

impl AuditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::List => "list",
            Self::Open => "open",
            Self::Activate => "activate",
            Self::Read => "read",
            Self::Execute => "execute",
            Self::PolicyViolation => "policy_violation",
            Self::Error => "error",
        }
    }
}

/// One appended record of a skill operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub kind: AuditKind,
    pub skill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub detail: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, skill: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            kind,
            skill: skill.into(),
            path: None,
            bytes: None,
            sha256: None,
            detail: Map::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}

/// Capability interface for audit event consumers.
///
/// The append path must be thread-safe; ordering across sinks is undefined.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent);
}

/// Sink that drops every event. Used when no audit trail is configured.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn append(&self, _event: &AuditEvent) {}
}

/// Appends events as JSON lines to a log file.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, event: &AuditEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            if let Err(error) = writeln!(file, "{line}") {
                tracing::warn!(path = %self.path.display(), %error, "failed to append audit event");
            }
        }
    }
}

/// In-memory sink for tests and introspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events of one kind, in append order.
    pub fn events_of_kind(&self, kind: AuditKind) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|e| e.kind == kind).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
