//! Error types for Skilldock.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for all Skilldock operations.
#[derive(Error, Debug)]
pub enum SkilldockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Skill '{name}' not found in repository")]
    SkillNotFound { name: String },

    #[error("Failed to parse skill at {path}: {message}")]
    SkillParse { path: PathBuf, message: String },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("Resource too large: {0}")]
    ResourceTooLarge(String),

    #[error("Script execution is disabled by policy")]
    ScriptExecutionDisabled,

    #[error("Script exceeded {timeout_s}s timeout")]
    ScriptTimeout { timeout_s: u64 },

    #[error("Script failed with exit code {exit_code}")]
    ScriptFailed { exit_code: i32 },

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Stable error kind tags used by the envelope boundary and CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SkillNotFound,
    SkillParse,
    PolicyViolation,
    PathTraversal,
    ResourceTooLarge,
    ScriptExecutionDisabled,
    ScriptTimeout,
    ScriptFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SkillNotFound => "skill_not_found",
            Self::SkillParse => "skill_parse_error",
            Self::PolicyViolation => "policy_violation",
            Self::PathTraversal => "path_traversal",
            Self::ResourceTooLarge => "resource_too_large",
            Self::ScriptExecutionDisabled => "script_execution_disabled",
            Self::ScriptTimeout => "script_timeout",
            Self::ScriptFailed => "script_failed",
            Self::Internal => "internal_error",
        }
    }
}

impl SkilldockError {
    /// Classify this error into its stable kind tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SkillNotFound { .. } => ErrorKind::SkillNotFound,
            Self::SkillParse { .. } => ErrorKind::SkillParse,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::PathTraversal(_) => ErrorKind::PathTraversal,
            Self::ResourceTooLarge(_) => ErrorKind::ResourceTooLarge,
            Self::ScriptExecutionDisabled => ErrorKind::ScriptExecutionDisabled,
            Self::ScriptTimeout { .. } => ErrorKind::ScriptTimeout,
            Self::ScriptFailed { .. } => ErrorKind::ScriptFailed,
            Self::Io(_) | Self::Serialization(_) | Self::InvalidState(_) | Self::InvalidArgument(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Class name carried in error envelopes (`meta.error_type`).
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::SkillNotFound { .. } => "SkillNotFoundError",
            Self::SkillParse { .. } => "SkillParseError",
            Self::PolicyViolation(_) => "PolicyViolationError",
            Self::PathTraversal(_) => "PathTraversalError",
            Self::ResourceTooLarge(_) => "ResourceTooLargeError",
            Self::ScriptExecutionDisabled => "ScriptExecutionDisabledError",
            Self::ScriptTimeout { .. } => "ScriptTimeoutError",
            Self::ScriptFailed { .. } => "ScriptFailedError",
            Self::InvalidState(_) => "InvalidStateError",
            Self::InvalidArgument(_) => "InvalidArgumentError",
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SkilldockError>;
