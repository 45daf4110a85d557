//! The sandbox capability interface.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::model::ExecutionResult;

/// Everything a sandbox backend needs to run one child process.
///
/// The environment map is complete: backends must not inherit anything from
/// the parent process beyond what is listed here.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
    /// Whether policy grants the child network access. A backend that cannot
    /// enforce denial must say so in `ExecutionResult.meta` rather than
    /// silently claim isolation.
    pub network_access: bool,
}

/// Capability interface for script execution backends.
pub trait Sandbox: Send + Sync {
    /// Backend tag recorded in `ExecutionResult.meta.sandbox`.
    fn backend(&self) -> &'static str;

    /// Run the child to completion or deadline, capturing both streams.
    ///
    /// Deadline expiry is not an error: it yields an `ExecutionResult` with
    /// `exit_code == -1` and `meta.timeout == true`.
    fn spawn(&self, spec: &SpawnSpec) -> Result<ExecutionResult>;
}
