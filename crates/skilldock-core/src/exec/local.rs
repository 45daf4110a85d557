//! Local subprocess sandbox.
//!
//! Runs scripts as plain child processes of the current user. This backend
//! provides timeout enforcement, stream capture with bounded buffers, and a
//! scrubbed environment; it does not provide filesystem, network, or
//! resource isolation and reports that honestly in `meta`.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::error::Result;
use crate::exec::sandbox::{Sandbox, SpawnSpec};
use crate::model::ExecutionResult;

const STREAM_CAP_BYTES: usize = 1024 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(25);
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Marker set in the child environment when policy denies network access;
/// this backend cannot actually block the network.
pub const NETWORK_DISABLED_ENV_VAR: &str = "SKILLDOCK_NETWORK_DISABLED";

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProcessSandbox;

impl LocalProcessSandbox {
    pub fn new() -> Self {
        Self
    }
}

/// Drain a stream into a capped buffer on a dedicated thread. Bytes past the
/// cap are read and discarded so the child never blocks on a full pipe.
fn capture_stream<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<(Vec<u8>, bool)> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let mut truncated = false;
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = STREAM_CAP_BYTES.saturating_sub(buf.len());
                    if room >= n {
                        buf.extend_from_slice(&chunk[..n]);
                    } else {
                        buf.extend_from_slice(&chunk[..room]);
                        truncated = true;
                    }
                }
            }
        }
        (buf, truncated)
    })
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let pid = child.id() as libc::pid_t;
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

impl Sandbox for LocalProcessSandbox {
    fn backend(&self) -> &'static str {
        "local_process"
    }

    fn spawn(&self, spec: &SpawnSpec) -> Result<ExecutionResult> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .env_clear()
            .envs(&spec.env)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if !spec.network_access {
            command.env(NETWORK_DISABLED_ENV_VAR, "1");
        }

        tracing::debug!(
            program = %spec.program.display(),
            cwd = %spec.cwd.display(),
            timeout_s = spec.timeout.as_secs(),
            "spawning script"
        );

        let start = Instant::now();
        let mut child = command.spawn()?;

        if let Some(input) = spec.stdin.clone() {
            if let Some(mut stdin) = child.stdin.take() {
                // Written then closed on a helper thread so a child that never
                // reads stdin cannot deadlock the runner.
                thread::spawn(move || {
                    let _ = stdin.write_all(&input);
                });
            }
        }

        let stdout_thread = child.stdout.take().map(capture_stream);
        let stderr_thread = child.stderr.take().map(capture_stream);

        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if start.elapsed() >= spec.timeout {
                timed_out = true;
                tracing::warn!(
                    program = %spec.program.display(),
                    "deadline expired, terminating child"
                );
                terminate(&mut child);
                let grace_deadline = Instant::now() + KILL_GRACE;
                let status = loop {
                    if let Some(status) = child.try_wait()? {
                        break Some(status);
                    }
                    if Instant::now() >= grace_deadline {
                        let _ = child.kill();
                        break child.wait().ok();
                    }
                    thread::sleep(POLL_INTERVAL);
                };
                break status;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        let (stdout_buf, stdout_truncated) = stdout_thread
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        let (stderr_buf, stderr_truncated) = stderr_thread
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();

        let mut meta = Map::new();
        meta.insert("sandbox".to_string(), Value::String(self.backend().to_string()));
        if !spec.network_access {
            meta.insert("network_enforced".to_string(), Value::Bool(false));
        }
        if stdout_truncated {
            meta.insert("stdout_truncated".to_string(), Value::Bool(true));
        }
        if stderr_truncated {
            meta.insert("stderr_truncated".to_string(), Value::Bool(true));
        }

        let exit_code = if timed_out {
            meta.insert("timeout".to_string(), Value::Bool(true));
            -1
        } else {
            status.map(exit_code_of).unwrap_or(-1)
        };

        Ok(ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            duration_ms,
            meta,
        })
    }
}
