//! Runs Python snippets in a dedicated, seccomp-confined OS process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sandbox::{
    ensure_object, validate_code, ExecutionOutput, Executor, Language, Result, SandboxError,
    ScratchWorkspace, SecurityPolicy, Variables,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::script;

/// The single JSON line the isolated process writes to stdout.
#[derive(Debug, Deserialize)]
struct ShimReply {
    success: bool,
    #[serde(default)]
    data: Option<ShimData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShimData {
    code_return: serde_json::Value,
    #[serde(default)]
    log: String,
}

/// Executor that writes a self-contained script into a scratch directory
/// and runs it under `python3 -I`. The script installs the import guard and
/// seccomp filter before touching user code; this side only enforces the
/// wall-clock budget and interprets the exit.
pub struct PyExecutor {
    policy: Arc<SecurityPolicy>,
    python_bin: PathBuf,
}

impl PyExecutor {
    /// `python_bin` overrides interpreter discovery; by default `python3` is
    /// resolved from `PATH` once, at construction.
    pub fn new(policy: Arc<SecurityPolicy>, python_bin: Option<PathBuf>) -> Result<Self> {
        let python_bin = match python_bin {
            Some(path) => path,
            None => which::which("python3").map_err(|e| {
                SandboxError::Io(std::io::Error::other(format!("python3 not found: {e}")))
            })?,
        };
        Ok(Self { policy, python_bin })
    }
}

#[async_trait]
impl Executor for PyExecutor {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn execute(
        &self,
        code: &str,
        variables: &Variables,
        timeout: Duration,
    ) -> Result<ExecutionOutput> {
        validate_code(code)?;

        let workspace = ScratchWorkspace::create()?;
        let script_path = workspace.file_path("snippet.py");
        tokio::fs::write(&script_path, script::build(code, variables, &self.policy)).await?;

        // -I: isolated mode. No PYTHONPATH, no site-packages from the
        // environment, no current-directory imports.
        let mut command = tokio::process::Command::new(&self.python_bin);
        command
            .arg("-I")
            .arg(&script_path)
            .current_dir(workspace.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        let pid = child.id();
        debug!(pid, "spawned isolated interpreter");

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // wait_with_output consumed the child; kill_on_drop has
                // already reaped the direct child, killpg sweeps anything it
                // spawned into the same group.
                kill_process_group(pid);
                warn!(pid, timeout_ms = timeout.as_millis() as u64, "execution timed out");
                return Err(SandboxError::TimeoutOrKilled(format!(
                    "no result within {}ms",
                    timeout.as_millis()
                )));
            }
        };

        parse_output(&output)
    }
}

/// Kill the whole process group via `killpg(SIGKILL)`. Requires the child to
/// have been spawned with `process_group(0)` so its PGID equals its PID.
/// No-op if the PID is gone or cannot be represented as `i32`.
fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid
        && let Ok(pid) = i32::try_from(pid)
    {
        let pgid = nix::unistd::Pid::from_raw(pid);
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = pid;
}

fn parse_output(output: &std::process::Output) -> Result<ExecutionOutput> {
    if !output.status.success() {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = output.status.signal() {
                // A filter violation raises SIGSYS; anything else is the
                // kernel or the timeout path. Either way the process is gone
                // before it could report, so the two are indistinguishable
                // beyond the signal number.
                let detail = if signal == libc::SIGSYS {
                    "denied syscall (SIGSYS)".to_owned()
                } else {
                    format!("terminated by signal {signal}")
                };
                return Err(SandboxError::TimeoutOrKilled(detail));
            }
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        return Err(SandboxError::Runtime(if stderr.is_empty() {
            format!("interpreter exited with {}", output.status)
        } else {
            stderr.to_owned()
        }));
    }

    // The shim writes exactly one JSON line to the real stdout. User prints
    // go to a diverted buffer, but take the last non-empty line anyway in
    // case interpreter startup noise precedes it.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| SandboxError::InvalidResponse("no reply on stdout".to_owned()))?;

    let reply: ShimReply = serde_json::from_str(line)
        .map_err(|e| SandboxError::InvalidResponse(format!("malformed reply: {e}")))?;

    if reply.success {
        let data = reply
            .data
            .ok_or_else(|| SandboxError::InvalidResponse("success reply without data".to_owned()))?;
        let code_return = ensure_object(data.code_return)?;
        Ok(ExecutionOutput { code_return, log: data.log })
    } else {
        let message = reply.message.unwrap_or_else(|| "unknown failure".to_owned());
        if message.starts_with("Importing ") && message.ends_with("is not allowed") {
            Err(SandboxError::PolicyViolation(message))
        } else {
            Err(SandboxError::Runtime(message))
        }
    }
}
