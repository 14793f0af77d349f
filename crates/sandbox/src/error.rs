#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Rejected before anything was spawned: empty code, non-object
    /// variables, invalid variable key.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Blocked import or other explicit policy denial, surfaced at
    /// detection time.
    #[error("security policy violation: {0}")]
    PolicyViolation(String),

    /// Snippet-level exception unrelated to policy; carries the
    /// interpreter's error text.
    #[error("execution failed: {0}")]
    Runtime(String),

    /// Non-serializable/non-object return value, or no parsable JSON line
    /// on the process executor's stdout.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Wall-clock budget exceeded, or the process was killed by a signal.
    /// On the process-isolated path a seccomp kill and a timeout kill are
    /// not always distinguishable; the message names the signal when the
    /// wait status reveals it.
    #[error("timeout or killed by policy: {0}")]
    TimeoutOrKilled(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
