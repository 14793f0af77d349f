//! Immutable, process-wide security policy: syscall allow-list for the
//! process executor, blocked-module set for the Python import guard, and
//! the capability allow-list for the in-process JavaScript context.
//!
//! The policy is built once and handed to each executor's constructor as an
//! `Arc`; nothing reachable from user code can modify it.

/// Host functions that may be exposed into the isolated JavaScript context.
/// Anything not listed in the policy simply does not exist inside the
/// context — there is no filesystem, process, network, or module-loading
/// primitive to disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCapability {
    /// Bounded sleep, capped below the execution timeout.
    Delay,
    /// Deterministic token counting (`ceil(length / 4)`).
    CountToken,
    /// Base64 encoding with an optional prefix.
    StrToBase64,
    /// HMAC signing of `"{timestamp}\n{secret}"`.
    CreateHmac,
}

#[derive(Debug)]
pub struct SecurityPolicy {
    syscalls: Vec<i64>,
    blocked_modules: Vec<&'static str>,
    capabilities: Vec<HostCapability>,
}

/// Python modules the import guard rejects, matched against the top-level
/// segment of both `import x.y` and `from x import y`. `builtins`, `io`,
/// and `codecs` are listed because each re-exposes an unrestricted `open`;
/// `posix` is the raw syscall module behind `os`.
const BLOCKED_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "multiprocessing",
    "threading",
    "socket",
    "socketserver",
    "http",
    "urllib",
    "requests",
    "ftplib",
    "smtplib",
    "telnetlib",
    "webbrowser",
    "ctypes",
    "builtins",
    "io",
    "_io",
    "codecs",
    "posix",
    "shutil",
    "pathlib",
    "tempfile",
    "glob",
    "pickle",
    "shelve",
    "marshal",
    "importlib",
    "signal",
    "resource",
    "pty",
    "fcntl",
    "termios",
];

/// Syscalls the sandboxed interpreter may perform: computation, memory
/// management, time queries, and enough file access for stdlib imports.
/// Process-spawning (`fork`/`clone`/`execve`), sockets, `ptrace`, and
/// `kill` are deliberately absent — anything not listed kills the process.
///
/// x86-64 numbers; the generated BPF filter checks for that ABI and kills
/// anything else, so the gate matches the filter's architecture.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn allowed_syscalls() -> Vec<i64> {
    vec![
        // I/O on already-open descriptors
        libc::SYS_read,
        libc::SYS_write,
        libc::SYS_close,
        libc::SYS_fstat,
        libc::SYS_lseek,
        libc::SYS_pread64,
        libc::SYS_readv,
        libc::SYS_writev,
        libc::SYS_ioctl,
        libc::SYS_fcntl,
        libc::SYS_dup,
        // Memory management
        libc::SYS_mmap,
        libc::SYS_mprotect,
        libc::SYS_munmap,
        libc::SYS_mremap,
        libc::SYS_madvise,
        libc::SYS_brk,
        // Read-only filesystem access (stdlib imports)
        libc::SYS_openat,
        libc::SYS_newfstatat,
        libc::SYS_stat,
        libc::SYS_lstat,
        libc::SYS_statx,
        libc::SYS_getdents64,
        libc::SYS_readlink,
        libc::SYS_getcwd,
        libc::SYS_access,
        libc::SYS_faccessat,
        // Signals (interpreter internals, SystemExit)
        libc::SYS_rt_sigaction,
        libc::SYS_rt_sigprocmask,
        libc::SYS_rt_sigreturn,
        libc::SYS_sigaltstack,
        // Time
        libc::SYS_clock_gettime,
        libc::SYS_clock_getres,
        libc::SYS_gettimeofday,
        libc::SYS_time,
        libc::SYS_nanosleep,
        libc::SYS_clock_nanosleep,
        // Process/thread introspection and shutdown
        libc::SYS_getpid,
        libc::SYS_gettid,
        libc::SYS_getuid,
        libc::SYS_geteuid,
        libc::SYS_getgid,
        libc::SYS_getegid,
        libc::SYS_uname,
        libc::SYS_sysinfo,
        libc::SYS_exit,
        libc::SYS_exit_group,
        // Runtime support
        libc::SYS_futex,
        libc::SYS_sched_yield,
        libc::SYS_getrandom,
        libc::SYS_prlimit64,
        libc::SYS_rseq,
        libc::SYS_membarrier,
    ]
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn allowed_syscalls() -> Vec<i64> {
    Vec::new()
}

impl SecurityPolicy {
    /// The built-in policy. Loaded once at startup; there is no mutation API.
    pub fn builtin() -> Self {
        Self {
            syscalls: allowed_syscalls(),
            blocked_modules: BLOCKED_MODULES.to_vec(),
            capabilities: vec![
                HostCapability::Delay,
                HostCapability::CountToken,
                HostCapability::StrToBase64,
                HostCapability::CreateHmac,
            ],
        }
    }

    pub fn syscall_allowlist(&self) -> &[i64] {
        &self.syscalls
    }

    pub fn blocked_modules(&self) -> &[&'static str] {
        &self.blocked_modules
    }

    /// Whether an import of `name` (possibly dotted) is denied.
    pub fn is_module_blocked(&self, name: &str) -> bool {
        let top = name.split('.').next().unwrap_or(name);
        self.blocked_modules.contains(&top)
    }

    pub fn allows_capability(&self, capability: HostCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}
