use serde::{Deserialize, Serialize};

/// Outcome of a sandboxed run, as classified by the invoker (spec §4.A).
///
/// `OutputLimitExceeded` is reported here only when the underlying isolation primitive itself
/// enforces a filesystem quota; the batch/submit-answer runners additionally perform their own
/// output-size check after the run (spec §4.E), since most primitives have no notion of "total
/// bytes written" during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxStatus {
    /// The process ran to completion inside its limits.
    Ok,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    OutputLimitExceeded,
    RuntimeError,
    /// The run was aborted because its task was canceled.
    Cancelled,
    /// The sandbox primitive failed in a way that does not map to any of the above.
    Unknown,
}

impl SandboxStatus {
    /// Whether this status represents the program terminating normally inside its limits
    /// (exit code is reported separately and may still be non-zero).
    pub fn is_ok(&self) -> bool {
        matches!(self, SandboxStatus::Ok)
    }
}

/// Resources consumed by a sandboxed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResourcesUsage {
    /// Wall-clock time, in nanoseconds.
    pub wall_time_ns: u64,
    /// User CPU time, in nanoseconds.
    pub cpu_time_ns: u64,
    /// Peak resident memory, in bytes.
    pub peak_memory_bytes: u64,
}

/// The result of a single sandboxed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    pub status: SandboxStatus,
    /// Process exit code, meaningful only when `status == Ok`.
    pub exit_code: i32,
    pub resources: ExecutionResourcesUsage,
}
