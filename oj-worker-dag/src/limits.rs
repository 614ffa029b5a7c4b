use serde::{Deserialize, Serialize};

/// Resource limits applied to a single sandboxed run.
///
/// Every field is optional: `None` means "no limit enforced by the sandbox for this resource".
/// Per spec, at least one of `cpu_time_ms`/`memory_bytes` must be positive for BATCH/INTERACTIVE
/// testcases; that invariant is checked by the judging-plan validator, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Wall/CPU time limit, in milliseconds.
    pub time_limit_ms: Option<u64>,
    /// Memory limit, in bytes.
    pub memory_limit_bytes: Option<u64>,
    /// Stack size limit, in bytes. Defaults to `memory_limit_bytes` when unset (§4.A).
    pub stack_limit_bytes: Option<u64>,
    /// Maximum number of processes/threads the sandboxed program may create.
    pub max_processes: Option<u32>,
}

impl ExecutionLimits {
    /// Build limits with just a time and memory bound, the common case.
    pub fn new(time_limit_ms: u64, memory_limit_bytes: u64) -> Self {
        ExecutionLimits {
            time_limit_ms: Some(time_limit_ms),
            memory_limit_bytes: Some(memory_limit_bytes),
            stack_limit_bytes: None,
            max_processes: Some(1),
        }
    }

    /// Resolve the effective stack limit, defaulting to the memory limit as spec §4.A requires.
    pub fn effective_stack_limit(&self) -> Option<u64> {
        self.stack_limit_bytes.or(self.memory_limit_bytes)
    }

    /// Combine effective per-testcase limits following `testcase ∨ subtask ∨ plan` (spec §3).
    pub fn coalesce(testcase: Option<Self>, subtask: Option<Self>, plan: Self) -> Self {
        let time_limit_ms = testcase
            .and_then(|l| l.time_limit_ms)
            .or_else(|| subtask.and_then(|l| l.time_limit_ms))
            .or(plan.time_limit_ms);
        let memory_limit_bytes = testcase
            .and_then(|l| l.memory_limit_bytes)
            .or_else(|| subtask.and_then(|l| l.memory_limit_bytes))
            .or(plan.memory_limit_bytes);
        let stack_limit_bytes = testcase
            .and_then(|l| l.stack_limit_bytes)
            .or_else(|| subtask.and_then(|l| l.stack_limit_bytes))
            .or(plan.stack_limit_bytes);
        let max_processes = testcase
            .and_then(|l| l.max_processes)
            .or_else(|| subtask.and_then(|l| l.max_processes))
            .or(plan.max_processes);
        ExecutionLimits {
            time_limit_ms,
            memory_limit_bytes,
            stack_limit_bytes,
            max_processes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_prefers_testcase_then_subtask_then_plan() {
        let plan = ExecutionLimits::new(1000, 256 << 20);
        let subtask = Some(ExecutionLimits {
            time_limit_ms: Some(2000),
            ..Default::default()
        });
        let testcase = Some(ExecutionLimits {
            memory_limit_bytes: Some(64 << 20),
            ..Default::default()
        });
        let effective = ExecutionLimits::coalesce(testcase, subtask, plan);
        assert_eq!(effective.time_limit_ms, Some(2000));
        assert_eq!(effective.memory_limit_bytes, Some(64 << 20));
    }

    #[test]
    fn effective_stack_defaults_to_memory() {
        let limits = ExecutionLimits::new(1000, 256 << 20);
        assert_eq!(limits.effective_stack_limit(), Some(256 << 20));
    }
}
