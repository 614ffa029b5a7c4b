//! Problem runners (spec §4.E, component E): how to judge one testcase, per problem type.

mod batch;
mod interactive;
mod submit_answer;

pub use batch::run_batch;
pub use interactive::run_interactive;
pub use submit_answer::run_submit_answer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use oj_worker_dag::{BindMount, ExecutionLimits};

use crate::checker::CompiledProgram;

/// Paths materialized inside a testcase's slot before any sandbox runs, per spec §4.E's common
/// prelude ("allocate outside paths `working/` and `temp/`").
pub struct TestcaseWorkspace {
    pub working_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl TestcaseWorkspace {
    /// Create `working/` and `temp/` inside the task's leased slot directory.
    pub fn create(slot_dir: &Path) -> Result<TestcaseWorkspace, Error> {
        let working_dir = slot_dir.join("working");
        let temp_dir = slot_dir.join("temp");
        std::fs::create_dir_all(&working_dir)
            .with_context(|| format!("Failed to create {}", working_dir.display()))?;
        std::fs::create_dir_all(&temp_dir)
            .with_context(|| format!("Failed to create {}", temp_dir.display()))?;
        Ok(TestcaseWorkspace { working_dir, temp_dir })
    }

    /// Write the input file's bytes into the working directory under `name`, returning its path.
    pub fn materialize_input(&self, name: &str, content: &[u8]) -> Result<PathBuf, Error> {
        let path = self.working_dir.join(name);
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// The standard bind-mount map for running a compiled program: its binary directory read-only
    /// at `/sandbox/binary`, the working directory read-write at `/sandbox/working` (spec §4.E).
    pub fn standard_mounts(&self, program: &CompiledProgram) -> Vec<BindMount> {
        vec![
            BindMount {
                outside: program.binary_dir.clone(),
                inside: PathBuf::from("/sandbox/binary"),
                read_only: true,
            },
            BindMount {
                outside: self.working_dir.clone(),
                inside: PathBuf::from("/sandbox/working"),
                read_only: false,
            },
        ]
    }
}

/// Compare the working directory's total size (minus the input file's own size) against the
/// configured output-size limit (spec §4.E "size of working directory minus input size compared
/// against output-size limit").
pub fn exceeds_output_size_limit(working_dir: &Path, input_size: u64, limit_bytes: u64) -> Result<bool, Error> {
    let mut total = 0u64;
    for entry in walk_files(working_dir)? {
        total += entry.metadata()?.len();
    }
    Ok(total.saturating_sub(input_size) > limit_bytes)
}

fn walk_files(dir: &Path) -> Result<Vec<std::fs::DirEntry>, Error> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            out.push(entry);
        }
    }
    Ok(out)
}

/// What to do after a sandbox run finishes, before the checker gets involved (spec §4.E/§8).
pub enum RuntimeOutcome {
    /// The program ran within its limits; proceed to the checker.
    RunChecker,
    /// A terminal runtime-category status; the checker never runs.
    Status(crate::result::TestcaseStatus),
    /// The task was canceled mid-run (spec §7); propagate without further progress reporting.
    Canceled,
}

/// Classify a sandbox result's status before deciding whether to invoke the checker.
pub fn classify_sandbox_status(status: oj_worker_dag::SandboxStatus) -> RuntimeOutcome {
    use crate::result::TestcaseStatus;
    use oj_worker_dag::SandboxStatus::*;
    match status {
        Ok => RuntimeOutcome::RunChecker,
        TimeLimitExceeded => RuntimeOutcome::Status(TestcaseStatus::TimeLimitExceeded),
        MemoryLimitExceeded => RuntimeOutcome::Status(TestcaseStatus::MemoryLimitExceeded),
        OutputLimitExceeded => RuntimeOutcome::Status(TestcaseStatus::OutputLimitExceeded),
        RuntimeError => RuntimeOutcome::Status(TestcaseStatus::RuntimeError),
        Cancelled => RuntimeOutcome::Canceled,
        Unknown => RuntimeOutcome::Status(TestcaseStatus::RuntimeError),
    }
}

/// Shared effective limits for a testcase run, passed down from the scoring engine.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveLimits(pub ExecutionLimits);
