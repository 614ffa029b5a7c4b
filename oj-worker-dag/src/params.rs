use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::limits::ExecutionLimits;

/// Which CPU-affinity pool (spec §4.A, §6 `cpuAffinity.*`) a run should be pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuAffinityTarget {
    /// Compiling a user program or a custom checker/interactor.
    Compiler,
    /// Running the submitted program.
    UserProgram,
    /// Running an interactor.
    Interactor,
    /// Running a checker.
    Checker,
}

/// Where a file descriptor of the sandboxed process is redirected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Redirect {
    /// Redirect to/from a file in the sandbox's working directory.
    File(PathBuf),
    /// Inherit an already-open file descriptor from the invoker (used for pipes/fifos wired up
    /// by the interactive runner).
    InheritedFd(i32),
    /// Discard (stdin: `/dev/null`, stdout/stderr: not captured).
    Null,
}

/// A bind-mount from a path on the host into the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMount {
    /// Path on the host.
    pub outside: PathBuf,
    /// Path inside the sandbox's rootfs; the invoker ensures this exists before the run starts.
    pub inside: PathBuf,
    /// If `false`, the invoker grants the sandboxed user write access to `outside` before the
    /// run (spec §4.A).
    pub read_only: bool,
}

/// What to run inside the sandbox: either a binary already on disk, or an inline script that
/// the invoker writes into a temp dir mounted as `/tmp` and executes via a shell (spec §4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Affinity {
    /// Run the named executable, found relative to the sandbox working directory.
    Executable(PathBuf),
    /// Write this script into the sandbox's `/tmp` and run it with `/bin/sh`.
    InlineScript(String),
}

/// All the parameters of a single sandboxed run (spec §4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxParams {
    /// What to execute.
    pub program: Affinity,
    /// Command-line arguments (not including argv[0]).
    pub argv: Vec<String>,
    /// stdin/stdout/stderr redirections.
    pub stdin: Redirect,
    pub stdout: Redirect,
    pub stderr: Redirect,
    /// Outside→inside bind mounts.
    pub mounts: Vec<BindMount>,
    /// Working directory inside the sandbox.
    pub working_dir: PathBuf,
    /// Resource limits.
    pub limits: ExecutionLimits,
    /// Environment variables visible to the sandboxed process.
    pub env: HashMap<String, String>,
    /// Which CPU-affinity pool to pin this run to.
    pub affinity: CpuAffinityTarget,
    /// File descriptors whose close-on-exec flag must be cleared across the fork and restored
    /// immediately after (used to hand pipes/shm fds to an interactive process, spec §4.A/§4.E).
    pub inherited_fds: Vec<i32>,
}

impl SandboxParams {
    /// Start building params for running `program` with the given working directory.
    pub fn new(program: Affinity, working_dir: PathBuf, affinity: CpuAffinityTarget) -> Self {
        SandboxParams {
            program,
            argv: Vec::new(),
            stdin: Redirect::Null,
            stdout: Redirect::Null,
            stderr: Redirect::Null,
            mounts: Vec::new(),
            working_dir,
            limits: ExecutionLimits::default(),
            env: HashMap::new(),
            affinity,
            inherited_fds: Vec::new(),
        }
    }
}
