//! Self-exec sandbox runner (spec §4.A), grounded on the teacher's root `src/sandbox.rs`.
//!
//! Running the sandbox in the worker's own process would mean a `tabox`-level crash takes the
//! whole worker down with it; instead the worker re-execs itself with `--sandbox`, feeding the
//! sandbox configuration as JSON over stdin and reading the result back as JSON over stdout.

use std::io::{stdin, stdout};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Error};
use oj_worker_exec::{RawSandboxResult, SandboxRunner};
use tabox::configuration::SandboxConfiguration;
use tabox::result::SandboxExecutionResult;
use tabox::{Sandbox as TaboxSandbox, SandboxImplementation};

/// Entry point for `oj-worker --sandbox`: read a `SandboxConfiguration` from stdin, run it with
/// `tabox` directly (this *is* the re-exec'd child), and print a `RawSandboxResult` to stdout.
pub fn main_sandbox() {
    let result = match run_sandbox() {
        Ok(res) => RawSandboxResult::Success(res),
        Err(e) => RawSandboxResult::Error(e.to_string()),
    };
    serde_json::to_writer(stdout(), &result).expect("failed to print sandbox result");
}

fn run_sandbox() -> Result<SandboxExecutionResult, Error> {
    let config: SandboxConfiguration =
        serde_json::from_reader(stdin()).context("failed to parse sandbox configuration from stdin")?;
    let sandbox =
        SandboxImplementation::run(config).map_err(|e| anyhow::anyhow!("failed to create sandbox: {e:?}"))?;
    sandbox.wait().map_err(|e| anyhow::anyhow!("failed to wait on sandbox: {e:?}"))
}

/// Implements [`SandboxRunner`] by re-executing the current binary with `--sandbox`.
pub struct SelfExecSandboxRunner;

impl SandboxRunner for SelfExecSandboxRunner {
    fn run(&self, config: SandboxConfiguration, pid: Arc<AtomicU32>) -> RawSandboxResult {
        match self.run_internal(config, pid) {
            Ok(res) => res,
            Err(e) => RawSandboxResult::Error(e.to_string()),
        }
    }
}

impl SelfExecSandboxRunner {
    fn run_internal(&self, config: SandboxConfiguration, pid: Arc<AtomicU32>) -> Result<RawSandboxResult, Error> {
        let exe = std::env::current_exe().context("failed to locate the current executable")?;
        let mut child = Command::new(exe)
            .arg("--sandbox")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn self-exec sandbox child")?;
        pid.store(child.id(), Ordering::SeqCst);
        {
            let stdin = child.stdin.as_mut().expect("piped stdin");
            serde_json::to_writer(stdin, &config).context("failed to send sandbox configuration")?;
        }
        let output = child.wait_with_output().context("failed to wait on sandbox child")?;
        if !output.status.success() {
            bail!(
                "sandbox child exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        serde_json::from_slice(&output.stdout).context("failed to parse sandbox result")
    }
}
