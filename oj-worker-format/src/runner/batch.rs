//! Batch problem runner (spec §4.E "Batch").

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use oj_worker_dag::{CpuAffinityTarget, Redirect, SandboxParams};
use oj_worker_exec::{Sandbox, SandboxRunner};

use crate::checker::{run_checker, CheckerDescriptor, CheckerPaths, CompiledProgram};
use crate::error::JudgeError;
use crate::plan::FileIoNames;
use crate::result::TestcaseResult;

use super::{classify_sandbox_status, RuntimeOutcome, TestcaseWorkspace};

/// Run one BATCH testcase: one sandboxed invocation of the compiled user program, then the
/// checker (spec §4.E).
///
/// `input` is the testcase's input file content, if any; `answer` is the expected output file's
/// path, already materialized by the caller into the slot (so it can live outside the sandbox's
/// working directory and never be writable by the user program).
#[allow(clippy::too_many_arguments)]
pub async fn run_batch(
    workspace: &TestcaseWorkspace,
    user_program: &CompiledProgram,
    limits: oj_worker_dag::ExecutionLimits,
    input: Option<&[u8]>,
    answer: Option<&std::path::Path>,
    file_io: Option<&FileIoNames>,
    checker: &CheckerDescriptor,
    checker_program: Option<&CompiledProgram>,
    output_size_limit_bytes: u64,
    sandboxes_dir: PathBuf,
    runner: Arc<dyn SandboxRunner>,
) -> Result<TestcaseResult, JudgeError> {
    let input_size = input.map(|b| b.len() as u64).unwrap_or(0);
    let input_path = match input {
        Some(bytes) => Some(
            workspace
                .materialize_input("input.txt", bytes)
                .map_err(JudgeError::System)?,
        ),
        None => None,
    };

    let mut params = SandboxParams::new(
        user_program.affinity.clone(),
        PathBuf::from("/sandbox/working"),
        CpuAffinityTarget::UserProgram,
    );
    params.argv = user_program.argv_prefix.clone();
    params.limits = limits;
    params.mounts = workspace.standard_mounts(user_program);

    match file_io {
        Some(names) => {
            if let Some(input_path) = &input_path {
                let dest = workspace.working_dir.join(&names.input);
                std::fs::copy(input_path, &dest)
                    .with_context(|| format!("Failed to stage fileIo input at {}", dest.display()))
                    .map_err(JudgeError::System)?;
            }
        }
        None => {
            params.stdin = match &input_path {
                Some(path) => Redirect::File(path.clone()),
                None => Redirect::Null,
            };
            params.stdout = Redirect::File(workspace.working_dir.join("stdout.txt"));
        }
    }
    params.stderr = Redirect::File(workspace.working_dir.join("stderr.txt"));

    let sandbox = Sandbox::new(&sandboxes_dir, &params, None).map_err(JudgeError::System)?;
    let checker_runner = runner.clone();
    let result = tokio::task::spawn_blocking(move || sandbox.run(runner.as_ref()))
        .await
        .context("batch sandbox task panicked")
        .map_err(JudgeError::System)?
        .map_err(JudgeError::System)?;

    if super::exceeds_output_size_limit(&workspace.working_dir, input_size, output_size_limit_bytes)
        .map_err(JudgeError::System)?
    {
        return Ok(TestcaseResult::new(
            crate::result::TestcaseStatus::OutputLimitExceeded,
            0.0,
        ));
    }

    match classify_sandbox_status(result.status) {
        RuntimeOutcome::Canceled => return Err(JudgeError::Canceled),
        RuntimeOutcome::Status(status) => return Ok(TestcaseResult::new(status, 0.0)),
        RuntimeOutcome::RunChecker => {}
    }

    let user_output_path = match file_io {
        Some(names) => workspace.working_dir.join(&names.output),
        None => workspace.working_dir.join("stdout.txt"),
    };
    if !user_output_path.exists() {
        return Ok(TestcaseResult::new(crate::result::TestcaseStatus::FileError, 0.0));
    }

    let checker = checker.clone();
    let checker_program = checker_program.cloned();
    let answer = answer.map(|p| p.to_owned());
    let user_source = user_program.source_file.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let paths = CheckerPaths {
            input: input_path.as_deref(),
            user_output: &user_output_path,
            answer: answer.as_deref(),
            user_source: user_source.as_deref(),
        };
        run_checker(
            &checker,
            checker_program.as_ref(),
            &paths,
            &sandboxes_dir,
            checker_runner.as_ref(),
        )
    })
    .await
    .context("checker task panicked")
    .map_err(JudgeError::System)??;

    let mut testcase_result = TestcaseResult::new(outcome.status, outcome.score);
    testcase_result.wall_time_ns = Some(result.resources.wall_time_ns);
    testcase_result.memory_bytes = Some(result.resources.peak_memory_bytes);
    testcase_result.checker_message = Some(crate::error::Truncated::whole(outcome.message));
    Ok(testcase_result)
}
