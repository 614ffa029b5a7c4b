//! Interactive problem runner (spec §4.E "Interactive").

use std::os::fd::{AsFd, AsRawFd, IntoRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::pipe;
use oj_worker_dag::{CpuAffinityTarget, Redirect, SandboxParams};
use oj_worker_exec::{Sandbox, SandboxRunner};

use crate::checker::{interactor_env, parse_checker_message, CompiledProgram, InteractorInterface, ParsedMessage};
use crate::error::JudgeError;
use crate::result::{TestcaseResult, TestcaseStatus};

use super::{classify_sandbox_status, RuntimeOutcome, TestcaseWorkspace};

/// Run one INTERACTIVE testcase: the user program and the interactor side by side, connected by
/// two pipes (and, for `interface=shm`, a shared memory segment) (spec §4.E).
#[allow(clippy::too_many_arguments)]
pub async fn run_interactive(
    workspace: &TestcaseWorkspace,
    user_program: &CompiledProgram,
    interactor_program: &CompiledProgram,
    interface: InteractorInterface,
    limits: oj_worker_dag::ExecutionLimits,
    input: Option<&[u8]>,
    sandboxes_dir: PathBuf,
    runner: Arc<dyn SandboxRunner>,
) -> Result<TestcaseResult, JudgeError> {
    let input_path = match input {
        Some(bytes) => Some(
            workspace
                .materialize_input("input.txt", bytes)
                .map_err(JudgeError::System)?,
        ),
        None => None,
    };

    let (user_to_interactor_read, user_to_interactor_write) =
        pipe().context("Failed to create user->interactor pipe").map_err(JudgeError::System)?;
    let (interactor_to_user_read, interactor_to_user_write) =
        pipe().context("Failed to create interactor->user pipe").map_err(JudgeError::System)?;

    let shm_fd = match interface {
        InteractorInterface::Shm { size } => Some(create_shm(size).map_err(JudgeError::System)?),
        InteractorInterface::Stdio => None,
    };

    let inherited = [
        user_to_interactor_read.as_raw_fd(),
        user_to_interactor_write.as_raw_fd(),
        interactor_to_user_read.as_raw_fd(),
        interactor_to_user_write.as_raw_fd(),
    ]
    .into_iter()
    .chain(shm_fd)
    .collect::<Vec<RawFd>>();

    let previous_flags = clear_close_on_exec(&inherited).map_err(JudgeError::System)?;

    let env = interactor_env(interface, shm_fd);

    let mut user_params = SandboxParams::new(
        user_program.affinity.clone(),
        PathBuf::from("/sandbox/working"),
        CpuAffinityTarget::UserProgram,
    );
    user_params.argv = user_program.argv_prefix.clone();
    user_params.limits = limits;
    user_params.mounts = workspace.standard_mounts(user_program);
    user_params.stdin = Redirect::InheritedFd(interactor_to_user_read.as_raw_fd());
    user_params.stdout = Redirect::InheritedFd(user_to_interactor_write.as_raw_fd());
    user_params.stderr = Redirect::File(workspace.working_dir.join("user-stderr.txt"));
    user_params.inherited_fds = inherited.clone();
    user_params.env = env.clone();

    let mut interactor_params = SandboxParams::new(
        interactor_program.affinity.clone(),
        PathBuf::from("/sandbox/working"),
        CpuAffinityTarget::Interactor,
    );
    interactor_params.argv = interactor_program.argv_prefix.clone();
    if let Some(input_path) = &input_path {
        interactor_params.argv.push(input_path.to_string_lossy().into_owned());
    }
    interactor_params.limits = limits;
    interactor_params.mounts = workspace.standard_mounts(interactor_program);
    interactor_params.stdin = Redirect::InheritedFd(user_to_interactor_read.as_raw_fd());
    interactor_params.stdout = Redirect::InheritedFd(interactor_to_user_write.as_raw_fd());
    interactor_params.stderr = Redirect::File(workspace.working_dir.join("interactor-message.txt"));
    interactor_params.inherited_fds = inherited.clone();
    interactor_params.env = env;

    let user_sandbox = Sandbox::new(&sandboxes_dir, &user_params, None).map_err(JudgeError::System)?;
    let interactor_sandbox = Sandbox::new(&sandboxes_dir, &interactor_params, None).map_err(JudgeError::System)?;

    let user_runner = runner.clone();
    let interactor_runner = runner;
    let inherited_for_restore = inherited.clone();

    let (user_result, interactor_result) = tokio::task::spawn_blocking(move || {
        let running_user = user_sandbox.start(user_runner);
        let running_interactor = interactor_sandbox.start(interactor_runner);
        let interactor_result = running_interactor.wait_for_stop();
        restore_close_on_exec(&inherited_for_restore, &previous_flags).ok();
        running_user.stop();
        let user_result = running_user.wait_for_stop();
        (user_result, interactor_result)
    })
    .await
    .context("interactive sandbox task panicked")
    .map_err(JudgeError::System)?;

    let user_result = user_result.map_err(JudgeError::System)?;
    let interactor_result = interactor_result.map_err(JudgeError::System)?;

    if matches!(
        (user_result.status, interactor_result.status),
        (oj_worker_dag::SandboxStatus::TimeLimitExceeded, _) | (_, oj_worker_dag::SandboxStatus::TimeLimitExceeded)
    ) {
        return Ok(TestcaseResult::new(TestcaseStatus::TimeLimitExceeded, 0.0));
    }

    if !interactor_result.status.is_ok() {
        let message = std::fs::read_to_string(workspace.working_dir.join("interactor-message.txt"))
            .unwrap_or_default();
        return Err(JudgeError::judgement_failed(format!(
            "interactor failed with {:?}: {message}",
            interactor_result.status
        )));
    }

    match classify_sandbox_status(user_result.status) {
        RuntimeOutcome::Canceled => return Err(JudgeError::Canceled),
        RuntimeOutcome::Status(status) => return Ok(TestcaseResult::new(status, 0.0)),
        RuntimeOutcome::RunChecker => {}
    }

    let message = std::fs::read_to_string(workspace.working_dir.join("interactor-message.txt"))
        .unwrap_or_default();
    let mut result = match parse_checker_message(&message) {
        ParsedMessage::Score(score) => TestcaseResult::new(crate::result::classify_score(score), score),
        ParsedMessage::JudgementFailed(reason) => return Err(JudgeError::judgement_failed(reason)),
    };
    result.wall_time_ns = Some(user_result.resources.wall_time_ns);
    result.memory_bytes = Some(user_result.resources.peak_memory_bytes);
    result.checker_message = Some(crate::error::Truncated::whole(message));
    Ok(result)
}

fn create_shm(size: u64) -> Result<RawFd, anyhow::Error> {
    use nix::sys::memfd::{memfd_create, MFdFlags};
    use std::ffi::CStr;
    let name = CStr::from_bytes_with_nul(b"oj-worker-interactor-shm\0").unwrap();
    let fd = memfd_create(name, MFdFlags::empty()).context("Failed to create shared memory segment")?;
    nix::unistd::ftruncate(fd.as_fd(), size as i64).context("Failed to size shared memory segment")?;
    // Ownership moves to the caller, which keeps this fd alive (inherited across fork/exec into
    // both sandboxes) for the rest of the testcase run.
    Ok(fd.into_raw_fd())
}

/// Clear `FD_CLOEXEC` on every fd so it survives the fork/exec into the sandbox, returning the
/// previous flags to restore afterward (spec §4.E "Clear close-on-exec ... and restore").
fn clear_close_on_exec(fds: &[RawFd]) -> Result<Vec<FdFlag>, anyhow::Error> {
    fds.iter()
        .map(|&fd| {
            let current =
                FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD).context("fcntl(F_GETFD)")?);
            fcntl(fd, FcntlArg::F_SETFD(current & !FdFlag::FD_CLOEXEC)).context("fcntl(F_SETFD)")?;
            Ok(current)
        })
        .collect()
}

fn restore_close_on_exec(fds: &[RawFd], previous: &[FdFlag]) -> Result<(), anyhow::Error> {
    for (&fd, &flags) in fds.iter().zip(previous) {
        fcntl(fd, FcntlArg::F_SETFD(flags)).context("fcntl(F_SETFD) restore")?;
    }
    Ok(())
}
