//! Checker subsystem (spec §4.D, component D): built-in and custom-checker dispatch.

mod builtin;
mod message;

pub use message::{parse_checker_message, ParsedMessage};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use oj_worker_dag::{Affinity, BindMount, CpuAffinityTarget, Redirect, SandboxParams};
use oj_worker_exec::Sandbox;

use crate::error::JudgeError;
use crate::result::{classify_score, TestcaseStatus};

/// Which built-in comparison mode to use.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum BuiltInChecker {
    Integers,
    Floats { precision: u32 },
    Lines { case_sensitive: bool },
    Binary,
}

/// The six custom-checker interface flavors (spec §4.D table), each defining how the checker's
/// argv/stdio/output-file maps to (input, user-output, answer, user-code, working-dir).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CustomCheckerInterface {
    Testlib,
    Legacy,
    Lemon,
    HustOj,
    QdOj,
    DomJudge,
}

/// A compiled external program ready to run: how to invoke it, inherited from
/// [`oj_worker_lang::RunSpec`] (a checker/interactor is compiled and run exactly like a user
/// program).
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub affinity: Affinity,
    pub argv_prefix: Vec<String>,
    /// Directory containing the compiled binary (and any supporting files), mounted read-only at
    /// the sandbox's binary path.
    pub binary_dir: PathBuf,
    /// Path to the staged source file inside `binary_dir`, if this program was built from one
    /// (absent for a checker/interactor compiled without source-retention). Needed by the
    /// `Legacy` custom-checker interface, which expects the user's source mounted as `code`.
    pub source_file: Option<PathBuf>,
}

/// A custom checker: its interface flavor plus the language it must be written in, if the
/// interface mandates one (spec §4.D "Validation hook").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CustomCheckerSpec {
    pub interface: CustomCheckerInterface,
    pub language: String,
    pub source: String,
    pub compile_options: Vec<String>,
}

/// BATCH/SUBMIT_ANSWER checker descriptor (spec §3 "checker descriptor").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum CheckerDescriptor {
    BuiltIn(BuiltInChecker),
    Custom(CustomCheckerSpec),
}

/// INTERACTIVE interface (spec §3 "interactor descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InteractorInterface {
    Stdio,
    /// Shared-memory interface with the configured segment size, in bytes.
    Shm { size: u64 },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InteractorDescriptor {
    pub interface: InteractorInterface,
    pub language: String,
    pub source: String,
    pub compile_options: Vec<String>,
}

impl CheckerDescriptor {
    /// Validate a checker configuration before it's compiled (spec §4.D "Validation hook"):
    /// `testlib` requires a C++ checker.
    pub fn validate(&self) -> Result<(), JudgeError> {
        if let CheckerDescriptor::Custom(custom) = self {
            custom.validate()?;
        }
        Ok(())
    }
}

impl CustomCheckerSpec {
    pub fn validate(&self) -> Result<(), JudgeError> {
        if self.interface == CustomCheckerInterface::Testlib && !self.language.starts_with("C++") {
            return Err(JudgeError::configuration(format!(
                "testlib checkers must be written in C++, got {:?}",
                self.language
            )));
        }
        Ok(())
    }
}

/// Where the files a checker grades live, already materialized in the testcase's working
/// directory by the problem runner.
pub struct CheckerPaths<'a> {
    pub input: Option<&'a Path>,
    pub user_output: &'a Path,
    pub answer: Option<&'a Path>,
    /// The submission's staged source file, required by the `Legacy` interface (mounted as
    /// `code`) and unused by every other interface.
    pub user_source: Option<&'a Path>,
}

/// Outcome of grading one testcase: a score in `[0, 100]` and the message shown to the user.
pub struct CheckerOutcome {
    pub status: TestcaseStatus,
    pub score: f64,
    pub message: String,
}

fn outcome_from_score(score: f64, message: String) -> CheckerOutcome {
    CheckerOutcome {
        status: classify_score(score),
        score,
        message,
    }
}

/// Run the configured checker against `paths`, inside `sandboxes_dir`'s scratch space.
pub fn run_checker(
    descriptor: &CheckerDescriptor,
    checker_program: Option<&CompiledProgram>,
    paths: &CheckerPaths,
    sandboxes_dir: &Path,
    runner: &dyn oj_worker_exec::SandboxRunner,
) -> Result<CheckerOutcome, JudgeError> {
    match descriptor {
        CheckerDescriptor::BuiltIn(builtin) => run_builtin(builtin, paths, sandboxes_dir, runner),
        CheckerDescriptor::Custom(custom) => {
            let program = checker_program
                .context("custom checker has no compiled program attached")
                .map_err(JudgeError::System)?;
            run_custom(custom, program, paths, sandboxes_dir, runner)
        }
    }
}

fn run_builtin(
    checker: &BuiltInChecker,
    paths: &CheckerPaths,
    sandboxes_dir: &Path,
    runner: &dyn oj_worker_exec::SandboxRunner,
) -> Result<CheckerOutcome, JudgeError> {
    let answer = paths
        .answer
        .context("built-in checker requires an answer file")
        .map_err(JudgeError::System)?;
    match checker {
        BuiltInChecker::Integers => {
            let o = builtin::check_integers(answer, paths.user_output).map_err(JudgeError::System)?;
            Ok(outcome_from_score(o.score, o.message))
        }
        BuiltInChecker::Floats { precision } => {
            let o = builtin::check_floats(answer, paths.user_output, *precision)
                .map_err(JudgeError::System)?;
            Ok(outcome_from_score(o.score, o.message))
        }
        BuiltInChecker::Lines { case_sensitive } => {
            let argv = builtin::lines_diff_argv(*case_sensitive);
            let exit_code = run_diff_like(&argv, answer, paths.user_output, sandboxes_dir, runner)?;
            let o = builtin::classify_diff_exit(exit_code).map_err(JudgeError::System)?;
            Ok(outcome_from_score(o.score, o.message))
        }
        BuiltInChecker::Binary => {
            let argv = builtin::binary_cmp_argv();
            let exit_code = run_diff_like(&argv, answer, paths.user_output, sandboxes_dir, runner)?;
            let o = builtin::classify_cmp_exit(exit_code).map_err(JudgeError::System)?;
            Ok(outcome_from_score(o.score, o.message))
        }
    }
}

/// Run `diff`/`cmp` in the checker's CPU-affinity pool exactly like the built-ins' argv expects
/// (`correct`/`test` bind-mounted under those fixed names), returning its exit code.
fn run_diff_like(
    argv: &[String],
    correct: &Path,
    test: &Path,
    sandboxes_dir: &Path,
    runner: &dyn oj_worker_exec::SandboxRunner,
) -> Result<i32, JudgeError> {
    let program_name = if argv.first().map(String::as_str) == Some("--silent") {
        "/usr/bin/cmp"
    } else {
        "/usr/bin/diff"
    };
    let mut params = SandboxParams::new(
        Affinity::Executable(PathBuf::from(program_name)),
        PathBuf::from("/box"),
        CpuAffinityTarget::Checker,
    );
    params.argv = argv.to_vec();
    params.mounts.push(BindMount {
        outside: correct.to_owned(),
        inside: PathBuf::from("/box/correct"),
        read_only: true,
    });
    params.mounts.push(BindMount {
        outside: test.to_owned(),
        inside: PathBuf::from("/box/test"),
        read_only: true,
    });
    let sandbox = Sandbox::new(sandboxes_dir, &params, None).map_err(JudgeError::System)?;
    let result = sandbox.run(runner).map_err(JudgeError::System)?;
    if !result.status.is_ok() {
        return Err(JudgeError::judgement_failed(format!(
            "Checker comparison process failed: {:?}",
            result.status
        )));
    }
    Ok(result.exit_code)
}

fn run_custom(
    custom: &CustomCheckerSpec,
    program: &CompiledProgram,
    paths: &CheckerPaths,
    sandboxes_dir: &Path,
    runner: &dyn oj_worker_exec::SandboxRunner,
) -> Result<CheckerOutcome, JudgeError> {
    let mut params = SandboxParams::new(
        program.affinity.clone(),
        PathBuf::from("/box"),
        CpuAffinityTarget::Checker,
    );
    params.argv = program.argv_prefix.clone();
    params.mounts.push(BindMount {
        outside: program.binary_dir.clone(),
        inside: PathBuf::from("/box/bin"),
        read_only: true,
    });

    let input = paths.input;
    let answer = paths.answer;
    let mut message_file = None;
    let mut score_file = None;

    match custom.interface {
        CustomCheckerInterface::Testlib => {
            mount_named(&mut params, input, "input");
            mount_named(&mut params, Some(paths.user_output), "output");
            mount_named(&mut params, answer, "answer");
            params.argv.extend(["input".into(), "output".into(), "answer".into()]);
            params.stderr = Redirect::File(PathBuf::from("/box/message"));
            message_file = Some("message");
        }
        CustomCheckerInterface::Legacy => {
            mount_named(&mut params, input, "input");
            mount_named(&mut params, Some(paths.user_output), "user_out");
            mount_named(&mut params, answer, "answer");
            mount_named(&mut params, paths.user_source, "code");
            params.stdout = Redirect::File(PathBuf::from("/box/score"));
            params.stderr = Redirect::File(PathBuf::from("/box/message"));
            score_file = Some("score");
            message_file = Some("message");
        }
        CustomCheckerInterface::Lemon => {
            mount_named(&mut params, input, "input");
            mount_named(&mut params, Some(paths.user_output), "output");
            mount_named(&mut params, answer, "answer");
            params.argv.extend([
                "input".into(),
                "output".into(),
                "answer".into(),
                "100".into(),
                "score".into(),
                "message".into(),
            ]);
            score_file = Some("score");
            message_file = Some("message");
        }
        CustomCheckerInterface::HustOj => {
            mount_named(&mut params, input, "input");
            mount_named(&mut params, answer, "answer");
            mount_named(&mut params, Some(paths.user_output), "output");
            params.argv.extend(["input".into(), "answer".into(), "output".into()]);
        }
        CustomCheckerInterface::QdOj => {
            mount_named(&mut params, input, "input");
            mount_named(&mut params, Some(paths.user_output), "output");
            params.argv.extend(["input".into(), "output".into()]);
            if let Some(input) = input {
                let _ = input;
                params.stdin = Redirect::File(PathBuf::from("/box/input"));
            }
            params.stderr = Redirect::File(PathBuf::from("/box/message"));
            message_file = Some("message");
        }
        CustomCheckerInterface::DomJudge => {
            mount_named(&mut params, input, "input");
            mount_named(&mut params, answer, "answer");
            params.argv.extend([
                "input".into(),
                "answer".into(),
                "/box/workdir".into(),
            ]);
            params.stdin = Redirect::File(PathBuf::from("/box/output"));
            mount_named(&mut params, Some(paths.user_output), "output");
            message_file = Some("workdir/judgemessage.txt");
        }
    }

    let sandbox = Sandbox::new(sandboxes_dir, &params, None).map_err(JudgeError::System)?;
    if custom.interface == CustomCheckerInterface::DomJudge {
        std::fs::create_dir_all(sandbox.output_path(Path::new("workdir")))
            .context("Failed to create the domjudge checker's workdir")
            .map_err(JudgeError::System)?;
    }
    let result = sandbox.run(runner).map_err(JudgeError::System)?;

    match custom.interface {
        CustomCheckerInterface::HustOj => {
            let score = if result.exit_code == 0 { 100.0 } else { 0.0 };
            return Ok(outcome_from_score(score, String::new()));
        }
        CustomCheckerInterface::QdOj => {
            let score = match result.exit_code {
                0 => 100.0,
                1 => 0.0,
                255 => {
                    let message = read_sandbox_file(&sandbox, message_file);
                    return Err(JudgeError::judgement_failed(message));
                }
                other => {
                    return Err(JudgeError::judgement_failed(format!(
                        "qduoj checker exited with unexpected code {other}"
                    )))
                }
            };
            let message = read_sandbox_file(&sandbox, message_file);
            return Ok(outcome_from_score(score, message));
        }
        CustomCheckerInterface::DomJudge => {
            let score = match result.exit_code {
                42 => 100.0,
                43 => 0.0,
                other => {
                    return Err(JudgeError::judgement_failed(format!(
                        "domjudge checker exited with unexpected code {other}"
                    )))
                }
            };
            let message = read_sandbox_file(&sandbox, message_file);
            return Ok(outcome_from_score(score, message));
        }
        _ => {}
    }

    if !result.status.is_ok() {
        return Err(JudgeError::judgement_failed(format!(
            "Checker crashed: {:?}",
            result.status
        )));
    }

    let message = read_sandbox_file(&sandbox, message_file);
    match custom.interface {
        CustomCheckerInterface::Legacy | CustomCheckerInterface::Lemon => {
            let score_text = read_sandbox_file(&sandbox, score_file);
            let score: f64 = score_text
                .trim()
                .parse()
                .context("checker did not produce a numeric score")
                .map_err(JudgeError::System)?;
            Ok(outcome_from_score(score, message))
        }
        CustomCheckerInterface::Testlib => match parse_checker_message(&message) {
            ParsedMessage::Score(score) => Ok(outcome_from_score(score, message)),
            ParsedMessage::JudgementFailed(reason) => Err(JudgeError::judgement_failed(reason)),
        },
        _ => unreachable!(),
    }
}

fn mount_named(params: &mut SandboxParams, path: Option<&Path>, name: &str) {
    if let Some(path) = path {
        params.mounts.push(BindMount {
            outside: path.to_owned(),
            inside: PathBuf::from(format!("/box/{name}")),
            read_only: false,
        });
    }
}

fn read_sandbox_file(sandbox: &Sandbox, name: Option<&str>) -> String {
    let Some(name) = name else { return String::new() };
    let path = sandbox.output_path(Path::new(name));
    std::fs::read_to_string(&path).unwrap_or_default().trim().to_string()
}

/// Extra environment variables exposing the interactor interface flavor (and, for `shm`, the
/// shared-memory fd number) to both sandboxes of an interactive run (spec §4.E).
pub fn interactor_env(interface: InteractorInterface, shm_fd: Option<i32>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    match interface {
        InteractorInterface::Stdio => {
            env.insert("OJ_INTERACTOR_INTERFACE".to_string(), "stdio".to_string());
        }
        InteractorInterface::Shm { .. } => {
            env.insert("OJ_INTERACTOR_INTERFACE".to_string(), "shm".to_string());
            if let Some(fd) = shm_fd {
                env.insert("OJ_INTERACTOR_SHM_FD".to_string(), fd.to_string());
            }
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testlib_requires_cpp() {
        let checker = CustomCheckerSpec {
            interface: CustomCheckerInterface::Testlib,
            language: "Python3".to_string(),
            source: String::new(),
            compile_options: vec![],
        };
        assert!(checker.validate().is_err());
    }

    #[test]
    fn testlib_accepts_cpp() {
        let checker = CustomCheckerSpec {
            interface: CustomCheckerInterface::Testlib,
            language: "C++17 / gcc".to_string(),
            source: String::new(),
            compile_options: vec![],
        };
        assert!(checker.validate().is_ok());
    }
}
