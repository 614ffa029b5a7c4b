//! End-to-end orchestrator scenarios, driving `run_submission` with a fake in-process `Sandbox`
//! implementation instead of a real one, covering the batch/group-min/dependency/submit-answer
//! corners `orchestrator.rs`'s own unit test doesn't reach.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use oj_worker_dag::{Affinity, ExecutionLimits};
use oj_worker_exec::{ErrorSandboxRunner, RawSandboxResult, SandboxRunner};
use oj_worker_format::checker::{BuiltInChecker, CheckerDescriptor, CompiledProgram};
use oj_worker_format::{
    CompiledTestProgram, JudgingPlan, ProblemType, ScoringType, Submission, Subtask, Testcase,
    TestcaseStatus, TestdataManifest,
};
use oj_worker_store::FileStoreKey;
use tabox::configuration::SandboxConfiguration;
use tabox::result::{ExitStatus, ResourceUsage, SandboxExecutionResult};

/// Copies whatever was redirected to stdin straight to stdout, standing in for a "cat"-style user
/// program without actually forking anything.
struct EchoSandboxRunner {
    calls: Arc<AtomicUsize>,
}

impl SandboxRunner for EchoSandboxRunner {
    fn run(&self, config: SandboxConfiguration, _pid: Arc<AtomicU32>) -> RawSandboxResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = config
            .stdin
            .as_ref()
            .and_then(|p| std::fs::read(p).ok())
            .unwrap_or_default();
        if let Some(stdout) = &config.stdout {
            let _ = std::fs::write(stdout, &input);
        }
        RawSandboxResult::Success(SandboxExecutionResult {
            status: ExitStatus::ExitCode(0),
            resource_usage: ResourceUsage {
                memory_usage: 1024,
                user_cpu_time: 0.01,
                system_cpu_time: 0.0,
                wall_time_usage: 0.01,
            },
        })
    }
}

/// Always reports the sandboxed process as killed, having burned far more CPU time than any
/// testcase's limit allows.
struct KillSandboxRunner {
    calls: Arc<AtomicUsize>,
}

impl SandboxRunner for KillSandboxRunner {
    fn run(&self, _config: SandboxConfiguration, _pid: Arc<AtomicU32>) -> RawSandboxResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RawSandboxResult::Success(SandboxExecutionResult {
            status: ExitStatus::Killed,
            resource_usage: ResourceUsage {
                memory_usage: 1024,
                user_cpu_time: 5.0,
                system_cpu_time: 0.0,
                wall_time_usage: 5.0,
            },
        })
    }
}

fn empty_testcase() -> Testcase {
    Testcase {
        input: None,
        output: None,
        limits: None,
        weight: None,
        user_output_filename: None,
    }
}

/// Registers `content` under `name` in both `manifest` and the on-disk testdata layout
/// `SubmissionHandle::read_testdata`/`resolve_answer` expect under `sandboxes_dir/testdata`.
fn put_testdata(sandboxes_dir: &Path, manifest: &mut TestdataManifest, name: &str, content: &[u8]) {
    let key = FileStoreKey::from_bytes(content);
    let dir = sandboxes_dir.join("testdata");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(key.to_hex()), content).unwrap();
    manifest.insert(name.to_string(), key);
}

/// A fake compiled "cat" program: its binary directory just needs to exist on disk for
/// `standard_mounts`'s bind mount to resolve; the inline script itself is never executed by the
/// fake runners above.
fn fake_user_program(binary_dir: &Path) -> CompiledProgram {
    CompiledProgram {
        affinity: Affinity::InlineScript("cat".to_string()),
        argv_prefix: vec![],
        binary_dir: binary_dir.to_owned(),
        source_file: None,
    }
}

#[tokio::test]
async fn trivial_batch_submission_is_accepted() {
    let tmp = tempfile::TempDir::new().unwrap();
    let binary_dir = tempfile::TempDir::new().unwrap();
    let sandboxes_dir = tmp.path().join("sandboxes");

    let mut manifest = TestdataManifest::new();
    put_testdata(&sandboxes_dir, &mut manifest, "in", b"42\n");
    put_testdata(&sandboxes_dir, &mut manifest, "out", b"42\n");

    let plan = JudgingPlan {
        default_limits: ExecutionLimits::new(1000, 256 << 20),
        run_samples: false,
        subtasks: vec![Subtask {
            limits: None,
            scoring_type: ScoringType::Sum,
            points: Some(100.0),
            dependencies: vec![],
            testcases: vec![Testcase {
                input: Some("in".to_string()),
                output: Some("out".to_string()),
                ..empty_testcase()
            }],
            checker: Some(CheckerDescriptor::BuiltIn(BuiltInChecker::Integers)),
            interactor: None,
            extra_source_files: BTreeMap::new(),
        }],
        samples: vec![],
        file_io: None,
    };

    let programs = CompiledTestProgram {
        user: Some(fake_user_program(binary_dir.path())),
        checkers: BTreeMap::new(),
        interactors: BTreeMap::new(),
    };
    let submission = Submission {
        plan: &plan,
        problem_type: ProblemType::Batch,
        manifest: &manifest,
        programs: &programs,
        slots_root: tmp.path().join("slots"),
        sandboxes_dir: sandboxes_dir.clone(),
        output_size_limit_bytes: 1 << 20,
        submitted_archive: None,
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(EchoSandboxRunner { calls: calls.clone() });
    let outcome = oj_worker_format::run_submission(&submission, runner, None, |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.status, TestcaseStatus::Accepted);
    assert_eq!(outcome.score, 100.0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn group_min_subtask_stops_after_first_time_limit_exceeded() {
    let tmp = tempfile::TempDir::new().unwrap();
    let binary_dir = tempfile::TempDir::new().unwrap();
    let manifest = TestdataManifest::new();

    let plan = JudgingPlan {
        default_limits: ExecutionLimits::new(1000, 256 << 20),
        run_samples: false,
        subtasks: vec![Subtask {
            limits: Some(ExecutionLimits::new(100, 256 << 20)),
            scoring_type: ScoringType::GroupMin,
            points: Some(100.0),
            dependencies: vec![],
            testcases: vec![empty_testcase(), empty_testcase()],
            checker: Some(CheckerDescriptor::BuiltIn(BuiltInChecker::Integers)),
            interactor: None,
            extra_source_files: BTreeMap::new(),
        }],
        samples: vec![],
        file_io: None,
    };

    let programs = CompiledTestProgram {
        user: Some(fake_user_program(binary_dir.path())),
        checkers: BTreeMap::new(),
        interactors: BTreeMap::new(),
    };
    let submission = Submission {
        plan: &plan,
        problem_type: ProblemType::Batch,
        manifest: &manifest,
        programs: &programs,
        slots_root: tmp.path().join("slots"),
        sandboxes_dir: tmp.path().join("sandboxes"),
        output_size_limit_bytes: 1 << 20,
        submitted_archive: None,
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(KillSandboxRunner { calls: calls.clone() });
    let outcome = oj_worker_format::run_submission(&submission, runner, None, |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.status, TestcaseStatus::TimeLimitExceeded);
    assert_eq!(outcome.score, 0.0);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "the second testcase must never run once the running minimum rounds to 0"
    );
}

#[tokio::test]
async fn dependent_subtask_is_skipped_when_its_dependency_scores_zero() {
    let tmp = tempfile::TempDir::new().unwrap();
    let binary_dir = tempfile::TempDir::new().unwrap();
    let sandboxes_dir = tmp.path().join("sandboxes");

    let mut manifest = TestdataManifest::new();
    put_testdata(&sandboxes_dir, &mut manifest, "dep_in", b"1\n");
    put_testdata(&sandboxes_dir, &mut manifest, "dep_out", b"2\n");

    let dependency = Subtask {
        limits: None,
        scoring_type: ScoringType::Sum,
        points: Some(50.0),
        dependencies: vec![],
        testcases: vec![Testcase {
            input: Some("dep_in".to_string()),
            output: Some("dep_out".to_string()),
            ..empty_testcase()
        }],
        checker: Some(CheckerDescriptor::BuiltIn(BuiltInChecker::Integers)),
        interactor: None,
        extra_source_files: BTreeMap::new(),
    };
    let dependent = Subtask {
        limits: None,
        scoring_type: ScoringType::Sum,
        points: Some(50.0),
        dependencies: vec![0],
        testcases: vec![empty_testcase(), empty_testcase()],
        checker: Some(CheckerDescriptor::BuiltIn(BuiltInChecker::Integers)),
        interactor: None,
        extra_source_files: BTreeMap::new(),
    };

    let plan = JudgingPlan {
        default_limits: ExecutionLimits::new(1000, 256 << 20),
        run_samples: false,
        subtasks: vec![dependency, dependent],
        samples: vec![],
        file_io: None,
    };

    let programs = CompiledTestProgram {
        user: Some(fake_user_program(binary_dir.path())),
        checkers: BTreeMap::new(),
        interactors: BTreeMap::new(),
    };
    let submission = Submission {
        plan: &plan,
        problem_type: ProblemType::Batch,
        manifest: &manifest,
        programs: &programs,
        slots_root: tmp.path().join("slots"),
        sandboxes_dir: sandboxes_dir.clone(),
        output_size_limit_bytes: 1 << 20,
        submitted_archive: None,
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(EchoSandboxRunner { calls: calls.clone() });
    let outcome = oj_worker_format::run_submission(&submission, runner, None, |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.status, TestcaseStatus::WrongAnswer);
    assert_eq!(outcome.score, 0.0);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "only the failing dependency's single testcase should ever reach the sandbox"
    );
}

#[tokio::test]
async fn submit_answer_entry_over_the_output_limit_is_rejected_without_a_sandbox_run() {
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    let tmp = tempfile::TempDir::new().unwrap();
    let archive_path = tmp.path().join("submission.zip");
    {
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let mut zip = ZipWriter::new(std::fs::File::create(&archive_path).unwrap());
        zip.start_file("output.txt", options).unwrap();
        std::io::Write::write_all(&mut zip, &vec![b'x'; 4096]).unwrap();
        zip.finish().unwrap();
    }

    let manifest = TestdataManifest::new();
    let plan = JudgingPlan {
        default_limits: ExecutionLimits::new(1000, 256 << 20),
        run_samples: false,
        subtasks: vec![Subtask {
            limits: None,
            scoring_type: ScoringType::Sum,
            points: Some(100.0),
            dependencies: vec![],
            testcases: vec![Testcase {
                user_output_filename: Some("output.txt".to_string()),
                ..empty_testcase()
            }],
            checker: Some(CheckerDescriptor::BuiltIn(BuiltInChecker::Integers)),
            interactor: None,
            extra_source_files: BTreeMap::new(),
        }],
        samples: vec![],
        file_io: None,
    };

    let programs = CompiledTestProgram::default();
    let submission = Submission {
        plan: &plan,
        problem_type: ProblemType::SubmitAnswer,
        manifest: &manifest,
        programs: &programs,
        slots_root: tmp.path().join("slots"),
        sandboxes_dir: tmp.path().join("sandboxes"),
        output_size_limit_bytes: 1024,
        submitted_archive: Some(archive_path),
    };

    // A sandbox run here would be a bug: the archive entry is over the limit, so extraction must
    // reject it before the checker (and therefore the sandbox) ever runs. `ErrorSandboxRunner`
    // makes that failure mode loud instead of silent.
    let outcome = oj_worker_format::run_submission(&submission, Arc::new(ErrorSandboxRunner), None, |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.status, TestcaseStatus::OutputLimitExceeded);
    assert_eq!(outcome.score, 0.0);
}
