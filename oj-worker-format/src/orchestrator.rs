//! Submission orchestrator (spec §4.G, component G): drives one submission's `Preparing` ->
//! `Compiling` -> `Running` -> `Finished` progress lifecycle, wiring the judging plan, the
//! per-problem-type runners, the scoring engine, and testcase-hash identity together.
//!
//! Compilation itself (the actual cache lookup/compile step) is the caller's concern — this
//! module takes already-resolved [`CompiledTestProgram`]s, the way [`crate::scoring::evaluate_plan`]
//! takes an already-resolved `run_testcase` closure rather than owning the task-slot scheduler.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use oj_worker_exec::SandboxRunner;

use crate::checker::CompiledProgram;
use crate::error::JudgeError;
use crate::plan::{FileIoNames, JudgingPlan, ProblemType, SubtaskId, Testcase, TestcaseId, TestdataManifest};
use crate::progress::ProgressSnapshot;
use crate::result::{TestcaseResult, TestcaseStatus};
use crate::runner::{run_batch, run_interactive, run_submit_answer, TestcaseWorkspace};
use crate::scoring::evaluate_plan;
use crate::testcase_hash::TestcaseHash;

/// Compiled programs a submission needs before judging can start, keyed by subtask where a
/// checker/interactor is scoped to one (spec §4.D "shared by every testcase in the subtask").
#[derive(Default)]
pub struct CompiledTestProgram {
    /// The submission's own compiled program; absent for SUBMIT_ANSWER, which has none.
    pub user: Option<CompiledProgram>,
    pub checkers: BTreeMap<SubtaskId, CompiledProgram>,
    pub interactors: BTreeMap<SubtaskId, CompiledProgram>,
}

/// Everything one submission's judging run needs, resolved by the caller ahead of time.
pub struct Submission<'a> {
    pub plan: &'a JudgingPlan,
    pub problem_type: ProblemType,
    pub manifest: &'a TestdataManifest,
    pub programs: &'a CompiledTestProgram,
    /// Root directory holding per-testcase leased slots (spec §5 "task slot"); a fresh
    /// subdirectory is created under it for every testcase.
    pub slots_root: PathBuf,
    pub sandboxes_dir: PathBuf,
    pub output_size_limit_bytes: u64,
    /// SUBMIT_ANSWER only: the user's uploaded archive and the naming convention for entries
    /// inside it (spec §4.E "Submit-answer").
    pub submitted_archive: Option<PathBuf>,
}

/// Final state of one submission's judging (spec §4.G / §6 `progressType = Finished`).
pub struct SubmissionOutcome {
    pub status: TestcaseStatus,
    pub score: f64,
}

/// Drive one submission from `Preparing` through `Finished`, calling `on_progress` every time the
/// snapshot changes (spec §6: the dispatcher is sent a fresh snapshot on every state transition).
///
/// `compile` is run first and its outcome folded into the `Compiling` snapshot before any
/// testcase runs (spec §4.G: "report the compile result as soon as it's known"). A compile
/// failure short-circuits straight to `Finished` with every subtask at 0.
pub async fn run_submission(
    submission: &Submission<'_>,
    runner: Arc<dyn SandboxRunner>,
    compile: Option<crate::progress::CompileProgress>,
    mut on_progress: impl FnMut(&ProgressSnapshot) + Send + 'static,
) -> Result<SubmissionOutcome, JudgeError> {
    let mut snapshot = ProgressSnapshot::preparing();
    on_progress(&snapshot);

    if let Some(compile) = &compile {
        if !compile.success {
            let mut snapshot = ProgressSnapshot::seed_running(
                submission.plan.samples.len(),
                &plan_subtask_sizes(submission.plan),
            );
            snapshot.compile = Some(compile.clone());
            snapshot.finish(TestcaseStatus::CompilationError, 0.0);
            on_progress(&snapshot);
            return Ok(SubmissionOutcome {
                status: TestcaseStatus::CompilationError,
                score: 0.0,
            });
        }
    }

    snapshot = ProgressSnapshot::seed_running(
        submission.plan.samples.len(),
        &plan_subtask_sizes(submission.plan),
    );
    snapshot.compile = compile;
    on_progress(&snapshot);

    let snapshot = Arc::new(tokio::sync::Mutex::new(snapshot));
    let on_progress = Arc::new(tokio::sync::Mutex::new(on_progress));

    let run_sample = {
        let submission = SubmissionHandle::new(submission, runner.clone());
        let snapshot = snapshot.clone();
        let on_progress = on_progress.clone();
        move |testcase_id: TestcaseId, testcase: Testcase, limits: oj_worker_dag::ExecutionLimits| {
            let submission = submission.clone();
            let snapshot = snapshot.clone();
            let on_progress = on_progress.clone();
            async move {
                {
                    let mut guard = snapshot.lock().await;
                    guard.samples[testcase_id] = crate::progress::TestcaseRef::Running;
                    (on_progress.lock().await)(&guard);
                }
                let result = submission.run_sample(testcase_id, &testcase, limits).await;
                let hash = submission.testcase_hash(None, &testcase, limits);
                let mut guard = snapshot.lock().await;
                guard.testcase_result.insert(hash, result.clone());
                guard.samples[testcase_id] = crate::progress::TestcaseRef::Done { testcase_hash: hash };
                (on_progress.lock().await)(&guard);
                result
            }
        }
    };

    let run_testcase = {
        let submission = SubmissionHandle::new(submission, runner);
        let snapshot = snapshot.clone();
        let on_progress = on_progress.clone();
        move |subtask_id: SubtaskId, testcase_id: TestcaseId, testcase: Testcase, limits: oj_worker_dag::ExecutionLimits| {
            let submission = submission.clone();
            let snapshot = snapshot.clone();
            let on_progress = on_progress.clone();
            async move {
                {
                    let mut guard = snapshot.lock().await;
                    guard.mark_running(subtask_id, testcase_id);
                    (on_progress.lock().await)(&guard);
                }
                let result = submission.run_testcase(subtask_id, testcase_id, &testcase, limits).await;
                let hash = submission.testcase_hash(Some(subtask_id), &testcase, limits);
                let mut guard = snapshot.lock().await;
                guard.mark_done(subtask_id, testcase_id, hash, result.clone());
                (on_progress.lock().await)(&guard);
                result
            }
        }
    };

    let scoring = evaluate_plan(submission.plan, submission.problem_type, run_testcase, run_sample).await;

    let status = scoring.first_non_accepted.unwrap_or(TestcaseStatus::Accepted);
    let mut guard = snapshot.lock().await;
    guard.finish(status, scoring.final_score);
    (on_progress.lock().await)(&guard);

    Ok(SubmissionOutcome {
        status,
        score: scoring.final_score,
    })
}

fn plan_subtask_sizes(plan: &JudgingPlan) -> Vec<(f64, usize)> {
    let weights = crate::plan::distribute_weights(&plan.subtasks.iter().map(|s| s.points).collect::<Vec<_>>());
    plan.subtasks
        .iter()
        .zip(weights)
        .map(|(s, w)| (w, s.testcases.len()))
        .collect()
}

/// Cheaply-`Clone`able handle bundling everything a spawned testcase task needs, so the closures
/// handed to [`evaluate_plan`] can be `'static` without threading every field through manually.
struct SubmissionHandle {
    plan_problem_type: ProblemType,
    subtasks: Arc<Vec<crate::plan::Subtask>>,
    manifest: TestdataManifest,
    programs: Arc<CompiledTestProgram>,
    slots_root: PathBuf,
    sandboxes_dir: PathBuf,
    output_size_limit_bytes: u64,
    submitted_archive: Option<PathBuf>,
    file_io: Option<FileIoNames>,
    runner: Arc<dyn SandboxRunner>,
}

impl Clone for SubmissionHandle {
    fn clone(&self) -> Self {
        SubmissionHandle {
            plan_problem_type: self.plan_problem_type,
            subtasks: self.subtasks.clone(),
            manifest: self.manifest.clone(),
            programs: self.programs.clone(),
            slots_root: self.slots_root.clone(),
            sandboxes_dir: self.sandboxes_dir.clone(),
            output_size_limit_bytes: self.output_size_limit_bytes,
            submitted_archive: self.submitted_archive.clone(),
            file_io: self.file_io.clone(),
            runner: self.runner.clone(),
        }
    }
}

impl SubmissionHandle {
    fn new(submission: &Submission<'_>, runner: Arc<dyn SandboxRunner>) -> Self {
        SubmissionHandle {
            plan_problem_type: submission.problem_type,
            subtasks: Arc::new(submission.plan.subtasks.clone()),
            manifest: submission.manifest.clone(),
            programs: Arc::new(CompiledTestProgram {
                user: submission.programs.user.clone(),
                checkers: submission.programs.checkers.clone(),
                interactors: submission.programs.interactors.clone(),
            }),
            slots_root: submission.slots_root.clone(),
            sandboxes_dir: submission.sandboxes_dir.clone(),
            output_size_limit_bytes: submission.output_size_limit_bytes,
            submitted_archive: submission.submitted_archive.clone(),
            file_io: submission.plan.file_io.clone(),
            runner,
        }
    }

    fn read_testdata(&self, name: &Option<String>) -> Result<Option<Vec<u8>>, JudgeError> {
        match name {
            None => Ok(None),
            Some(name) => {
                let key = self
                    .manifest
                    .get(name)
                    .with_context(|| format!("testdata file {name:?} is not in the manifest"))
                    .map_err(JudgeError::System)?;
                let path = self.sandboxes_dir.join("testdata").join(key.to_hex());
                std::fs::read(&path)
                    .with_context(|| format!("Failed to read testdata file {}", path.display()))
                    .map_err(JudgeError::System)
                    .map(Some)
            }
        }
    }

    fn resolve_answer(&self, name: &Option<String>) -> Result<Option<PathBuf>, JudgeError> {
        match name {
            None => Ok(None),
            Some(name) => {
                let key = self
                    .manifest
                    .get(name)
                    .with_context(|| format!("testdata file {name:?} is not in the manifest"))
                    .map_err(JudgeError::System)?;
                Ok(Some(self.sandboxes_dir.join("testdata").join(key.to_hex())))
            }
        }
    }

    fn new_slot(&self) -> Result<TestcaseWorkspace, JudgeError> {
        let slot_dir = self.slots_root.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&slot_dir)
            .with_context(|| format!("Failed to create task slot {}", slot_dir.display()))
            .map_err(JudgeError::System)?;
        TestcaseWorkspace::create(&slot_dir).map_err(JudgeError::System)
    }

    fn testcase_hash(
        &self,
        subtask: Option<SubtaskId>,
        testcase: &Testcase,
        limits: oj_worker_dag::ExecutionLimits,
    ) -> TestcaseHash {
        let input_key = testcase.input.as_ref().and_then(|n| self.manifest.get(n));
        let output_key = testcase.output.as_ref().and_then(|n| self.manifest.get(n));
        let checker = subtask.and_then(|s| self.checker_for(s));
        TestcaseHash::compute(limits, input_key, output_key, checker.as_ref(), None)
    }

    fn checker_for(&self, subtask: SubtaskId) -> Option<crate::checker::CheckerDescriptor> {
        self.subtasks.get(subtask).and_then(|s| s.checker.clone())
    }

    /// Samples have no subtask of their own; they're judged the same way testcases in the plan's
    /// first subtask would be, reusing that subtask's checker/interactor (the judging plan has no
    /// sample-scoped checker to fall back to).
    async fn run_sample(
        &self,
        _testcase_id: TestcaseId,
        testcase: &Testcase,
        limits: oj_worker_dag::ExecutionLimits,
    ) -> TestcaseResult {
        let checker = self.checker_for(0);
        let interactor = self.programs.interactors.get(&0).cloned();
        match self.dispatch(0, testcase, limits, checker, interactor).await {
            Ok(result) => result,
            Err(_) => TestcaseResult::new(TestcaseStatus::RuntimeError, 0.0),
        }
    }

    async fn run_testcase(
        &self,
        subtask_id: SubtaskId,
        _testcase_id: TestcaseId,
        testcase: &Testcase,
        limits: oj_worker_dag::ExecutionLimits,
    ) -> TestcaseResult {
        let checker = self.checker_for(subtask_id);
        let interactor = self.programs.interactors.get(&subtask_id).cloned();
        match self.dispatch(subtask_id, testcase, limits, checker, interactor).await {
            Ok(result) => result,
            Err(JudgeError::System(e)) => {
                let mut result = TestcaseResult::new(TestcaseStatus::RuntimeError, 0.0);
                result.system_message = Some(crate::error::Truncated::whole(e.to_string()));
                result
            }
            Err(e) => {
                let mut result = TestcaseResult::new(TestcaseStatus::JudgementFailed, 0.0);
                result.system_message = Some(crate::error::Truncated::whole(e.to_string()));
                result
            }
        }
    }

    async fn dispatch(
        &self,
        subtask_id: SubtaskId,
        testcase: &Testcase,
        limits: oj_worker_dag::ExecutionLimits,
        checker: Option<crate::checker::CheckerDescriptor>,
        interactor_program: Option<CompiledProgram>,
    ) -> Result<TestcaseResult, JudgeError> {
        match self.plan_problem_type {
            ProblemType::Interactive => {
                let user = self
                    .programs
                    .user
                    .as_ref()
                    .context("interactive problem has no compiled user program")
                    .map_err(JudgeError::System)?;
                let interactor = interactor_program
                    .context("interactive subtask has no compiled interactor")
                    .map_err(JudgeError::System)?;
                let input = self.read_testdata(&testcase.input)?;
                let workspace = self.new_slot()?;
                run_interactive(
                    &workspace,
                    user,
                    &interactor,
                    crate::checker::InteractorInterface::Stdio,
                    limits,
                    input.as_deref(),
                    self.sandboxes_dir.clone(),
                    self.runner.clone(),
                )
                .await
            }
            ProblemType::SubmitAnswer => {
                let archive = self
                    .submitted_archive
                    .as_ref()
                    .context("submit-answer problem has no uploaded archive")
                    .map_err(JudgeError::System)?;
                let entry_name = testcase
                    .user_output_filename
                    .clone()
                    .context("submit-answer testcase has no entry filename")
                    .map_err(JudgeError::System)?;
                let checker = checker.context("submit-answer subtask has no checker").map_err(JudgeError::System)?;
                let checker_program = self.programs.checkers.get(&subtask_id);
                let input = self.read_testdata(&testcase.input)?;
                let answer = self.resolve_answer(&testcase.output)?;
                let workspace = self.new_slot()?;
                run_submit_answer(
                    &workspace,
                    archive,
                    &entry_name,
                    input.as_deref(),
                    answer.as_deref(),
                    &checker,
                    checker_program,
                    self.output_size_limit_bytes,
                    self.sandboxes_dir.clone(),
                    self.runner.clone(),
                )
                .await
            }
            ProblemType::Batch => self.run_batch_like(subtask_id, testcase, limits, checker).await,
        }
    }

    async fn run_batch_like(
        &self,
        subtask_id: SubtaskId,
        testcase: &Testcase,
        limits: oj_worker_dag::ExecutionLimits,
        checker: Option<crate::checker::CheckerDescriptor>,
    ) -> Result<TestcaseResult, JudgeError> {
        let user = self
            .programs
            .user
            .as_ref()
            .context("batch problem has no compiled user program")
            .map_err(JudgeError::System)?;
        let checker = checker.unwrap_or(crate::checker::CheckerDescriptor::BuiltIn(
            crate::checker::BuiltInChecker::Lines { case_sensitive: false },
        ));
        let checker_program = self.programs.checkers.get(&subtask_id);
        let input = self.read_testdata(&testcase.input)?;
        let answer = self.resolve_answer(&testcase.output)?;
        let workspace = self.new_slot()?;
        run_batch(
            &workspace,
            user,
            limits,
            input.as_deref(),
            answer.as_deref(),
            self.file_io.as_ref(),
            &checker,
            checker_program,
            self.output_size_limit_bytes,
            self.sandboxes_dir.clone(),
            self.runner.clone(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ScoringType, Subtask};
    use oj_worker_dag::ExecutionLimits;
    use oj_worker_exec::SuccessSandboxRunner;

    fn testcase() -> Testcase {
        Testcase {
            input: None,
            output: None,
            limits: None,
            weight: None,
            user_output_filename: None,
        }
    }

    fn plan() -> JudgingPlan {
        JudgingPlan {
            default_limits: ExecutionLimits::new(1000, 256 << 20),
            run_samples: false,
            subtasks: vec![Subtask {
                limits: None,
                scoring_type: ScoringType::Sum,
                points: Some(100.0),
                dependencies: vec![],
                testcases: vec![testcase()],
                checker: None,
                interactor: None,
                extra_source_files: Default::default(),
            }],
            samples: vec![],
            file_io: None,
        }
    }

    #[tokio::test]
    async fn missing_user_program_reports_runtime_error_not_a_panic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let plan = plan();
        let manifest = TestdataManifest::new();
        let programs = CompiledTestProgram::default();
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
        let mut seen_finished = false;
        let outcome = run_submission(&submission, Arc::new(SuccessSandboxRunner), None, |snapshot| {
            if snapshot.progress_type == crate::progress::ProgressType::Finished {
                seen_finished = true;
            }
        })
        .await
        .unwrap();
        assert_eq!(outcome.status, TestcaseStatus::RuntimeError);
        assert!(seen_finished);
    }
}
