//! Translates a wire [`TaskPayload`](crate::dispatcher::TaskPayload) into the types
//! `oj_worker_format::orchestrator::run_submission` needs: a parsed plan, a resolved manifest,
//! and every program the submission requires compiled ahead of time (spec §4.G).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Error};
use oj_worker_cache::CompileCache;
use oj_worker_exec::{Scheduler, SandboxRunner};
use oj_worker_format::checker::CheckerDescriptor;
use oj_worker_format::{
    run_submission, CompileProgress, CompiledTestProgram, JudgeError, JudgingPlan, ProblemType,
    ProgressSnapshot, Submission, SubtaskId, TestdataManifest, Truncated,
};
use oj_worker_store::FileStore;

use crate::compile::compile_program;
use crate::dispatcher::TaskPayload;

/// Parse and validate the plan/manifest, returning a terminal [`JudgeError::Configuration`] if
/// either is malformed or fails a structural invariant (spec §3 Invariants).
pub fn parse_plan(payload: &TaskPayload) -> Result<(JudgingPlan, TestdataManifest), JudgeError> {
    let plan: JudgingPlan = serde_yaml::from_str(&payload.plan_yaml)
        .map_err(|e| JudgeError::configuration(format!("Malformed judging plan: {e}")))?;
    let manifest: TestdataManifest = serde_json::from_str(&payload.manifest_json)
        .map_err(|e| JudgeError::configuration(format!("Malformed testdata manifest: {e}")))?;

    let diagnostics = plan.validate(&manifest);
    if !diagnostics.is_empty() {
        let summary = diagnostics
            .iter()
            .map(|d| d.message().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(JudgeError::configuration(summary));
    }
    Ok((plan, manifest))
}

/// Compile the user's program, plus any custom checker/interactor the plan's subtasks reference,
/// and assemble a [`CompiledTestProgram`] (spec §4.G "checker/interactor compiled in advance").
#[allow(clippy::too_many_arguments)]
pub async fn compile_all(
    payload: &TaskPayload,
    plan: &JudgingPlan,
    manifest: &TestdataManifest,
    file_store: &FileStore,
    cache: &CompileCache,
    scheduler: &Scheduler,
    sandboxes_dir: PathBuf,
    runner: Arc<dyn SandboxRunner>,
    max_binary_size: u64,
    compiler_message_limit_bytes: usize,
) -> Result<(CompiledTestProgram, Option<CompileProgress>), JudgeError> {
    let mut programs = CompiledTestProgram::default();

    let user_extra = collect_extra_sources(plan, &payload.language, manifest, file_store)?;
    let mut compile_progress = None;

    if payload.problem_type != ProblemType::SubmitAnswer {
        let result = compile_program(
            &payload.language,
            &payload.source,
            &payload.compile_options,
            &user_extra,
            cache,
            scheduler,
            sandboxes_dir.clone(),
            runner.clone(),
            max_binary_size,
        )
        .await
        .context("Failed to compile the submission")?;
        compile_progress = Some(CompileProgress {
            success: result.success,
            message: Truncated::clip(result.message.as_bytes(), compiler_message_limit_bytes),
        });
        if result.success {
            programs.user = Some(result.program);
        }
    }

    for (subtask_id, subtask) in plan.subtasks.iter().enumerate() {
        if let Some(CheckerDescriptor::Custom(custom)) = &subtask.checker {
            custom.validate()?;
            let result = compile_program(
                &custom.language,
                &custom.source,
                &custom.compile_options,
                &BTreeMap::new(),
                cache,
                scheduler,
                sandboxes_dir.clone(),
                runner.clone(),
                max_binary_size,
            )
            .await
            .with_context(|| format!("Failed to compile subtask {subtask_id}'s checker"))?;
            if !result.success {
                return Err(JudgeError::Compilation(format!(
                    "subtask {subtask_id}'s checker failed to compile: {}",
                    result.message
                )));
            }
            programs.checkers.insert(subtask_id, result.program);
        }
        if let Some(interactor) = &subtask.interactor {
            let result = compile_program(
                &interactor.language,
                &interactor.source,
                &interactor.compile_options,
                &BTreeMap::new(),
                cache,
                scheduler,
                sandboxes_dir.clone(),
                runner.clone(),
                max_binary_size,
            )
            .await
            .with_context(|| format!("Failed to compile subtask {subtask_id}'s interactor"))?;
            if !result.success {
                return Err(JudgeError::Compilation(format!(
                    "subtask {subtask_id}'s interactor failed to compile: {}",
                    result.message
                )));
            }
            programs.interactors.insert(subtask_id as SubtaskId, result.program);
        }
    }

    Ok((programs, compile_progress))
}

/// Resolve `extraSourceFiles` entries for `language`, deduplicating across subtasks that declare
/// the identical filename (spec §3 "Extra source/grader files for the user's language").
fn collect_extra_sources(
    plan: &JudgingPlan,
    language: &str,
    manifest: &TestdataManifest,
    file_store: &FileStore,
) -> Result<BTreeMap<String, Vec<u8>>, Error> {
    let mut seen = BTreeSet::new();
    let mut out = BTreeMap::new();
    for subtask in &plan.subtasks {
        if let Some(testdata_name) = subtask.extra_source_files.get(language) {
            if !seen.insert(testdata_name.clone()) {
                continue;
            }
            let key = manifest
                .get(testdata_name)
                .with_context(|| format!("extra source file {testdata_name:?} missing from manifest"))?;
            let handle = file_store
                .get(key)
                .with_context(|| format!("extra source file {testdata_name:?} not in the local store"))?;
            let bytes = std::fs::read(&handle.path)
                .with_context(|| format!("Failed to read extra source file {}", handle.path.display()))?;
            out.insert(testdata_name.clone(), bytes);
        }
    }
    Ok(out)
}

/// Run the submission once everything is compiled, forwarding every progress snapshot to
/// `on_progress` (spec §4.H step 4's debouncer wraps this callback, not this function).
pub async fn judge(
    plan: &JudgingPlan,
    problem_type: ProblemType,
    manifest: &TestdataManifest,
    programs: &CompiledTestProgram,
    compile: Option<CompileProgress>,
    slots_root: PathBuf,
    sandboxes_dir: PathBuf,
    output_size_limit_bytes: u64,
    submitted_archive: Option<PathBuf>,
    runner: Arc<dyn SandboxRunner>,
    on_progress: impl FnMut(&ProgressSnapshot) + Send + 'static,
) -> Result<oj_worker_format::SubmissionOutcome, JudgeError> {
    let submission = Submission {
        plan,
        problem_type,
        manifest,
        programs,
        slots_root,
        sandboxes_dir,
        output_size_limit_bytes,
        submitted_archive,
    };
    run_submission(&submission, runner, compile, on_progress).await
}
