//! Submit-answer problem runner (spec §4.E "Submit-answer"): no user program runs, the testcase's
//! output comes straight out of the submitted archive.

use std::fs::File;
use std::path::Path;

use anyhow::Context;

use crate::checker::{run_checker, CheckerDescriptor, CheckerPaths, CompiledProgram};
use crate::error::JudgeError;
use crate::result::TestcaseResult;

use super::TestcaseWorkspace;

/// Run one SUBMIT_ANSWER testcase: extract the wanted entry from the submitted archive (lazily,
/// checking its uncompressed size against the output-size limit first), then invoke the checker.
pub async fn run_submit_answer(
    workspace: &TestcaseWorkspace,
    archive_path: &Path,
    entry_name: &str,
    input: Option<&[u8]>,
    answer: Option<&Path>,
    checker: &CheckerDescriptor,
    checker_program: Option<&CompiledProgram>,
    output_size_limit_bytes: u64,
    sandboxes_dir: std::path::PathBuf,
    runner: std::sync::Arc<dyn oj_worker_exec::SandboxRunner>,
) -> Result<TestcaseResult, JudgeError> {
    let input_path = match input {
        Some(bytes) => Some(
            workspace
                .materialize_input("input.txt", bytes)
                .map_err(JudgeError::System)?,
        ),
        None => None,
    };

    let archive_path = archive_path.to_owned();
    let entry_name = entry_name.to_owned();
    let extracted_path = workspace.working_dir.join("submitted_output");
    let limit = output_size_limit_bytes;
    let extraction = tokio::task::spawn_blocking(move || extract_entry(&archive_path, &entry_name, &extracted_path, limit))
        .await
        .context("archive extraction task panicked")
        .map_err(JudgeError::System)?
        .map_err(JudgeError::System)?;

    let ExtractionOutcome::Extracted = extraction else {
        return Ok(TestcaseResult::new(crate::result::TestcaseStatus::OutputLimitExceeded, 0.0));
    };

    let checker = checker.clone();
    let checker_program = checker_program.cloned();
    let answer = answer.map(|p| p.to_owned());
    let user_output = extracted_path;
    let outcome = tokio::task::spawn_blocking(move || {
        let paths = CheckerPaths {
            input: input_path.as_deref(),
            user_output: &user_output,
            answer: answer.as_deref(),
            user_source: None,
        };
        run_checker(&checker, checker_program.as_ref(), &paths, &sandboxes_dir, runner.as_ref())
    })
    .await
    .context("checker task panicked")
    .map_err(JudgeError::System)??;

    let mut result = TestcaseResult::new(outcome.status, outcome.score);
    result.checker_message = Some(crate::error::Truncated::whole(outcome.message));
    Ok(result)
}

enum ExtractionOutcome {
    Extracted,
    TooLarge,
}

fn extract_entry(
    archive_path: &Path,
    entry_name: &str,
    dest: &Path,
    limit_bytes: u64,
) -> Result<ExtractionOutcome, anyhow::Error> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open submitted archive at {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("Failed to read submitted archive as a zip")?;
    let mut entry = archive
        .by_name(entry_name)
        .with_context(|| format!("Submitted archive has no entry named {entry_name:?}"))?;
    if entry.size() > limit_bytes {
        return Ok(ExtractionOutcome::TooLarge);
    }
    let mut out = File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    std::io::copy(&mut entry, &mut out).context("Failed to extract submitted archive entry")?;
    Ok(ExtractionOutcome::Extracted)
}
