//! Judging-plan data model, checker/scoring engine, and per-problem-type runners: spec
//! components D through G of the worker's judging pipeline.
//!
//! This crate doesn't know how a submission arrived or how testdata/binaries are fetched; it
//! takes an already-resolved [`plan::JudgingPlan`] plus compiled programs and drives one
//! submission's evaluation to a [`scoring::ScoringResult`], reporting progress along the way via
//! [`progress::ProgressSnapshot`].

#[macro_use]
extern crate log;

pub mod checker;
mod error;
mod orchestrator;
mod plan;
mod progress;
mod result;
mod runner;
mod scoring;
mod testcase_hash;

pub use error::{JudgeError, Truncated};
pub use orchestrator::{run_submission, CompiledTestProgram, Submission, SubmissionOutcome};
pub use plan::{
    distribute_weights, topo_order, FileIoNames, JudgingPlan, ProblemType, ScoringType, Subtask,
    SubtaskId, Testcase, TestcaseId, TestdataManifest, TestdataName,
};
pub use progress::{CompileProgress, ProgressSnapshot, ProgressType, SubtaskProgress, TestcaseRef};
pub use result::{classify_score, TestcaseResult, TestcaseStatus};
pub use runner::{run_batch, run_interactive, run_submit_answer, TestcaseWorkspace};
pub use scoring::{evaluate_plan, ScoringResult, SubtaskScore, TestcaseOutcome};
pub use testcase_hash::TestcaseHash;
