//! The judging plan data model (spec §3): what a submission is graded against.

use std::collections::BTreeMap;

use oj_worker_dag::ExecutionLimits;
use oj_worker_diagnostics::Diagnostic;
use oj_worker_store::FileStoreKey;

use crate::checker::{CheckerDescriptor, InteractorDescriptor};

/// Which of the three evaluation strategies a submission is judged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProblemType {
    Batch,
    Interactive,
    SubmitAnswer,
}

/// How per-testcase scores combine into a subtask score (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScoringType {
    /// Weighted sum of per-testcase scores, evaluated in parallel.
    Sum,
    /// Running minimum, evaluated serially, short-circuits remaining testcases once it rounds to 0.
    GroupMin,
    /// Running product of percentages, evaluated serially, same short-circuit as `GroupMin`.
    GroupMul,
}

/// A logical testdata filename, resolved against the submission's testdata manifest.
pub type TestdataName = String;

/// One testcase inside a subtask.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Testcase {
    /// Input file's logical name. Always present for BATCH/INTERACTIVE; optional for
    /// SUBMIT_ANSWER.
    pub input: Option<TestdataName>,
    /// Expected output file's logical name. Present for BATCH/SUBMIT_ANSWER; absent for
    /// INTERACTIVE (the interactor is the oracle).
    pub output: Option<TestdataName>,
    /// Limits overriding the subtask's/plan's, if any.
    pub limits: Option<ExecutionLimits>,
    /// Weight within the subtask; `None` means auto-distributed (spec §3 Invariants).
    pub weight: Option<f64>,
    /// SUBMIT_ANSWER only: filename inside the user's submitted archive providing this
    /// testcase's output, if not the default `outputFile`.
    pub user_output_filename: Option<String>,
}

/// A group of testcases sharing a scoring mode, weight, and optional dependencies.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Subtask {
    /// Limits overriding the plan's, if any.
    pub limits: Option<ExecutionLimits>,
    pub scoring_type: ScoringType,
    /// Weight among all subtasks; `None` means auto-distributed.
    pub points: Option<f64>,
    /// Indices (into the plan's `subtasks`) of subtasks that must score above 0 before this one
    /// runs.
    pub dependencies: Vec<usize>,
    pub testcases: Vec<Testcase>,
    /// BATCH/SUBMIT_ANSWER checker, shared by every testcase in the subtask.
    pub checker: Option<CheckerDescriptor>,
    /// INTERACTIVE interactor, shared by every testcase in the subtask.
    pub interactor: Option<InteractorDescriptor>,
    /// Extra source/grader files for the user's language, keyed by language name.
    pub extra_source_files: BTreeMap<String, TestdataName>,
}

/// Index of a subtask within a judging plan's `subtasks` list.
pub type SubtaskId = usize;
/// Index of a testcase within a subtask's `testcases` list.
pub type TestcaseId = usize;

/// The full judging plan for one problem (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JudgingPlan {
    pub default_limits: ExecutionLimits,
    /// Whether to run the sample testcases before grading subtasks.
    pub run_samples: bool,
    pub subtasks: Vec<Subtask>,
    /// In-statement samples, run diagnostically before subtasks when `run_samples` is set.
    pub samples: Vec<Testcase>,
    /// Whether `fileIo` is configured for BATCH: the user program reads/writes named files in
    /// its working directory instead of stdin/stdout.
    pub file_io: Option<FileIoNames>,
}

/// Names of the input/output files the user program reads/writes when `fileIo` is configured.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileIoNames {
    pub input: String,
    pub output: String,
}

/// Testdata manifest: logical filename to its content-addressed key in the local store.
pub type TestdataManifest = BTreeMap<TestdataName, FileStoreKey>;

impl JudgingPlan {
    /// Validate structural invariants (spec §3 Invariants): acyclic dependency graph, every
    /// weight budget ≤ 100, every referenced testdata filename present in `manifest`.
    ///
    /// Returns every violation found, not just the first (SPEC_FULL §16 diagnostics).
    pub fn validate(&self, manifest: &TestdataManifest) -> Vec<Diagnostic> {
        let mut errors = Vec::new();

        if let Err(cycle) = topo_order(&self.subtasks) {
            errors.push(
                Diagnostic::error("subtask dependency graph has a cycle")
                    .with_note(format!("cycle passes through subtask {cycle}")),
            );
        }

        check_weight_budget(
            self.subtasks.iter().map(|s| s.points),
            "subtask",
            &mut errors,
        );
        for (i, subtask) in self.subtasks.iter().enumerate() {
            check_weight_budget(
                subtask.testcases.iter().map(|t| t.weight),
                &format!("subtask {i} testcase"),
                &mut errors,
            );
            for dep in &subtask.dependencies {
                if *dep >= self.subtasks.len() {
                    errors.push(Diagnostic::error(format!(
                        "subtask {i} depends on out-of-range subtask {dep}"
                    )));
                }
            }
            for testcase in &subtask.testcases {
                check_testdata_ref(&testcase.input, manifest, &mut errors);
                check_testdata_ref(&testcase.output, manifest, &mut errors);
            }
        }
        for sample in &self.samples {
            check_testdata_ref(&sample.input, manifest, &mut errors);
            check_testdata_ref(&sample.output, manifest, &mut errors);
        }

        errors
    }
}

fn check_testdata_ref(name: &Option<TestdataName>, manifest: &TestdataManifest, errors: &mut Vec<Diagnostic>) {
    if let Some(name) = name {
        if !manifest.contains_key(name) {
            errors.push(
                Diagnostic::error(format!("testdata file {name:?} is not in the manifest"))
                    .with_help("check the submission's testdata manifest was built from the same problem version"),
            );
        }
    }
}

fn check_weight_budget(weights: impl Iterator<Item = Option<f64>> + Clone, what: &str, errors: &mut Vec<Diagnostic>) {
    let total: f64 = weights.clone().flatten().sum();
    if total > 100.0 + 1e-9 {
        errors.push(Diagnostic::error(format!(
            "{what} weights sum to {total}, exceeding 100"
        )));
    }
}

/// Resolve the weight of every subtask, auto-distributing the residual of 100 equally among
/// those left unspecified (spec §3 Invariants, §4.F).
pub fn distribute_weights(weights: &[Option<f64>]) -> Vec<f64> {
    let specified: f64 = weights.iter().flatten().sum();
    let unspecified = weights.iter().filter(|w| w.is_none()).count();
    let residual = (100.0 - specified).max(0.0);
    let share = if unspecified > 0 {
        residual / unspecified as f64
    } else {
        0.0
    };
    weights.iter().map(|w| w.unwrap_or(share)).collect()
}

/// Topologically sort subtask indices by `dependencies`, breaking ties by original index (spec
/// §5 "deterministic within ties by original index"). Returns the index of a subtask
/// participating in a cycle as `Err`, if any.
pub fn topo_order(subtasks: &[Subtask]) -> Result<Vec<SubtaskId>, SubtaskId> {
    let n = subtasks.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<SubtaskId>> = vec![Vec::new(); n];
    for (i, subtask) in subtasks.iter().enumerate() {
        for &dep in &subtask.dependencies {
            if dep < n {
                in_degree[i] += 1;
                dependents[dep].push(i);
            }
        }
    }
    let mut ready: std::collections::BTreeSet<SubtaskId> =
        (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    if order.len() != n {
        let stuck = (0..n).find(|i| !order.contains(i)).unwrap();
        return Err(stuck);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtask(deps: &[usize]) -> Subtask {
        Subtask {
            limits: None,
            scoring_type: ScoringType::Sum,
            points: None,
            dependencies: deps.to_vec(),
            testcases: vec![],
            checker: None,
            interactor: None,
            extra_source_files: Default::default(),
        }
    }

    #[test]
    fn topo_order_respects_dependencies() {
        let subtasks = vec![subtask(&[]), subtask(&[0]), subtask(&[0, 1])];
        let order = topo_order(&subtasks).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn topo_order_detects_cycle() {
        let subtasks = vec![subtask(&[1]), subtask(&[0])];
        assert!(topo_order(&subtasks).is_err());
    }

    #[test]
    fn unspecified_weights_share_the_residual_equally() {
        let weights = distribute_weights(&[Some(40.0), None, None]);
        assert_eq!(weights, vec![40.0, 30.0, 30.0]);
    }

    #[test]
    fn all_unspecified_weights_sum_to_100() {
        let weights = distribute_weights(&[None, None, None, None]);
        assert!((weights.iter().sum::<f64>() - 100.0).abs() < 1e-9);
    }
}
