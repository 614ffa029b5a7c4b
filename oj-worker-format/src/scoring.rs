//! Scoring engine (spec §4.F, component F): subtask topological order, weight distribution,
//! scoring modes, sample gating.

use std::future::Future;

use oj_worker_dag::ExecutionLimits;

use crate::plan::{distribute_weights, topo_order, JudgingPlan, ProblemType, ScoringType, SubtaskId, Testcase, TestcaseId};
use crate::result::TestcaseResult;

/// Either a finished testcase result, or `Skipped` (spec §3 "Testcase result", §4.F short-circuit).
#[derive(Debug, Clone)]
pub enum TestcaseOutcome {
    Finished(TestcaseResult),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct SubtaskScore {
    pub score: f64,
    pub full_score: f64,
    pub testcases: Vec<TestcaseOutcome>,
}

#[derive(Debug, Clone)]
pub struct ScoringResult {
    /// Whether the sample phase ran and failed (spec §4.F: on any non-Accepted sample, every
    /// subtask is skipped).
    pub samples_failed: bool,
    pub subtasks: Vec<SubtaskScore>,
    /// `Σ subtaskScore·subtaskWeight/100`, rounded and clamped to 100 (spec §4.F).
    pub final_score: f64,
    /// First non-Accepted status observed, by declaration order (spec §4.F); `None` if every
    /// testcase was Accepted.
    pub first_non_accepted: Option<crate::result::TestcaseStatus>,
}

/// Drives spec §4.F's algorithm: evaluates the sample phase, then walks subtasks in topological
/// order, running testcases through `run_testcase` (spec component E, invoked per testcase) and
/// combining their scores per each subtask's `scoringType`.
///
/// `run_testcase` and `run_sample` are cloned once per call rather than borrowed, so each
/// testcase's execution can be spawned onto its own task and truly overlap within a `Sum`
/// subtask — concurrency is still bounded by the task-slot scheduler (component C) underneath.
pub async fn evaluate_plan<F, FS, FutF, FutS>(
    plan: &JudgingPlan,
    problem_type: ProblemType,
    run_testcase: F,
    run_sample: FS,
) -> ScoringResult
where
    F: Fn(SubtaskId, TestcaseId, Testcase, ExecutionLimits) -> FutF + Clone + Send + Sync + 'static,
    FutF: Future<Output = TestcaseResult> + Send + 'static,
    FS: Fn(TestcaseId, Testcase, ExecutionLimits) -> FutS + Clone + Send + Sync + 'static,
    FutS: Future<Output = TestcaseResult> + Send + 'static,
{
    // Sample-failure short-circuit is for non-submit-answer problems only: a submit-answer
    // problem has no user program running against the samples in the first place.
    let samples_failed = if problem_type != ProblemType::SubmitAnswer
        && plan.run_samples
        && !plan.samples.is_empty()
    {
        run_sample_phase(plan, run_sample).await
    } else {
        false
    };

    let subtask_weights = distribute_weights(&plan.subtasks.iter().map(|s| s.points).collect::<Vec<_>>());
    let order = topo_order(&plan.subtasks).unwrap_or_else(|_| (0..plan.subtasks.len()).collect());

    let mut subtask_scores: Vec<Option<SubtaskScore>> = vec![None; plan.subtasks.len()];

    for &subtask_id in &order {
        let subtask = &plan.subtasks[subtask_id];
        let dependency_failed = subtask
            .dependencies
            .iter()
            .any(|&dep| matches!(&subtask_scores[dep], Some(s) if s.score <= 1e-9));

        if samples_failed || dependency_failed {
            let testcases = vec![TestcaseOutcome::Skipped; subtask.testcases.len()];
            subtask_scores[subtask_id] = Some(SubtaskScore {
                score: 0.0,
                full_score: subtask_weights[subtask_id],
                testcases,
            });
            continue;
        }

        let effective_limits = ExecutionLimits::coalesce(None, subtask.limits, plan.default_limits);
        let testcase_weights =
            distribute_weights(&subtask.testcases.iter().map(|t| t.weight).collect::<Vec<_>>());

        let outcome = match subtask.scoring_type {
            ScoringType::Sum => {
                run_sum_subtask(subtask_id, subtask, &testcase_weights, effective_limits, run_testcase.clone()).await
            }
            ScoringType::GroupMin => {
                run_serial_subtask(
                    subtask_id,
                    subtask,
                    effective_limits,
                    run_testcase.clone(),
                    100.0,
                    |acc, score| acc.min(score),
                )
                .await
            }
            ScoringType::GroupMul => {
                run_serial_subtask(
                    subtask_id,
                    subtask,
                    effective_limits,
                    run_testcase.clone(),
                    100.0,
                    |acc, score| acc * score / 100.0,
                )
                .await
            }
        };

        subtask_scores[subtask_id] = Some(SubtaskScore {
            score: outcome.0,
            full_score: subtask_weights[subtask_id],
            testcases: outcome.1,
        });
    }

    let subtasks: Vec<SubtaskScore> = subtask_scores.into_iter().map(Option::unwrap).collect();

    let final_score = subtasks
        .iter()
        .map(|s| s.score * s.full_score / 100.0)
        .sum::<f64>()
        .round()
        .clamp(0.0, 100.0);

    let first_non_accepted = subtasks.iter().find_map(|s| {
        s.testcases.iter().find_map(|t| match t {
            TestcaseOutcome::Finished(r) if r.status != crate::result::TestcaseStatus::Accepted => {
                Some(r.status)
            }
            _ => None,
        })
    });

    ScoringResult {
        samples_failed,
        subtasks,
        final_score,
        first_non_accepted,
    }
}

async fn run_sample_phase<FS, FutS>(plan: &JudgingPlan, run_sample: FS) -> bool
where
    FS: Fn(TestcaseId, Testcase, ExecutionLimits) -> FutS,
    FutS: Future<Output = TestcaseResult>,
{
    for (i, sample) in plan.samples.iter().enumerate() {
        let limits = ExecutionLimits::coalesce(sample.limits, None, plan.default_limits);
        let result = run_sample(i, sample.clone(), limits).await;
        if result.status != crate::result::TestcaseStatus::Accepted {
            return true;
        }
    }
    false
}

async fn run_sum_subtask<F, FutF>(
    subtask_id: SubtaskId,
    subtask: &crate::plan::Subtask,
    testcase_weights: &[f64],
    limits: ExecutionLimits,
    run_testcase: F,
) -> (f64, Vec<TestcaseOutcome>)
where
    F: Fn(SubtaskId, TestcaseId, Testcase, ExecutionLimits) -> FutF + Clone + Send + Sync + 'static,
    FutF: Future<Output = TestcaseResult> + Send + 'static,
{
    let mut set = tokio::task::JoinSet::new();
    for (testcase_id, testcase) in subtask.testcases.iter().cloned().enumerate() {
        let testcase_limits = ExecutionLimits::coalesce(testcase.limits, Some(limits), limits);
        let run_testcase = run_testcase.clone();
        set.spawn(async move {
            let result = run_testcase(subtask_id, testcase_id, testcase, testcase_limits).await;
            (testcase_id, result)
        });
    }
    let mut results: Vec<Option<TestcaseResult>> = vec![None; subtask.testcases.len()];
    while let Some(joined) = set.join_next().await {
        let (testcase_id, result) = joined.expect("testcase task panicked");
        results[testcase_id] = Some(result);
    }
    let mut score = 0.0;
    let mut outcomes = Vec::with_capacity(results.len());
    for (result, weight) in results.into_iter().zip(testcase_weights) {
        let result = result.expect("every spawned testcase reports back");
        score += result.score * weight / 100.0;
        outcomes.push(TestcaseOutcome::Finished(result));
    }
    (score, outcomes)
}

async fn run_serial_subtask<F, FutF>(
    subtask_id: SubtaskId,
    subtask: &crate::plan::Subtask,
    limits: ExecutionLimits,
    run_testcase: F,
    start: f64,
    combine: impl Fn(f64, f64) -> f64,
) -> (f64, Vec<TestcaseOutcome>)
where
    F: Fn(SubtaskId, TestcaseId, Testcase, ExecutionLimits) -> FutF,
    FutF: Future<Output = TestcaseResult>,
{
    let mut score = start;
    let mut outcomes = Vec::with_capacity(subtask.testcases.len());
    let mut short_circuited = false;
    for (testcase_id, testcase) in subtask.testcases.iter().cloned().enumerate() {
        if short_circuited {
            outcomes.push(TestcaseOutcome::Skipped);
            continue;
        }
        let testcase_limits = ExecutionLimits::coalesce(testcase.limits, Some(limits), limits);
        let result = run_testcase(subtask_id, testcase_id, testcase, testcase_limits).await;
        score = combine(score, result.score);
        outcomes.push(TestcaseOutcome::Finished(result));
        if score <= 1e-9 {
            short_circuited = true;
        }
    }
    (score, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Subtask;
    use crate::result::{TestcaseResult, TestcaseStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn testcase() -> Testcase {
        Testcase {
            input: None,
            output: None,
            limits: None,
            weight: None,
            user_output_filename: None,
        }
    }

    fn plan_with(subtasks: Vec<Subtask>) -> JudgingPlan {
        JudgingPlan {
            default_limits: ExecutionLimits::new(1000, 256 << 20),
            run_samples: false,
            subtasks,
            samples: vec![],
            file_io: None,
        }
    }

    #[tokio::test]
    async fn group_min_short_circuits_after_zero() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subtask = Subtask {
            limits: None,
            scoring_type: ScoringType::GroupMin,
            points: Some(100.0),
            dependencies: vec![],
            testcases: vec![testcase(), testcase()],
            checker: None,
            interactor: None,
            extra_source_files: Default::default(),
        };
        let plan = plan_with(vec![subtask]);
        let calls2 = calls.clone();
        let result = evaluate_plan(
            &plan,
            ProblemType::Batch,
            move |_s, testcase_id, _t, _limits| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let score = if testcase_id == 0 { 0.0 } else { 100.0 };
                    TestcaseResult::new(crate::result::classify_score(score), score)
                }
            },
            |_i, _t, _limits| async { TestcaseResult::new(TestcaseStatus::Accepted, 100.0) },
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.subtasks[0].score, 0.0);
        assert!(matches!(result.subtasks[0].testcases[1], TestcaseOutcome::Skipped));
    }

    #[tokio::test]
    async fn dependency_skip_marks_all_testcases_skipped() {
        let s0 = Subtask {
            limits: None,
            scoring_type: ScoringType::Sum,
            points: Some(50.0),
            dependencies: vec![],
            testcases: vec![testcase()],
            checker: None,
            interactor: None,
            extra_source_files: Default::default(),
        };
        let s1 = Subtask {
            limits: None,
            scoring_type: ScoringType::Sum,
            points: Some(50.0),
            dependencies: vec![0],
            testcases: vec![testcase(), testcase()],
            checker: None,
            interactor: None,
            extra_source_files: Default::default(),
        };
        let plan = plan_with(vec![s0, s1]);
        let result = evaluate_plan(
            &plan,
            ProblemType::Batch,
            |_s, _t, _testcase, _limits| async { TestcaseResult::new(TestcaseStatus::WrongAnswer, 0.0) },
            |_i, _t, _limits| async { TestcaseResult::new(TestcaseStatus::Accepted, 100.0) },
        )
        .await;
        assert_eq!(result.final_score, 0.0);
        assert!(result.subtasks[1]
            .testcases
            .iter()
            .all(|t| matches!(t, TestcaseOutcome::Skipped)));
    }

    #[tokio::test]
    async fn submit_answer_is_exempt_from_sample_failure_short_circuit() {
        let subtask = Subtask {
            limits: None,
            scoring_type: ScoringType::Sum,
            points: Some(100.0),
            dependencies: vec![],
            testcases: vec![testcase()],
            checker: None,
            interactor: None,
            extra_source_files: Default::default(),
        };
        let mut plan = plan_with(vec![subtask]);
        plan.run_samples = true;
        plan.samples = vec![testcase()];
        let result = evaluate_plan(
            &plan,
            ProblemType::SubmitAnswer,
            |_s, _t, _testcase, _limits| async { TestcaseResult::new(TestcaseStatus::Accepted, 100.0) },
            |_i, _t, _limits| async { TestcaseResult::new(TestcaseStatus::WrongAnswer, 0.0) },
        )
        .await;
        assert!(!result.samples_failed);
        assert_eq!(result.final_score, 100.0);
    }
}
