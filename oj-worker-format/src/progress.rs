//! Progress snapshot format sent to the dispatcher (spec §6).

use std::collections::BTreeMap;

use crate::result::{TestcaseResult, TestcaseStatus};
use crate::testcase_hash::TestcaseHash;

/// Which phase of judging a submission is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressType {
    Preparing,
    Compiling,
    Running,
    Finished,
}

/// Compilation outcome reported as soon as it's known, regardless of the rest of judging.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompileProgress {
    pub success: bool,
    pub message: crate::error::Truncated,
}

/// One cell of the `{subtasks × testcases}` matrix (spec §4.G/§6).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TestcaseRef {
    Waiting,
    Running,
    Done { testcase_hash: TestcaseHash },
    /// Empty cell: the testcase was skipped (spec §6 "empty meaning Skipped").
    Skipped,
}

/// One subtask's row in the progress matrix.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubtaskProgress {
    pub score: f64,
    pub full_score: f64,
    pub testcases: Vec<TestcaseRef>,
}

/// A full progress snapshot, as sent via the dispatcher's `progress(taskMeta, snapshot)` message
/// (spec §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub progress_type: ProgressType,
    /// Final status, only meaningful once `progress_type == Finished`.
    pub status: Option<TestcaseStatus>,
    /// Final score in `[0, 100]`, only meaningful once `progress_type == Finished`.
    pub score: Option<f64>,
    pub compile: Option<CompileProgress>,
    /// Every finished testcase result seen so far, keyed by its testcase hash, so the dispatcher
    /// can dedupe equal results across retries (spec §4.G).
    pub testcase_result: BTreeMap<TestcaseHash, TestcaseResult>,
    pub samples: Vec<TestcaseRef>,
    pub subtasks: Vec<SubtaskProgress>,
}

impl ProgressSnapshot {
    /// Seed a `Running` snapshot with every cell `waiting` (spec §4.G "seed the progress with a
    /// matrix ... in the waiting state").
    pub fn seed_running(sample_count: usize, subtask_testcase_counts: &[(f64, usize)]) -> Self {
        ProgressSnapshot {
            progress_type: ProgressType::Running,
            status: None,
            score: None,
            compile: None,
            testcase_result: BTreeMap::new(),
            samples: vec![TestcaseRef::Waiting; sample_count],
            subtasks: subtask_testcase_counts
                .iter()
                .map(|&(full_score, count)| SubtaskProgress {
                    score: 0.0,
                    full_score,
                    testcases: vec![TestcaseRef::Waiting; count],
                })
                .collect(),
        }
    }

    pub fn preparing() -> Self {
        ProgressSnapshot {
            progress_type: ProgressType::Preparing,
            status: None,
            score: None,
            compile: None,
            testcase_result: BTreeMap::new(),
            samples: vec![],
            subtasks: vec![],
        }
    }

    /// Record a testcase transitioning to `running`, marking its cell.
    pub fn mark_running(&mut self, subtask: usize, testcase: usize) {
        self.subtasks[subtask].testcases[testcase] = TestcaseRef::Running;
    }

    /// Record a finished testcase result, storing it in the shared result map and pointing the
    /// cell at its hash.
    pub fn mark_done(&mut self, subtask: usize, testcase: usize, hash: TestcaseHash, result: TestcaseResult) {
        self.testcase_result.insert(hash, result);
        self.subtasks[subtask].testcases[testcase] = TestcaseRef::Done { testcase_hash: hash };
    }

    pub fn mark_skipped(&mut self, subtask: usize, testcase: usize) {
        self.subtasks[subtask].testcases[testcase] = TestcaseRef::Skipped;
    }

    /// Transition to `Finished` with the submission's final status/score.
    pub fn finish(&mut self, status: TestcaseStatus, score: f64) {
        self.progress_type = ProgressType::Finished;
        self.status = Some(status);
        self.score = Some(score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_running_fills_waiting_cells() {
        let snapshot = ProgressSnapshot::seed_running(2, &[(100.0, 3)]);
        assert_eq!(snapshot.samples.len(), 2);
        assert_eq!(snapshot.subtasks[0].testcases.len(), 3);
        assert!(snapshot.subtasks[0].testcases.iter().all(|t| *t == TestcaseRef::Waiting));
    }

    #[test]
    fn mark_done_records_result_and_points_cell_at_hash() {
        let mut snapshot = ProgressSnapshot::seed_running(0, &[(100.0, 1)]);
        let hash = TestcaseHash::compute(
            oj_worker_dag::ExecutionLimits::new(1000, 256 << 20),
            None,
            None,
            None,
            None,
        );
        let result = TestcaseResult::new(TestcaseStatus::Accepted, 100.0);
        snapshot.mark_done(0, 0, hash, result);
        assert!(snapshot.testcase_result.contains_key(&hash));
        assert_eq!(snapshot.subtasks[0].testcases[0], TestcaseRef::Done { testcase_hash: hash });
    }
}
