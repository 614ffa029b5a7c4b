//! Per-testcase result types (spec §3 "Testcase result").

use crate::error::Truncated;

/// Outcome of grading one testcase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TestcaseStatus {
    Accepted,
    WrongAnswer,
    PartiallyCorrect,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    OutputLimitExceeded,
    RuntimeError,
    FileError,
    JudgementFailed,
    /// The user program failed to compile (spec §7); terminal for the whole submission, never a
    /// per-testcase outcome.
    CompilationError,
    /// The judging plan, testdata manifest, or checker/interactor configuration was invalid
    /// (spec §7); terminal for the whole submission, never a per-testcase outcome.
    ConfigurationError,
}

impl TestcaseStatus {
    /// Whether this status represents the program terminating normally under its resource
    /// limits (the checker may still have scored it anything from 0 to 100).
    pub fn is_runtime_ok(&self) -> bool {
        matches!(
            self,
            TestcaseStatus::Accepted | TestcaseStatus::WrongAnswer | TestcaseStatus::PartiallyCorrect
        )
    }
}

/// Classify a checker score into the three runtime-ok statuses (spec §4.D/§8): 100 ⇒ Accepted,
/// 0 ⇒ WrongAnswer, anything in between ⇒ PartiallyCorrect.
pub fn classify_score(score: f64) -> TestcaseStatus {
    if score >= 100.0 - 1e-9 {
        TestcaseStatus::Accepted
    } else if score <= 1e-9 {
        TestcaseStatus::WrongAnswer
    } else {
        TestcaseStatus::PartiallyCorrect
    }
}

/// Full result of one testcase (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TestcaseResult {
    pub status: TestcaseStatus,
    /// Score in `[0, 100]`.
    pub score: f64,
    pub wall_time_ns: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub input: Option<Truncated>,
    pub output: Option<Truncated>,
    pub user_output: Option<Truncated>,
    pub user_stderr: Option<Truncated>,
    pub checker_message: Option<Truncated>,
    pub system_message: Option<Truncated>,
}

impl TestcaseResult {
    /// Build a result with just a status and score, the fields every runner can always fill in.
    pub fn new(status: TestcaseStatus, score: f64) -> Self {
        TestcaseResult {
            status,
            score,
            wall_time_ns: None,
            memory_bytes: None,
            input: None,
            output: None,
            user_output: None,
            user_stderr: None,
            checker_message: None,
            system_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_score_boundaries() {
        assert_eq!(classify_score(100.0), TestcaseStatus::Accepted);
        assert_eq!(classify_score(0.0), TestcaseStatus::WrongAnswer);
        assert_eq!(classify_score(50.0), TestcaseStatus::PartiallyCorrect);
    }
}
