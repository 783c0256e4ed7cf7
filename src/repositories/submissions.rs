use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::schemas::submission::{GradingResult, SubmissionStatus, PRACTICE_TEST_ID};

/// Practice sessions get their own test ids, far away from real tests.
const PRACTICE_TEST_ID_BASE: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubmissionRecord {
    pub(crate) submission_id: i64,
    pub(crate) test_id: i64,
    pub(crate) student_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProblemSubmission {
    pub(crate) submission_id: i64,
    pub(crate) problem_id: i64,
    pub(crate) image_refs: Vec<String>,
    pub(crate) student_answer: Option<String>,
    pub(crate) uploaded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StoreStats {
    pub(crate) submissions: usize,
    pub(crate) problem_submissions: usize,
    pub(crate) results: usize,
}

#[derive(Default)]
struct StoreInner {
    last_submission_id: i64,
    practice_tests: HashMap<String, i64>,
    submissions: HashMap<i64, SubmissionRecord>,
    by_test_student: HashMap<(i64, String), i64>,
    problems: BTreeMap<(i64, i64), ProblemSubmission>,
    results: BTreeMap<(i64, i64), GradingResult>,
}

/// In-memory tables of the grading stub. Cloning shares the same data.
#[derive(Clone, Default)]
pub(crate) struct SubmissionStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl SubmissionStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Maps the practice sentinel to the student's practice test.
    pub(crate) async fn resolve_test_id(&self, test_id: i64, student_id: &str) -> i64 {
        if test_id != PRACTICE_TEST_ID {
            return test_id;
        }

        let mut inner = self.inner.write().await;
        let next = PRACTICE_TEST_ID_BASE + inner.practice_tests.len() as i64 + 1;
        *inner.practice_tests.entry(student_id.to_string()).or_insert(next)
    }

    /// Returns the submission for `(test_id, student_id)`, creating it when
    /// missing, and marks it as processing.
    pub(crate) async fn upsert_submission(&self, test_id: i64, student_id: &str) -> i64 {
        let mut inner = self.inner.write().await;
        let key = (test_id, student_id.to_string());

        if let Some(&submission_id) = inner.by_test_student.get(&key) {
            if let Some(record) = inner.submissions.get_mut(&submission_id) {
                record.status = SubmissionStatus::Processing;
            }
            return submission_id;
        }

        inner.last_submission_id += 1;
        let submission_id = inner.last_submission_id;
        inner.submissions.insert(
            submission_id,
            SubmissionRecord {
                submission_id,
                test_id,
                student_id: student_id.to_string(),
                status: SubmissionStatus::Processing,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        inner.by_test_student.insert(key, submission_id);
        submission_id
    }

    /// Replaces the images of one problem within a submission. The previous
    /// grade of that problem is dropped so it cannot be read back as the
    /// result of the new upload before regrading finishes.
    pub(crate) async fn upsert_problem_submission(&self, problem: ProblemSubmission) {
        let mut inner = self.inner.write().await;
        let key = (problem.submission_id, problem.problem_id);
        if inner.results.remove(&key).is_some() {
            tracing::debug!(
                submission_id = problem.submission_id,
                problem_id = problem.problem_id,
                "Dropped stale grade of resubmitted problem"
            );
        }
        inner.problems.insert(key, problem);
    }

    pub(crate) async fn submission(&self, submission_id: i64) -> Option<SubmissionRecord> {
        self.inner.read().await.submissions.get(&submission_id).cloned()
    }

    pub(crate) async fn problem_submissions(&self, submission_id: i64) -> Vec<ProblemSubmission> {
        let inner = self.inner.read().await;
        inner
            .problems
            .range((submission_id, i64::MIN)..=(submission_id, i64::MAX))
            .map(|(_, problem)| problem.clone())
            .collect()
    }

    pub(crate) async fn save_result(&self, submission_id: i64, result: GradingResult) {
        let mut inner = self.inner.write().await;
        inner.results.insert((submission_id, result.problem_id), result);
    }

    pub(crate) async fn mark_graded(&self, submission_id: i64) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.submissions.get_mut(&submission_id) {
            record.status = SubmissionStatus::Graded;
        }
    }

    /// Results of one submission ordered by problem id.
    pub(crate) async fn results(&self, submission_id: i64) -> Vec<GradingResult> {
        let inner = self.inner.read().await;
        inner
            .results
            .range((submission_id, i64::MIN)..=(submission_id, i64::MAX))
            .map(|(_, result)| result.clone())
            .collect()
    }

    pub(crate) async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        StoreStats {
            submissions: inner.submissions.len(),
            problem_submissions: inner.problems.len(),
            results: inner.results.len(),
        }
    }
}
