use serde::{Deserialize, Serialize};
use validator::Validate;

/// Test id used for ad-hoc practice submissions outside a formal test.
pub(crate) const PRACTICE_TEST_ID: i64 = 0;

/// Body of `POST /api/submit_solution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SubmitSolutionResponse {
    pub(crate) submission_id: i64,
    #[serde(default)]
    pub(crate) message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) problem_id: Option<i64>,
    #[serde(default)]
    pub(crate) image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) images_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) images_requested: Option<usize>,
}

/// Body of `POST /api/grade_submission/{id}`. Clients must not rely on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GradeSubmissionResponse {
    pub(crate) submission_id: i64,
    pub(crate) message: String,
}

/// One record of `GET /api/submission/{id}/results`.
///
/// Immutable once produced. A submission id can carry records for several
/// problems, so consumers select by `problem_id`. Records carry no timestamp or
/// revision: when one problem appears twice, only the backend's list order
/// tells which is newer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GradingResult {
    pub(crate) problem_id: i64,
    #[serde(default)]
    pub(crate) answer_is_correct: bool,
    #[serde(default)]
    pub(crate) answer_confidence: f64,
    #[serde(default)]
    pub(crate) logical_flow_score: f64,
    #[serde(default)]
    pub(crate) percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) first_error_step_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) hint_provided: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) final_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SubmissionStatus {
    Pending,
    Processing,
    Graded,
}

/// Scalar form fields of a solution upload, validated before any image is stored.
#[derive(Debug, Clone, Validate)]
pub(crate) struct SubmitSolutionFields {
    #[validate(range(min = 0, message = "test_id must be non-negative"))]
    pub(crate) test_id: i64,
    #[validate(range(min = 1, message = "problem_id must be positive"))]
    pub(crate) problem_id: i64,
    #[validate(length(min = 1, message = "student_id must not be empty"))]
    pub(crate) student_id: String,
    pub(crate) student_answer: Option<String>,
}
