use std::time::Duration;

use time::OffsetDateTime;

use crate::core::{metrics, state::AppState};
use crate::services::grader;

/// Grades every problem of `submission_id` after the configured delay, then
/// marks the submission as graded.
pub(crate) async fn run_grading(state: AppState, submission_id: i64) {
    let delay = Duration::from_millis(state.settings().stub().grading_delay_ms);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let Some(record) = state.store().submission(submission_id).await else {
        tracing::warn!(submission_id, "Submission disappeared before grading");
        return;
    };

    let problems = state.store().problem_submissions(submission_id).await;
    if problems.is_empty() {
        tracing::warn!(submission_id, "Nothing to grade");
        return;
    }

    for problem in &problems {
        let result = grader::grade_problem(
            state.answer_key(),
            problem.problem_id,
            problem.student_answer.as_deref(),
        );
        tracing::debug!(
            submission_id,
            problem_id = problem.problem_id,
            images = problem.image_refs.len(),
            uploaded_at = %problem.uploaded_at,
            correct = result.answer_is_correct,
            percentage = result.percentage,
            "Graded problem"
        );
        state.store().save_result(submission_id, result).await;
    }

    state.store().mark_graded(submission_id).await;
    metrics::record_grading_run(problems.len());
    let waited = OffsetDateTime::now_utc() - record.created_at;
    tracing::info!(
        submission_id = record.submission_id,
        test_id = record.test_id,
        student_id = %record.student_id,
        problems = problems.len(),
        since_created_ms = waited.whole_milliseconds() as i64,
        "Submission graded"
    );
}

pub(crate) fn spawn_grading(state: AppState, submission_id: i64) {
    tokio::spawn(run_grading(state, submission_id));
}
