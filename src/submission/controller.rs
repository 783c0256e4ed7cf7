use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::errors::{SubmissionError, TransientPollError, UploadStage};
use super::session::{
    PollOutcome, PollPolicy, ProblemContext, SessionHandle, SessionPhase, SubmissionView,
    UploadLimits,
};
use super::token::SessionCounter;
use crate::core::metrics;
use crate::schemas::submission::GradingResult;
use crate::services::grading_client::{
    BackendError, GradingBackend, ImageUpload, SolutionUpload,
};
use crate::services::image_files;

/// Returned by a successful `submit`; grading continues in the background.
#[derive(Debug)]
pub(crate) struct SubmitReceipt {
    pub(crate) submission_id: i64,
    pub(crate) poll: JoinHandle<PollOutcome>,
}

/// Drives the submit -> grade -> poll -> display cycle of one submission dialog.
///
/// All view mutations happen inside the watch channel's lock after the session
/// token has been re-checked, and `open_submission`/`close_submission` advance
/// the token under the same lock. A session that lost the race therefore never
/// writes over the state of a newer one.
#[derive(Clone)]
pub(crate) struct SubmissionController {
    backend: Arc<dyn GradingBackend>,
    counter: Arc<SessionCounter>,
    view: Arc<watch::Sender<SubmissionView>>,
    policy: PollPolicy,
    limits: UploadLimits,
    student_id: String,
}

impl SubmissionController {
    pub(crate) fn new(
        backend: Arc<dyn GradingBackend>,
        student_id: impl Into<String>,
        policy: PollPolicy,
        limits: UploadLimits,
    ) -> Self {
        let (view, _) = watch::channel(SubmissionView::closed(0));
        Self {
            backend,
            counter: Arc::new(SessionCounter::new()),
            view: Arc::new(view),
            policy,
            limits,
            student_id: student_id.into(),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SubmissionView> {
        self.view.subscribe()
    }

    pub(crate) fn view(&self) -> SubmissionView {
        self.view.borrow().clone()
    }

    pub(crate) fn is_current(&self, session: &SessionHandle) -> bool {
        self.counter.is_current(session.token)
    }

    pub(crate) fn session_phase(&self, session: &SessionHandle) -> SessionPhase {
        let view = self.view.borrow();
        if !self.counter.is_current(session.token) || view.token != session.token {
            return SessionPhase::Cancelled;
        }
        view.phase
    }

    /// Starts a fresh session for `problem`, cancelling whatever was live.
    pub(crate) fn open_submission(&self, problem: ProblemContext) -> SessionHandle {
        let mut token = 0;
        self.view.send_modify(|view| {
            token = self.counter.advance();
            *view = SubmissionView::opened(token, problem);
        });

        tracing::debug!(
            token,
            test_id = problem.test_id,
            problem_id = problem.problem_id,
            practice = problem.is_practice(),
            "Opened submission session"
        );

        SessionHandle { token, problem }
    }

    /// Cancels the live session unconditionally and clears the displayed result.
    pub(crate) fn close_submission(&self, session: &SessionHandle) {
        let mut token = 0;
        self.view.send_modify(|view| {
            token = self.counter.advance();
            *view = SubmissionView::closed(token);
        });

        tracing::debug!(closed = session.token, token, "Closed submission session");
    }

    /// Uploads `files`, asks the backend to grade them and starts polling.
    ///
    /// Returns once grading has been requested; the poll loop runs on the tokio
    /// runtime and its outcome is available through the receipt and the view.
    pub(crate) async fn submit(
        &self,
        session: &SessionHandle,
        files: Vec<ImageUpload>,
        student_answer: Option<String>,
    ) -> Result<SubmitReceipt, SubmissionError> {
        if let Err(err) = self.validate_files(&files) {
            self.update_if_current(session.token, |view| {
                if view.phase.is_busy() {
                    return false;
                }
                view.error = Some(err.to_string());
                true
            });
            return Err(err);
        }

        let file_names: Vec<String> = files.iter().map(|file| file.file_name.clone()).collect();
        let mut busy = false;
        let started = self.update_if_current(session.token, |view| {
            if view.phase.is_busy() {
                busy = true;
                return false;
            }
            view.phase = SessionPhase::Submitting;
            view.selected_files = file_names;
            view.submission_id = None;
            view.result = None;
            view.error = None;
            view.poll_attempts = 0;
            view.settled_at = None;
            true
        });
        if busy {
            return Err(SubmissionError::InProgress);
        }
        if !started {
            return Err(SubmissionError::Cancelled);
        }

        let problem = session.problem;
        let upload = SolutionUpload {
            test_id: problem.test_id,
            problem_id: problem.problem_id,
            student_id: self.student_id.clone(),
            student_answer,
            images: files,
        };

        let submission_id = match self.backend.submit_solution(upload).await {
            Ok(response) => response.submission_id,
            Err(source) => {
                return Err(self.fail_submission(session, UploadStage::Upload, source));
            }
        };
        metrics::record_upload("uploaded");

        if !self.update_if_current(session.token, |view| {
            view.submission_id = Some(submission_id);
            true
        }) {
            tracing::debug!(token = session.token, submission_id, "Upload finished after cancel");
            return Err(SubmissionError::Cancelled);
        }

        if let Err(source) = self.backend.grade_submission(submission_id).await {
            return Err(self.fail_submission(session, UploadStage::GradeTrigger, source));
        }

        if !self.update_if_current(session.token, |view| {
            view.phase = SessionPhase::Polling;
            view.poll_active = true;
            true
        }) {
            return Err(SubmissionError::Cancelled);
        }

        tracing::info!(
            token = session.token,
            submission_id,
            problem_id = problem.problem_id,
            "Solution submitted; waiting for grading"
        );

        let controller = self.clone();
        let handle = session.clone();
        let poll = tokio::spawn(async move {
            controller.run_poll_loop(&handle, submission_id, problem.problem_id).await
        });

        Ok(SubmitReceipt { submission_id, poll })
    }

    /// Waits for the grading result of an existing submission.
    ///
    /// Fails with `InProgress` if this session is already polling.
    pub(crate) async fn poll_for_result(
        &self,
        session: &SessionHandle,
        submission_id: i64,
        problem_id: i64,
    ) -> Result<PollOutcome, SubmissionError> {
        let mut busy = false;
        let claimed = self.update_if_current(session.token, |view| {
            if view.phase.is_busy() {
                busy = true;
                return false;
            }
            view.phase = SessionPhase::Polling;
            view.poll_active = true;
            view.submission_id = Some(submission_id);
            view.result = None;
            view.error = None;
            view.poll_attempts = 0;
            view.settled_at = None;
            true
        });
        if busy {
            return Err(SubmissionError::InProgress);
        }
        if !claimed {
            return Ok(PollOutcome::Cancelled);
        }

        Ok(self.run_poll_loop(session, submission_id, problem_id).await)
    }

    async fn run_poll_loop(
        &self,
        session: &SessionHandle,
        submission_id: i64,
        problem_id: i64,
    ) -> PollOutcome {
        for attempt in 1..=self.policy.max_attempts {
            tokio::time::sleep(self.policy.interval).await;

            if !self.is_current(session) {
                return self.cancelled(session, submission_id);
            }

            metrics::record_poll_attempt();
            let fetched = self.backend.fetch_results(submission_id).await;

            if !self.is_current(session) {
                return self.cancelled(session, submission_id);
            }

            let mut poll_error = None;
            match fetched {
                Ok(results) => {
                    if let Some(result) = select_result(results, problem_id) {
                        return self.settle_success(session, submission_id, attempt, result);
                    }
                    tracing::debug!(submission_id, problem_id, attempt, "No matching result yet");
                }
                Err(source) => {
                    let err = TransientPollError { attempt, source };
                    tracing::warn!(submission_id, problem_id, error = %err, "Result poll failed");
                    poll_error = Some(err.to_string());
                }
            }

            if !self.update_if_current(session.token, |view| {
                view.poll_attempts = attempt;
                view.error = poll_error;
                true
            }) {
                return self.cancelled(session, submission_id);
            }
        }

        let settled = self.update_if_current(session.token, |view| {
            view.phase = SessionPhase::SettledTimeout;
            view.poll_active = false;
            view.error = None;
            view.settled_at = Some(OffsetDateTime::now_utc());
            true
        });
        if !settled {
            return self.cancelled(session, submission_id);
        }

        metrics::record_poll_settled("timed_out");
        tracing::info!(
            submission_id,
            problem_id,
            attempts = self.policy.max_attempts,
            "No grading result within poll budget"
        );
        PollOutcome::TimedOut
    }

    fn settle_success(
        &self,
        session: &SessionHandle,
        submission_id: i64,
        attempt: u32,
        result: GradingResult,
    ) -> PollOutcome {
        let published = result.clone();
        let settled = self.update_if_current(session.token, |view| {
            view.phase = SessionPhase::SettledSuccess;
            view.poll_active = false;
            view.poll_attempts = attempt;
            view.result = Some(published);
            view.error = None;
            view.settled_at = Some(OffsetDateTime::now_utc());
            true
        });
        if !settled {
            return self.cancelled(session, submission_id);
        }

        metrics::record_poll_settled("found");
        tracing::info!(
            submission_id,
            problem_id = result.problem_id,
            attempt,
            correct = result.answer_is_correct,
            percentage = result.percentage,
            "Grading result received"
        );
        PollOutcome::Found(result)
    }

    fn cancelled(&self, session: &SessionHandle, submission_id: i64) -> PollOutcome {
        metrics::record_poll_settled("cancelled");
        tracing::debug!(token = session.token, submission_id, "Discarding stale poll");
        PollOutcome::Cancelled
    }

    fn fail_submission(
        &self,
        session: &SessionHandle,
        stage: UploadStage,
        source: BackendError,
    ) -> SubmissionError {
        if !self.is_current(session) {
            tracing::debug!(
                token = session.token,
                stage = stage.as_str(),
                error = %source,
                "Dropping failure of a closed session"
            );
            return SubmissionError::Cancelled;
        }

        let err = SubmissionError::Upload { stage, source };
        metrics::record_upload("failed");
        tracing::error!(
            token = session.token,
            problem_id = session.problem.problem_id,
            error = %err,
            "Submission failed"
        );

        let message = err.to_string();
        self.update_if_current(session.token, |view| {
            view.phase = SessionPhase::Failed;
            view.poll_active = false;
            view.error = Some(message);
            true
        });
        err
    }

    fn validate_files(&self, files: &[ImageUpload]) -> Result<(), SubmissionError> {
        if files.is_empty() {
            return Err(SubmissionError::Validation(
                "Select at least one image of your solution".to_string(),
            ));
        }

        if files.len() > self.limits.max_images {
            return Err(SubmissionError::Validation(format!(
                "At most {} images can be submitted at once",
                self.limits.max_images
            )));
        }

        for file in files {
            image_files::check_extension(&file.file_name, &self.limits.allowed_extensions)
                .map_err(SubmissionError::Validation)?;

            if file.bytes.is_empty() {
                return Err(SubmissionError::Validation(format!(
                    "File '{}' is empty",
                    file.file_name
                )));
            }

            if file.bytes.len() as u64 > self.limits.max_image_bytes {
                return Err(SubmissionError::Validation(format!(
                    "File '{}' exceeds the {}MB limit",
                    file.file_name,
                    self.limits.max_image_bytes / (1024 * 1024)
                )));
            }
        }

        Ok(())
    }

    /// Applies `modify` only while `token` is still live. Returns whether the
    /// view was changed.
    fn update_if_current<F>(&self, token: u64, modify: F) -> bool
    where
        F: FnOnce(&mut SubmissionView) -> bool,
    {
        self.view.send_if_modified(|view| {
            if !self.counter.is_current(token) || view.token != token {
                return false;
            }
            modify(view)
        })
    }
}

/// Picks the record for `problem_id`; the same submission id may carry results
/// for several problems. With duplicate rows the last one wins, which is the
/// most recent only as long as the backend lists results in insertion order.
pub(crate) fn select_result(results: Vec<GradingResult>, problem_id: i64) -> Option<GradingResult> {
    results.into_iter().rev().find(|result| result.problem_id == problem_id)
}
