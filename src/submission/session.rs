use std::time::Duration;

use time::macros::format_description;
use time::OffsetDateTime;

use crate::core::config::Settings;
use crate::schemas::submission::{GradingResult, PRACTICE_TEST_ID};

/// Which problem a submission dialog was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProblemContext {
    pub(crate) test_id: i64,
    pub(crate) problem_id: i64,
}

impl ProblemContext {
    pub(crate) fn new(test_id: i64, problem_id: i64) -> Self {
        Self { test_id, problem_id }
    }

    #[cfg(test)]
    pub(crate) fn practice(problem_id: i64) -> Self {
        Self { test_id: PRACTICE_TEST_ID, problem_id }
    }

    pub(crate) fn is_practice(&self) -> bool {
        self.test_id == PRACTICE_TEST_ID
    }
}

/// Handle returned by `open_submission`. Stale once another session is opened
/// or the dialog is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionHandle {
    pub(crate) token: u64,
    pub(crate) problem: ProblemContext,
}

/// `Idle -> Submitting -> Polling -> {SettledSuccess, SettledTimeout}`, with
/// `Failed` reachable from `Submitting` and `Cancelled` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionPhase {
    Idle,
    Submitting,
    Polling,
    SettledSuccess,
    SettledTimeout,
    Failed,
    Cancelled,
}

impl SessionPhase {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::SettledSuccess => "settled_success",
            Self::SettledTimeout => "settled_timeout",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::SettledSuccess | Self::SettledTimeout | Self::Failed | Self::Cancelled)
    }

    /// Phases in which `submit` is rejected as overlapping.
    pub(crate) fn is_busy(self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }
}

/// What the dialog currently displays. Only the live session may change it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubmissionView {
    pub(crate) token: u64,
    pub(crate) problem: Option<ProblemContext>,
    pub(crate) phase: SessionPhase,
    pub(crate) selected_files: Vec<String>,
    pub(crate) submission_id: Option<i64>,
    pub(crate) result: Option<GradingResult>,
    pub(crate) error: Option<String>,
    pub(crate) poll_attempts: u32,
    pub(crate) poll_active: bool,
    pub(crate) settled_at: Option<OffsetDateTime>,
}

impl SubmissionView {
    pub(crate) fn closed(token: u64) -> Self {
        Self {
            token,
            problem: None,
            phase: SessionPhase::Cancelled,
            selected_files: Vec::new(),
            submission_id: None,
            result: None,
            error: None,
            poll_attempts: 0,
            poll_active: false,
            settled_at: None,
        }
    }

    pub(crate) fn opened(token: u64, problem: ProblemContext) -> Self {
        Self { problem: Some(problem), phase: SessionPhase::Idle, ..Self::closed(token) }
    }

    /// One-line user-facing description of the current state.
    pub(crate) fn status_line(&self) -> String {
        match self.phase {
            SessionPhase::Idle => match &self.error {
                Some(error) => format!("Cannot submit: {error}"),
                None => "Select solution images to submit.".to_string(),
            },
            SessionPhase::Submitting => {
                format!("Uploading {} solution image(s)...", self.selected_files.len())
            }
            SessionPhase::Polling => {
                format!("Grading in progress (check {} so far)...", self.poll_attempts)
            }
            SessionPhase::SettledSuccess => match &self.result {
                Some(result) if result.answer_is_correct => {
                    format!("Correct! Score {:.0}%.", result.percentage)
                }
                Some(result) => format!("Not quite. Score {:.0}%.", result.percentage),
                None => "Graded.".to_string(),
            },
            SessionPhase::SettledTimeout => match self.settled_at.and_then(|at| {
                at.format(format_description!("[hour]:[minute]:[second]")).ok()
            }) {
                Some(at) => format!("Still processing: no result as of {at} UTC. Check back later."),
                None => "Still processing: the result is not available yet. Check back later."
                    .to_string(),
            },
            SessionPhase::Failed => format!(
                "Submission failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            SessionPhase::Cancelled => "Submission closed.".to_string(),
        }
    }
}

/// Terminal result of a poll loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PollOutcome {
    Found(GradingResult),
    /// No matching record within the attempt budget. Not an error.
    TimedOut,
    /// The session was superseded or closed; nothing was published.
    Cancelled,
}

impl PollOutcome {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollPolicy {
    pub(crate) interval: Duration,
    pub(crate) max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_millis(2000), max_attempts: 10 }
    }
}

impl PollPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.polling().interval(),
            max_attempts: settings.polling().max_attempts,
        }
    }
}

/// Client-side checks applied before an upload leaves the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadLimits {
    pub(crate) allowed_extensions: Vec<String>,
    pub(crate) max_images: usize,
    pub(crate) max_image_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            max_images: 10,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl UploadLimits {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let storage = settings.storage();
        Self {
            allowed_extensions: storage.allowed_image_extensions.clone(),
            max_images: usize::try_from(storage.max_images_per_submission).unwrap_or(usize::MAX),
            max_image_bytes: storage.max_upload_bytes(),
        }
    }
}
