use thiserror::Error;

use crate::services::grading_client::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadStage {
    Upload,
    GradeTrigger,
}

impl UploadStage {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::GradeTrigger => "grade_trigger",
        }
    }
}

/// Failures reported by [`super::SubmissionController`] operations.
///
/// Every variant is also reflected in the session's displayed state, so callers
/// may ignore the value and render the view instead.
#[derive(Debug, Error)]
pub(crate) enum SubmissionError {
    /// Rejected before any network call.
    #[error("{0}")]
    Validation(String),
    /// Terminal for the session; the user has to submit again.
    #[error("{} failed: {source}", .stage.as_str())]
    Upload {
        stage: UploadStage,
        #[source]
        source: BackendError,
    },
    #[error("a submission is already in progress for this session")]
    InProgress,
    #[error("session is no longer active")]
    Cancelled,
}

/// A single failed result fetch. Logged and retried on the next tick.
#[derive(Debug, Error)]
#[error("poll attempt {attempt} failed: {source}")]
pub(crate) struct TransientPollError {
    pub(crate) attempt: u32,
    #[source]
    pub(crate) source: BackendError,
}
