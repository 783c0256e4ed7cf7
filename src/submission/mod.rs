//! Client side of the solution submission lifecycle.
//!
//! One [`SubmissionController`] backs one submission dialog. Each
//! `open_submission` call starts a new session and silently invalidates the
//! previous one; results of invalidated sessions are discarded at the next
//! token check instead of being displayed.

mod controller;
mod errors;
mod session;
mod token;


pub(crate) use controller::SubmissionController;
pub(crate) use errors::SubmissionError;
pub(crate) use session::{PollOutcome, PollPolicy, ProblemContext, SessionHandle, UploadLimits};
