use std::sync::Arc;

use crate::core::config::Settings;
use crate::repositories::submissions::SubmissionStore;
use crate::services::grader::AnswerKey;

/// Shared state of the grading stub server.
#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: SubmissionStore,
    answer_key: AnswerKey,
}

impl AppState {
    pub(crate) fn new(settings: Settings, store: SubmissionStore, answer_key: AnswerKey) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, answer_key }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &SubmissionStore {
        &self.inner.store
    }

    pub(crate) fn answer_key(&self) -> &AnswerKey {
        &self.inner.answer_key
    }
}
