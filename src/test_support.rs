use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use tokio::sync::{oneshot, watch, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::repositories::submissions::SubmissionStore;
use crate::schemas::submission::{GradingResult, SubmitSolutionResponse};
use crate::services::grader::AnswerKey;
use crate::services::grading_client::{BackendError, GradingBackend, ImageUpload, SolutionUpload};
use crate::submission::{PollPolicy, SubmissionController, UploadLimits};

pub(crate) const TEST_STUDENT_ID: &str = "student-001";
pub(crate) const MULTIPART_BOUNDARY: &str = "tutor-test-boundary";

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<tokio::sync::Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(tokio::sync::Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("TUTOR_ENV", "test");
    std::env::set_var("TUTOR_STRICT_CONFIG", "0");
    std::env::set_var("TUTOR_API_BASE_URL", "http://127.0.0.1:8000");
    std::env::set_var("TUTOR_STUDENT_ID", TEST_STUDENT_ID);
    std::env::set_var("GRADING_STUB_HOST", "127.0.0.1");
    std::env::set_var("GRADING_STUB_PORT", "0");
    std::env::set_var("GRADING_STUB_DELAY_MS", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("TUTOR_POLL_INTERVAL_MS");
    std::env::remove_var("TUTOR_POLL_MAX_ATTEMPTS");
    std::env::remove_var("ALLOWED_IMAGE_EXTENSIONS");
    std::env::remove_var("MAX_IMAGES_PER_SUBMISSION");
    std::env::remove_var("GRADING_STUB_ANSWER_KEY");
}

pub(crate) async fn test_settings() -> Settings {
    let _guard = env_lock().await;
    set_test_env();
    Settings::load().expect("settings")
}

pub(crate) fn grading_result(problem_id: i64, correct: bool, percentage: f64) -> GradingResult {
    GradingResult {
        problem_id,
        answer_is_correct: correct,
        answer_confidence: if correct { 1.0 } else { 0.0 },
        logical_flow_score: if correct { 1.0 } else { 0.0 },
        percentage,
        first_error_step_index: (!correct).then_some(2),
        error_summary: (!correct).then(|| "Sign error in step 2".to_string()),
        hint_provided: (!correct).then(|| "Re-check the sign when expanding".to_string()),
        final_score: Some(percentage / 100.0),
    }
}

pub(crate) fn image(name: &str) -> ImageUpload {
    ImageUpload::new(name, format!("bytes-of-{name}").into_bytes())
}

pub(crate) fn status_error(status: u16, message: &str) -> BackendError {
    BackendError::Status { status, message: message.to_string() }
}

pub(crate) fn submit_response(submission_id: i64) -> SubmitSolutionResponse {
    SubmitSolutionResponse {
        submission_id,
        message: "Upload received".to_string(),
        problem_id: None,
        image_urls: Vec::new(),
        images_processed: None,
        images_requested: None,
    }
}

async fn wait_for_count(counter: &watch::Sender<usize>, count: usize) {
    let mut rx = counter.subscribe();
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|seen| *seen >= count))
        .await
        .expect("call count timeout")
        .expect("call counter closed");
}

/// Controller with the reference poll policy (2000 ms, 10 attempts).
pub(crate) fn controller(backend: Arc<FakeBackend>) -> SubmissionController {
    SubmissionController::new(
        backend,
        TEST_STUDENT_ID,
        PollPolicy::default(),
        UploadLimits::default(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendCall {
    Submit { test_id: i64, problem_id: i64, student_id: String, files: Vec<String> },
    Grade(i64),
    Fetch(i64),
}

enum ScriptedSubmit {
    Ready(Result<SubmitSolutionResponse, BackendError>),
    Gated(oneshot::Receiver<Result<SubmitSolutionResponse, BackendError>>),
}

enum ScriptedFetch {
    Ready(Result<Vec<GradingResult>, BackendError>),
    Gated(oneshot::Receiver<Result<Vec<GradingResult>, BackendError>>),
}

/// Scripted in-process backend. Unscripted fetches return an empty list.
pub(crate) struct FakeBackend {
    submits: Mutex<VecDeque<ScriptedSubmit>>,
    grades: Mutex<VecDeque<Result<(), BackendError>>>,
    fetches: Mutex<VecDeque<ScriptedFetch>>,
    calls: Mutex<Vec<BackendCall>>,
    fetch_count: watch::Sender<usize>,
    submit_count: watch::Sender<usize>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        let (fetch_count, _) = watch::channel(0);
        let (submit_count, _) = watch::channel(0);
        Arc::new(Self {
            submits: Mutex::new(VecDeque::new()),
            grades: Mutex::new(VecDeque::new()),
            fetches: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            fetch_count,
            submit_count,
        })
    }

    pub(crate) fn push_submit_ok(&self, submission_id: i64) {
        self.submits
            .lock()
            .expect("submits")
            .push_back(ScriptedSubmit::Ready(Ok(submit_response(submission_id))));
    }

    pub(crate) fn push_submit_err(&self, err: BackendError) {
        self.submits.lock().expect("submits").push_back(ScriptedSubmit::Ready(Err(err)));
    }

    /// The next upload blocks until the returned sender is used.
    pub(crate) fn push_submit_gated(
        &self,
    ) -> oneshot::Sender<Result<SubmitSolutionResponse, BackendError>> {
        let (tx, rx) = oneshot::channel();
        self.submits.lock().expect("submits").push_back(ScriptedSubmit::Gated(rx));
        tx
    }

    pub(crate) fn push_grade_err(&self, err: BackendError) {
        self.grades.lock().expect("grades").push_back(Err(err));
    }

    pub(crate) fn push_fetch(&self, results: Vec<GradingResult>) {
        self.fetches.lock().expect("fetches").push_back(ScriptedFetch::Ready(Ok(results)));
    }

    pub(crate) fn push_fetch_err(&self, err: BackendError) {
        self.fetches.lock().expect("fetches").push_back(ScriptedFetch::Ready(Err(err)));
    }

    /// The next fetch blocks until the returned sender is used.
    pub(crate) fn push_fetch_gated(
        &self,
    ) -> oneshot::Sender<Result<Vec<GradingResult>, BackendError>> {
        let (tx, rx) = oneshot::channel();
        self.fetches.lock().expect("fetches").push_back(ScriptedFetch::Gated(rx));
        tx
    }

    pub(crate) fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        *self.fetch_count.borrow()
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, BackendCall::Submit { .. })).count()
    }

    pub(crate) fn grade_calls(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, BackendCall::Grade(_))).count()
    }

    pub(crate) async fn wait_for_fetch_calls(&self, count: usize) {
        wait_for_count(&self.fetch_count, count).await;
    }

    pub(crate) async fn wait_for_submit_calls(&self, count: usize) {
        wait_for_count(&self.submit_count, count).await;
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().expect("calls").push(call);
    }
}

#[async_trait]
impl GradingBackend for FakeBackend {
    async fn submit_solution(
        &self,
        upload: SolutionUpload,
    ) -> Result<SubmitSolutionResponse, BackendError> {
        self.record(BackendCall::Submit {
            test_id: upload.test_id,
            problem_id: upload.problem_id,
            student_id: upload.student_id.clone(),
            files: upload.images.iter().map(|image| image.file_name.clone()).collect(),
        });
        self.submit_count.send_modify(|count| *count += 1);

        let next = self.submits.lock().expect("submits").pop_front();
        match next {
            Some(ScriptedSubmit::Ready(result)) => result,
            Some(ScriptedSubmit::Gated(rx)) => {
                rx.await.unwrap_or_else(|_| Err(status_error(599, "gate dropped")))
            }
            None => Err(status_error(500, "unscripted submit")),
        }
    }

    async fn grade_submission(&self, submission_id: i64) -> Result<(), BackendError> {
        self.record(BackendCall::Grade(submission_id));
        self.grades.lock().expect("grades").pop_front().unwrap_or(Ok(()))
    }

    async fn fetch_results(&self, submission_id: i64) -> Result<Vec<GradingResult>, BackendError> {
        self.record(BackendCall::Fetch(submission_id));
        self.fetch_count.send_modify(|count| *count += 1);

        let next = self.fetches.lock().expect("fetches").pop_front();
        match next {
            Some(ScriptedFetch::Ready(result)) => result,
            Some(ScriptedFetch::Gated(rx)) => {
                rx.await.unwrap_or_else(|_| Err(status_error(599, "gate dropped")))
            }
            None => Ok(Vec::new()),
        }
    }
}

pub(crate) fn stub_state(settings: Settings, answer_key: AnswerKey) -> AppState {
    AppState::new(settings, SubmissionStore::new(), answer_key)
}

pub(crate) fn stub_router(state: AppState) -> Router {
    api::router::router(state)
}

pub(crate) struct MultipartFile<'a> {
    pub(crate) name: &'a str,
    pub(crate) content_type: &'a str,
    pub(crate) bytes: &'a [u8],
}

pub(crate) fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    files: &[MultipartFile<'_>],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for file in files {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"image_files\"; filename=\"{}\"\r\n",
                file.name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"))
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).expect("request body")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
