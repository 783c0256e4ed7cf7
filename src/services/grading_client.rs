use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::Settings;
use crate::schemas::submission::{GradingResult, SubmitSolutionResponse};
use crate::services::image_files;

/// One solution photo selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageUpload {
    pub(crate) file_name: String,
    pub(crate) bytes: Vec<u8>,
}

impl ImageUpload {
    pub(crate) fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), bytes }
    }

    pub(crate) async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| "image.jpg".to_string());

        Ok(Self::new(file_name, bytes))
    }

    pub(crate) fn mime_type(&self) -> &'static str {
        image_files::extension_of(&self.file_name)
            .map(|ext| image_files::mime_for_extension(&ext))
            .unwrap_or("application/octet-stream")
    }
}

/// Everything `POST /api/submit_solution` needs.
#[derive(Debug, Clone)]
pub(crate) struct SolutionUpload {
    pub(crate) test_id: i64,
    pub(crate) problem_id: i64,
    pub(crate) student_id: String,
    pub(crate) student_answer: Option<String>,
    pub(crate) images: Vec<ImageUpload>,
}

#[derive(Debug, Error)]
pub(crate) enum BackendError {
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to reach backend: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

/// The grading backend as seen by the submission client.
#[async_trait]
pub(crate) trait GradingBackend: Send + Sync {
    async fn submit_solution(
        &self,
        upload: SolutionUpload,
    ) -> Result<SubmitSolutionResponse, BackendError>;

    /// Fire-and-forget from the caller's perspective; the body is not inspected.
    async fn grade_submission(&self, submission_id: i64) -> Result<(), BackendError>;

    async fn fetch_results(&self, submission_id: i64) -> Result<Vec<GradingResult>, BackendError>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpGradingBackend {
    client: Client,
    base_url: String,
}

impl HttpGradingBackend {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let backend = settings.backend();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(backend.connect_timeout_seconds))
            .timeout(Duration::from_secs(backend.request_timeout_seconds))
            .build()
            .context("Failed to build grading backend HTTP client")?;

        Ok(Self { client, base_url: backend.base_url.trim_end_matches('/').to_string() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, BackendError> {
        let status = response.status();
        let raw_body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(status, &raw_body),
            });
        }

        serde_json::from_str(&raw_body)
            .map_err(|err| BackendError::Decode(format!("{context}: {err}: {raw_body}")))
    }
}

#[async_trait]
impl GradingBackend for HttpGradingBackend {
    async fn submit_solution(
        &self,
        upload: SolutionUpload,
    ) -> Result<SubmitSolutionResponse, BackendError> {
        let mut form = Form::new()
            .text("test_id", upload.test_id.to_string())
            .text("problem_id", upload.problem_id.to_string())
            .text("student_id", upload.student_id.clone());

        if let Some(answer) = upload.student_answer.as_ref().filter(|value| !value.is_empty()) {
            form = form.text("student_answer", answer.clone());
        }

        let image_count = upload.images.len();
        for image in upload.images {
            let mime = image.mime_type();
            let part = Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(mime)
                .map_err(|err| BackendError::Decode(format!("invalid image MIME type: {err}")))?;
            form = form.part("image_files", part);
        }

        tracing::debug!(
            test_id = upload.test_id,
            problem_id = upload.problem_id,
            images = image_count,
            "Uploading solution images"
        );

        let response =
            self.client.post(self.endpoint("submit_solution")).multipart(form).send().await?;

        Self::read_json(response, "submit_solution").await
    }

    async fn grade_submission(&self, submission_id: i64) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.endpoint(&format!("grade_submission/{submission_id}")))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let raw_body = response.text().await.unwrap_or_default();
        Err(BackendError::Status { status: status.as_u16(), message: error_message(status, &raw_body) })
    }

    async fn fetch_results(&self, submission_id: i64) -> Result<Vec<GradingResult>, BackendError> {
        let response = self
            .client
            .get(self.endpoint(&format!("submission/{submission_id}/results")))
            .send()
            .await?;

        Self::read_json(response, "submission results").await
    }
}

/// Server `detail` when the body is JSON, else the raw text, else the status text.
pub(crate) fn error_message(status: StatusCode, raw_body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<Value>(raw_body) {
        if let Some(detail) = detail_message(&payload) {
            return detail;
        }
    }

    let trimmed = raw_body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status.canonical_reason().unwrap_or("request failed").to_string()
}

fn detail_message(payload: &Value) -> Option<String> {
    let detail = payload.get("detail")?;
    if let Some(text) = detail.as_str() {
        return Some(text.to_string());
    }

    // FastAPI-style validation errors: [{"loc": [...], "msg": "..."}]
    let items = detail.as_array()?;
    let joined = items
        .iter()
        .filter_map(|item| {
            item.get("msg")
                .and_then(Value::as_str)
                .or_else(|| item.get("message").and_then(Value::as_str))
        })
        .collect::<Vec<_>>()
        .join("; ");

    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_detail() {
        let body = r#"{"status": 400, "detail": "At least one image file is required"}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body),
            "At least one image file is required"
        );
    }

    #[test]
    fn error_message_joins_validation_details() {
        let body = r#"{"detail": [{"loc": ["body", "test_id"], "msg": "field required"},
                                  {"loc": ["body", "problem_id"], "msg": "value is not a valid integer"}]}"#;
        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, body),
            "field required; value is not a valid integer"
        );
    }

    #[test]
    fn error_message_falls_back_to_text_then_status() {
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream exploded\n"), "upstream exploded");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, r#"{"error": "x"}"#), r#"{"error": "x"}"#);
        assert_eq!(error_message(StatusCode::SERVICE_UNAVAILABLE, "  "), "Service Unavailable");
    }

    #[test]
    fn image_upload_guesses_mime_from_extension() {
        assert_eq!(ImageUpload::new("page.PNG", vec![1]).mime_type(), "image/png");
        assert_eq!(ImageUpload::new("page", vec![1]).mime_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn image_upload_reads_file_name_and_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("solution.jpg");
        tokio::fs::write(&path, b"jpeg-bytes").await.expect("write image");

        let image = ImageUpload::from_path(&path).await.expect("read image");
        assert_eq!(image.file_name, "solution.jpg");
        assert_eq!(image.bytes, b"jpeg-bytes".to_vec());
    }
}
