use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::validation::validate_image_upload;
use crate::core::state::AppState;
use crate::repositories::submissions::ProblemSubmission;
use crate::schemas::submission::{
    GradeSubmissionResponse, GradingResult, SubmitSolutionFields, SubmitSolutionResponse,
};
use crate::services::image_files;
use crate::tasks::grading;

struct UploadedImage {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

pub(super) async fn submit_solution(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitSolutionResponse>, ApiError> {
    let storage = state.settings().storage();
    let max_bytes = storage.max_upload_bytes();

    let mut test_id: Option<String> = None;
    let mut problem_id: Option<String> = None;
    let mut student_id: Option<String> = None;
    let mut student_answer: Option<String> = None;
    let mut images: Vec<UploadedImage> = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image_files" => {
                let filename = field.file_name().unwrap_or("image.jpg").to_string();
                let content_type =
                    field.content_type().unwrap_or("application/octet-stream").to_string();

                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
                {
                    if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                        return Err(ApiError::PayloadTooLarge(format!(
                            "File size exceeds {}MB limit",
                            storage.max_upload_size_mb
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                images.push(UploadedImage { filename, content_type, bytes });
            }
            "test_id" | "problem_id" | "student_id" | "student_answer" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest(format!("Invalid {name}")))?;
                match name.as_str() {
                    "test_id" => test_id = Some(text),
                    "problem_id" => problem_id = Some(text),
                    "student_id" => student_id = Some(text),
                    _ => student_answer = Some(text).filter(|value| !value.trim().is_empty()),
                }
            }
            _ => {}
        }
    }

    let fields = SubmitSolutionFields {
        test_id: parse_id("test_id", test_id)?,
        problem_id: parse_id("problem_id", problem_id)?,
        student_id: student_id
            .map(|value| value.trim().to_string())
            .ok_or_else(|| ApiError::BadRequest("student_id is required".to_string()))?,
        student_answer,
    };
    fields.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if images.is_empty() {
        return Err(ApiError::BadRequest("At least one image file is required".to_string()));
    }
    let max_images = storage.max_images_per_submission as usize;
    if images.len() > max_images {
        return Err(ApiError::BadRequest(format!(
            "Maximum number of images per submission exceeded ({max_images})"
        )));
    }
    for image in &images {
        validate_image_upload(
            &image.filename,
            &image.content_type,
            &storage.allowed_image_extensions,
        )?;
        if image.bytes.is_empty() {
            return Err(ApiError::BadRequest(format!("File '{}' is empty", image.filename)));
        }
    }

    let store = state.store();
    let test_id = store.resolve_test_id(fields.test_id, &fields.student_id).await;
    let submission_id = store.upsert_submission(test_id, &fields.student_id).await;

    let image_refs: Vec<String> = images
        .iter()
        .map(|image| {
            format!(
                "memory://submissions/{submission_id}/{}_{}",
                Uuid::new_v4(),
                image_files::sanitized_filename(&image.filename)
            )
        })
        .collect();

    store
        .upsert_problem_submission(ProblemSubmission {
            submission_id,
            problem_id: fields.problem_id,
            image_refs: image_refs.clone(),
            student_answer: fields.student_answer,
            uploaded_at: OffsetDateTime::now_utc(),
        })
        .await;

    tracing::info!(
        submission_id,
        test_id,
        problem_id = fields.problem_id,
        student_id = %fields.student_id,
        images = images.len(),
        "Solution uploaded"
    );

    Ok(Json(SubmitSolutionResponse {
        submission_id,
        message: format!("Upload received. {} image(s) processed successfully.", images.len()),
        problem_id: Some(fields.problem_id),
        images_processed: Some(image_refs.len()),
        images_requested: Some(images.len()),
        image_urls: image_refs,
    }))
}

pub(super) async fn grade_submission(
    Path(submission_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<GradeSubmissionResponse>, ApiError> {
    if state.store().problem_submissions(submission_id).await.is_empty() {
        return Err(ApiError::NotFound("No problem submissions found".to_string()));
    }

    grading::spawn_grading(state.clone(), submission_id);
    tracing::info!(submission_id, "Grading scheduled");

    Ok(Json(GradeSubmissionResponse {
        submission_id,
        message: "Grading started".to_string(),
    }))
}

pub(super) async fn get_results(
    Path(submission_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Vec<GradingResult>> {
    Json(state.store().results(submission_id).await)
}

fn parse_id(field: &'static str, value: Option<String>) -> Result<i64, ApiError> {
    let value = value.ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))?;
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("{field} must be a valid integer")))
}
