mod handlers;

use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};

use crate::core::config::Settings;
use crate::core::state::AppState;

/// Multipart framing allowance on top of the raw image bytes.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub(crate) fn router(settings: &Settings) -> Router<AppState> {
    let storage = settings.storage();
    let body_limit = storage.max_upload_bytes() * storage.max_images_per_submission
        + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route(
            "/submit_solution",
            post(handlers::submit_solution)
                .layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX))),
        )
        .route("/grade_submission/:submission_id", post(handlers::grade_submission))
        .route("/submission/:submission_id/results", get(handlers::get_results))
}
