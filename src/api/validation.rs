use crate::api::errors::ApiError;
use crate::services::image_files;

pub(crate) fn validate_image_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    let extension =
        image_files::check_extension(filename, allowed_extensions).map_err(ApiError::BadRequest)?;

    let mime = content_type.trim().to_ascii_lowercase();
    if image_files::mime_allowed_for_extension(&mime, &extension) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}
