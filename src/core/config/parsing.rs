use std::env;

use super::types::{ConfigError, Environment};

const DEFAULT_CORS_ORIGINS: &[&str] =
    &["http://localhost:5173", "http://localhost:3000", "http://127.0.0.1:5173"];

const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

/// Accepts a JSON array (`["a", "b"]`) or a comma separated list.
fn split_list(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(raw)
            .ok()
            .map(|items| items.into_iter().map(|item| item.trim().to_string()).collect());
    }

    Some(raw.split(',').map(|item| item.trim().to_string()).filter(|item| !item.is_empty()).collect())
}

pub(super) fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(default_cors_origins());
    };

    let origins = split_list(&raw).ok_or_else(|| ConfigError::InvalidCors(raw.clone()))?;
    if origins.is_empty() {
        return Ok(default_cors_origins());
    }
    Ok(origins)
}

/// Lower-cased extensions without a leading dot; `defaults` when unset.
pub(super) fn parse_extensions(
    value: Option<String>,
    defaults: &[&str],
) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(defaults.iter().map(|item| item.to_string()).collect());
    };

    let items = split_list(&raw).ok_or_else(|| ConfigError::InvalidValue {
        field: "ALLOWED_IMAGE_EXTENSIONS",
        value: raw.clone(),
    })?;

    Ok(items
        .into_iter()
        .map(|item| item.trim_start_matches('.').to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect())
}

pub(super) fn parse_bool(value: &str) -> bool {
    ["1", "true", "yes", "on"].iter().any(|truthy| value.trim().eq_ignore_ascii_case(truthy))
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    let normalized = value.map(|item| item.trim().to_ascii_lowercase()).unwrap_or_default();
    match normalized.as_str() {
        "production" | "prod" => Environment::Production,
        "staging" => Environment::Staging,
        "test" | "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn is_supported_image_extension(extension: &str) -> bool {
    SUPPORTED_IMAGE_EXTENSIONS.contains(&extension)
}

fn default_cors_origins() -> Vec<String> {
    DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect()
}
