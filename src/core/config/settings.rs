use std::time::Duration;

use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_bool, parse_cors_origins,
    parse_environment, parse_extensions, parse_u32, parse_u64,
};
use super::types::{
    BackendSettings, ConfigError, CorsSettings, PollSettings, RuntimeSettings, ServerHost,
    ServerPort, ServerSettings, Settings, StorageSettings, StubSettings, StudentSettings,
    TelemetrySettings,
};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADING_STUB_HOST", "0.0.0.0");
        let port = env_or_default("GRADING_STUB_PORT", "8000");

        let environment =
            parse_environment(env_optional("TUTOR_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("TUTOR_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let explicit_base_url = env_optional("TUTOR_API_BASE_URL");
        let base_url = explicit_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let connect_timeout_seconds = parse_u64(
            "TUTOR_CONNECT_TIMEOUT_SECONDS",
            env_or_default("TUTOR_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;
        let request_timeout_seconds = parse_u64(
            "TUTOR_REQUEST_TIMEOUT_SECONDS",
            env_or_default("TUTOR_REQUEST_TIMEOUT_SECONDS", "60"),
        )?;

        let interval_ms =
            parse_u64("TUTOR_POLL_INTERVAL_MS", env_or_default("TUTOR_POLL_INTERVAL_MS", "2000"))?;
        let max_attempts =
            parse_u32("TUTOR_POLL_MAX_ATTEMPTS", env_or_default("TUTOR_POLL_MAX_ATTEMPTS", "10"))?;

        let student_id = env_optional("TUTOR_STUDENT_ID");

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let allowed_image_extensions =
            parse_extensions(env_optional("ALLOWED_IMAGE_EXTENSIONS"), &["jpg", "jpeg", "png"])?;
        let max_images_per_submission = parse_u64(
            "MAX_IMAGES_PER_SUBMISSION",
            env_or_default("MAX_IMAGES_PER_SUBMISSION", "10"),
        )?;

        let grading_delay_ms =
            parse_u64("GRADING_STUB_DELAY_MS", env_or_default("GRADING_STUB_DELAY_MS", "1500"))?;
        let answer_key_path = env_optional("GRADING_STUB_ANSWER_KEY");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let log_level = env_or_default("TUTOR_LOG_LEVEL", "info");
        let json = env_optional("TUTOR_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            backend: BackendSettings { base_url, connect_timeout_seconds, request_timeout_seconds },
            polling: PollSettings { interval_ms, max_attempts },
            student: StudentSettings { student_id },
            storage: StorageSettings {
                max_upload_size_mb,
                allowed_image_extensions,
                max_images_per_submission,
            },
            stub: StubSettings { grading_delay_ms, answer_key_path },
            cors: CorsSettings { origins: cors_origins },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate(explicit_base_url.is_some())?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn backend(&self) -> &BackendSettings {
        &self.backend
    }

    pub(crate) fn polling(&self) -> &PollSettings {
        &self.polling
    }

    pub(crate) fn student(&self) -> &StudentSettings {
        &self.student
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn stub(&self) -> &StubSettings {
        &self.stub
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub(crate) fn override_base_url(&mut self, base_url: &str) {
        self.backend.base_url = base_url.trim_end_matches('/').to_string();
    }

    pub(crate) fn override_student_id(&mut self, student_id: String) {
        self.student.student_id = Some(student_id);
    }

    pub(crate) fn override_polling(&mut self, interval_ms: Option<u64>, max_attempts: Option<u32>) {
        if let Some(interval_ms) = interval_ms.filter(|value| *value > 0) {
            self.polling.interval_ms = interval_ms;
        }
        if let Some(max_attempts) = max_attempts.filter(|value| *value > 0) {
            self.polling.max_attempts = max_attempts;
        }
    }

    fn validate(&self, explicit_base_url: bool) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        if self.storage.max_images_per_submission == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_IMAGES_PER_SUBMISSION",
                value: "0".to_string(),
            });
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TUTOR_POLL_INTERVAL_MS",
                value: "0".to_string(),
            });
        }

        if self.polling.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TUTOR_POLL_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if reqwest::Url::parse(&self.backend.base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "TUTOR_API_BASE_URL",
                value: self.backend.base_url.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if !explicit_base_url {
            return Err(ConfigError::MissingValue("TUTOR_API_BASE_URL"));
        }

        Ok(())
    }
}

impl PollSettings {
    pub(crate) fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl StorageSettings {
    pub(crate) fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn load_uses_reference_poll_defaults() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::remove_var("TUTOR_POLL_INTERVAL_MS");
        std::env::remove_var("TUTOR_POLL_MAX_ATTEMPTS");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.polling().interval_ms, 2000);
        assert_eq!(settings.polling().max_attempts, 10);
        assert_eq!(settings.storage().allowed_image_extensions, vec!["jpg", "jpeg", "png"]);
    }

    #[tokio::test]
    async fn load_rejects_zero_poll_attempts() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("TUTOR_POLL_MAX_ATTEMPTS", "0");

        let err = Settings::load().expect_err("zero attempts must be rejected");
        assert!(matches!(err, ConfigError::InvalidValue { field: "TUTOR_POLL_MAX_ATTEMPTS", .. }));

        std::env::remove_var("TUTOR_POLL_MAX_ATTEMPTS");
    }

    #[tokio::test]
    async fn load_rejects_unsupported_extensions() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("ALLOWED_IMAGE_EXTENSIONS", "png,bmp");

        let err = Settings::load().expect_err("bmp is not supported");
        assert!(matches!(err, ConfigError::InvalidValue { field: "ALLOWED_IMAGE_EXTENSIONS", .. }));

        std::env::remove_var("ALLOWED_IMAGE_EXTENSIONS");
    }

    #[tokio::test]
    async fn strict_config_requires_explicit_base_url() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("TUTOR_STRICT_CONFIG", "1");
        std::env::remove_var("TUTOR_API_BASE_URL");

        let err = Settings::load().expect_err("strict config without base url");
        assert!(matches!(err, ConfigError::MissingValue("TUTOR_API_BASE_URL")));

        std::env::set_var("TUTOR_API_BASE_URL", "https://tutor.example.com/");
        let settings = Settings::load().expect("settings");
        assert_eq!(settings.backend().base_url, "https://tutor.example.com");

        std::env::remove_var("TUTOR_STRICT_CONFIG");
    }

    #[tokio::test]
    async fn overrides_ignore_zero_values() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let mut settings = Settings::load().expect("settings");
        settings.override_polling(Some(0), Some(3));
        assert_eq!(settings.polling().interval_ms, 2000);
        assert_eq!(settings.polling().max_attempts, 3);
        assert_eq!(settings.polling().interval(), Duration::from_millis(2000));
    }
}
