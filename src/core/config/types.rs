use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) server: ServerSettings,
    pub(super) runtime: RuntimeSettings,
    pub(super) backend: BackendSettings,
    pub(super) polling: PollSettings,
    pub(super) student: StudentSettings,
    pub(super) storage: StorageSettings,
    pub(super) stub: StubSettings,
    pub(super) cors: CorsSettings,
    pub(super) telemetry: TelemetrySettings,
}

/// Bind address of the grading stub server.
#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    pub(super) host: ServerHost,
    pub(super) port: ServerPort,
}

#[derive(Debug, Clone)]
pub(crate) struct BackendSettings {
    pub(crate) base_url: String,
    pub(crate) connect_timeout_seconds: u64,
    pub(crate) request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct PollSettings {
    pub(crate) interval_ms: u64,
    pub(crate) max_attempts: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct StudentSettings {
    pub(crate) student_id: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct StorageSettings {
    pub(crate) max_upload_size_mb: u64,
    pub(crate) allowed_image_extensions: Vec<String>,
    pub(crate) max_images_per_submission: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct StubSettings {
    pub(crate) grading_delay_ms: u64,
    pub(crate) answer_key_path: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ServerHost(pub(super) String);

#[derive(Debug, Clone, Copy)]
pub(crate) struct ServerPort(pub(super) u16);

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid server host: {0}")]
    InvalidHost(String),
    #[error("invalid server port: {0}")]
    InvalidPort(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required value for {0}")]
    MissingValue(&'static str),
}

impl ServerHost {
    /// A bind host, not a URL: `GRADING_STUB_HOST=http://...` is a common slip.
    pub(super) fn parse(value: String) -> Result<Self, ConfigError> {
        let host = value.trim();
        if host.is_empty() || host.contains("://") || host.contains('/') {
            return Err(ConfigError::InvalidHost(value));
        }

        Ok(Self(host.to_string()))
    }
}

impl ServerPort {
    /// Port `0` is accepted so tests can bind an ephemeral port.
    pub(super) fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        Ok(Self(parsed))
    }
}
