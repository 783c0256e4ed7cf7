use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// HTTP plumbing is chatty at debug; keep it at warn unless RUST_LOG says otherwise.
const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "h2=warn"];

fn build_filter(log_level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(log_level)
        .map_err(|err| anyhow::anyhow!("Invalid TUTOR_LOG_LEVEL '{log_level}': {err}"))?;
    for directive in QUIET_DEPENDENCIES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter = build_filter(&telemetry.log_level)?;

    // stdout carries command output; logs stay on stderr.
    let builder = fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr);

    let installed = if telemetry.json { builder.json().try_init() } else { builder.try_init() };
    installed.map_err(|err| anyhow::anyhow!(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(build_filter("info").is_ok());
        assert!(build_filter("olympiad_tutor=debug,warn").is_ok());
        assert!(build_filter("olympiad_tutor=loudest").is_err());
    }
}
