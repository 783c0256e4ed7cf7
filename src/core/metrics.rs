use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_upload(outcome: &'static str) {
    metrics::counter!("submission_uploads_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_poll_attempt() {
    metrics::counter!("submission_poll_attempts_total").increment(1);
}

pub(crate) fn record_poll_settled(outcome: &'static str) {
    metrics::counter!("submission_poll_settled_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_grading_run(problems: usize) {
    metrics::counter!("stub_grading_runs_total").increment(1);
    metrics::histogram!("stub_grading_problems").record(problems as f64);
}

pub(crate) fn record_http_response(method: String, route: String, status: u16, latency: Duration) {
    let status = status.to_string();
    metrics::counter!(
        "stub_http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "stub_http_request_duration_seconds",
        "method" => method,
        "route" => route,
        "status" => status
    )
    .record(latency.as_secs_f64());
}
