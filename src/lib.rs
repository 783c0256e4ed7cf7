pub(crate) mod api;
pub(crate) mod cli;
pub(crate) mod core;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod submission;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::path::Path;

use clap::Parser;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::repositories::submissions::SubmissionStore;
use crate::services::grader::AnswerKey;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();
    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    tracing::debug!(
        base_url = %settings.backend().base_url,
        environment = %settings.runtime().environment.as_str(),
        "Olympiad tutor client starting"
    );

    cli::execute(cli, settings).await
}

pub async fn run_grading_stub() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let answer_key = match settings.stub().answer_key_path.as_deref() {
        Some(path) => AnswerKey::load(Path::new(path)).await?,
        None => {
            tracing::warn!("GRADING_STUB_ANSWER_KEY not set; every answer will be graded incorrect");
            AnswerKey::default()
        }
    };
    tracing::info!(answers = answer_key.len(), "Answer key loaded");

    let state = AppState::new(settings, SubmissionStore::new(), answer_key);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        grading_delay_ms = state.settings().stub().grading_delay_ms,
        environment = %state.settings().runtime().environment.as_str(),
        "Grading stub listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_signal("grading-stub"))
        .await?;

    Ok(())
}
