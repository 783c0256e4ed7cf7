use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::core::{config::Settings, shutdown};
use crate::schemas::submission::{GradingResult, PRACTICE_TEST_ID};
use crate::services::grading_client::{GradingBackend, HttpGradingBackend, ImageUpload};
use crate::submission::{
    PollOutcome, PollPolicy, ProblemContext, SessionHandle, SubmissionController, SubmissionError,
    UploadLimits,
};

/// Olympiad tutor - submit handwritten solutions and wait for their grade
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Base URL of the grading backend (overrides TUTOR_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Student identifier (overrides TUTOR_STUDENT_ID)
    #[arg(long, global = true)]
    student_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload solution photos, request grading and wait for the result
    Submit {
        #[command(flatten)]
        problem: ProblemArgs,

        /// Final answer typed by the student
        #[arg(long)]
        answer: Option<String>,

        #[command(flatten)]
        polling: PollingArgs,

        /// Solution photos (jpg, jpeg, png)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Wait for the result of an already submitted solution
    Poll {
        #[command(flatten)]
        problem: ProblemArgs,

        /// Submission returned by an earlier upload
        #[arg(long)]
        submission_id: i64,

        #[command(flatten)]
        polling: PollingArgs,
    },
    /// Print every grading record of a submission
    Results {
        #[arg(long)]
        submission_id: i64,
    },
}

#[derive(Args, Debug)]
struct ProblemArgs {
    /// Problem being solved
    #[arg(long)]
    problem_id: i64,

    /// Test the problem belongs to; 0 means practice
    #[arg(long, default_value_t = PRACTICE_TEST_ID)]
    test_id: i64,
}

#[derive(Args, Debug)]
struct PollingArgs {
    /// Delay before each result check
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Number of result checks before giving up
    #[arg(long)]
    max_attempts: Option<u32>,
}

impl ProblemArgs {
    fn context(&self) -> ProblemContext {
        ProblemContext::new(self.test_id, self.problem_id)
    }
}

pub(crate) async fn execute(cli: Cli, mut settings: Settings) -> anyhow::Result<()> {
    if let Some(base_url) = cli.base_url.as_deref() {
        reqwest::Url::parse(base_url).with_context(|| format!("Invalid --base-url {base_url}"))?;
        settings.override_base_url(base_url);
    }
    if let Some(student_id) = cli.student_id {
        settings.override_student_id(student_id);
    }

    let backend = HttpGradingBackend::from_settings(&settings)?;

    match cli.command {
        Command::Submit { problem, answer, polling, files } => {
            settings.override_polling(polling.poll_interval_ms, polling.max_attempts);
            let controller = build_controller(backend, &settings)?;

            let mut images = Vec::with_capacity(files.len());
            for path in &files {
                images.push(ImageUpload::from_path(path).await?);
            }

            let session = controller.open_submission(problem.context());
            let progress = spawn_progress(&controller);
            let submit = controller.submit(&session, images, answer);
            tokio::pin!(submit);
            // Ctrl+C during the upload closes the session; the upload itself
            // runs to completion and grading is not requested.
            let receipt = tokio::select! {
                receipt = &mut submit => receipt,
                _ = shutdown::shutdown_signal("submission") => {
                    cancel(&controller, &session);
                    submit.await
                }
            };
            let receipt = match receipt {
                Ok(receipt) => receipt,
                Err(SubmissionError::Cancelled) => {
                    progress.abort();
                    println!("Cancelled before grading was requested");
                    return Ok(());
                }
                Err(err) => {
                    progress.abort();
                    return Err(err.into());
                }
            };
            println!("Submitted as submission {}", receipt.submission_id);

            let outcome = tokio::select! {
                joined = receipt.poll => joined.context("Poll task failed")?,
                _ = shutdown::shutdown_signal("submission") => cancel(&controller, &session),
            };
            progress.abort();
            report(&controller, outcome, receipt.submission_id);
        }
        Command::Poll { problem, submission_id, polling } => {
            settings.override_polling(polling.poll_interval_ms, polling.max_attempts);
            let controller = build_controller(backend, &settings)?;

            let session = controller.open_submission(problem.context());
            let progress = spawn_progress(&controller);
            let outcome = tokio::select! {
                outcome = controller.poll_for_result(&session, submission_id, problem.problem_id) => outcome?,
                _ = shutdown::shutdown_signal("submission") => cancel(&controller, &session),
            };
            progress.abort();
            report(&controller, outcome, submission_id);
        }
        Command::Results { submission_id } => {
            let results = backend.fetch_results(submission_id).await?;
            if results.is_empty() {
                println!("No grading results for submission {submission_id} yet");
            }
            for result in &results {
                print_result(result)?;
            }
        }
    }

    Ok(())
}

fn build_controller(
    backend: HttpGradingBackend,
    settings: &Settings,
) -> anyhow::Result<SubmissionController> {
    let student_id = settings
        .student()
        .student_id
        .clone()
        .filter(|value| !value.trim().is_empty())
        .context("A student id is required: pass --student-id or set TUTOR_STUDENT_ID")?;

    Ok(SubmissionController::new(
        Arc::new(backend),
        student_id,
        PollPolicy::from_settings(settings),
        UploadLimits::from_settings(settings),
    ))
}

/// Prints the dialog status line whenever it changes.
fn spawn_progress(controller: &SubmissionController) -> tokio::task::JoinHandle<()> {
    let mut view = controller.subscribe();
    tokio::spawn(async move {
        let mut last = String::new();
        while view.changed().await.is_ok() {
            let (line, phase, polling) = {
                let current = view.borrow_and_update();
                (current.status_line(), current.phase.as_str(), current.poll_active)
            };
            tracing::debug!(phase, polling, "Submission view changed");
            if line != last {
                eprintln!("{line}");
                last = line;
            }
        }
    })
}

fn cancel(controller: &SubmissionController, session: &SessionHandle) -> PollOutcome {
    if !controller.session_phase(session).is_terminal() {
        controller.close_submission(session);
        tracing::info!(token = session.token, "Submission dialog closed by user");
    }
    PollOutcome::Cancelled
}

fn report(controller: &SubmissionController, outcome: PollOutcome, submission_id: i64) {
    tracing::debug!(submission_id, outcome = outcome.as_str(), "Poll finished");
    println!("{}", controller.view().status_line());
    match outcome {
        PollOutcome::Found(result) => {
            if let Err(err) = print_result(&result) {
                tracing::error!(error = %err, "Failed to render grading result");
            }
        }
        PollOutcome::TimedOut => println!(
            "Run `olympiad-tutor results --submission-id {submission_id}` later."
        ),
        PollOutcome::Cancelled => println!("Cancelled; submission {submission_id} keeps grading"),
    }
}

fn print_result(result: &GradingResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
