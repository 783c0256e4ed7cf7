#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = olympiad_tutor::run_grading_stub().await {
        eprintln!("grading-stub fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
