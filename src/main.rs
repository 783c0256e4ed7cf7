#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = olympiad_tutor::run().await {
        eprintln!("olympiad-tutor fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
