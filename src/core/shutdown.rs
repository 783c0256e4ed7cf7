use tokio::signal;

/// Resolves on Ctrl+C or SIGTERM. `component` only labels the log line.
pub(crate) async fn shutdown_signal(component: &'static str) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(err) => {
                tracing::error!(component, error = %err, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => "Ctrl+C",
            Err(err) => {
                tracing::error!(component, error = %err, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        },
        name = terminate => name,
    };

    tracing::info!(component, signal = received, "Shutdown signal received");
}
