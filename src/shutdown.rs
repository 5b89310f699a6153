use tokio::signal::unix::{signal, SignalKind};

/// Wait for SIGTERM or SIGINT and return the name of the signal received.
///
/// Fails only if the signal handlers cannot be installed.
pub async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    tracing::info!(signal = name, "Shutdown signal received, stopping spooler");
    Ok(name)
}
