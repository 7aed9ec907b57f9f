use anyhow::Result as AnyResult;
use tracing::info;

/// Resolve when the process receives a termination request.
#[cfg(unix)]
pub async fn signal_shutdown() -> AnyResult<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => { info!("SIGINT received, shutting down"); }
        _ = sigterm.recv() => { info!("SIGTERM received, shutting down"); }
    };
    Ok(())
}

#[cfg(not(unix))]
pub async fn signal_shutdown() -> AnyResult<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    Ok(())
}
