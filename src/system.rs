/// Waits for SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_signal_impl() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = terminate.recv() => tracing::debug!("received SIGTERM"),
        _ = interrupt.recv() => tracing::debug!("received SIGINT"),
    };
    Ok(())
}

/// Waits for Ctrl-C or a console close.
#[cfg(windows)]
async fn wait_for_signal_impl() -> std::io::Result<()> {
    use tokio::signal::windows;

    let mut ctrl_c = windows::ctrl_c()?;
    let mut ctrl_close = windows::ctrl_close()?;

    tokio::select! {
        _ = ctrl_c.recv() => tracing::debug!("received CTRL_C"),
        _ = ctrl_close.recv() => tracing::debug!("received CTRL_CLOSE"),
    };
    Ok(())
}

/// Registers signal handlers and waits for a shutdown request.
pub async fn wait_for_signal() -> std::io::Result<()> {
    wait_for_signal_impl().await
}
