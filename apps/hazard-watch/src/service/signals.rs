use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Terminate,
    Interrupt,
}

/// Resolve on the first SIGINT or SIGTERM.
pub async fn wait_for_shutdown() -> SignalType {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return wait_for_interrupt().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                SignalType::Terminate
            }
            signal = wait_for_interrupt() => signal,
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_interrupt().await
    }
}

async fn wait_for_interrupt() -> SignalType {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received SIGINT");
    SignalType::Interrupt
}
