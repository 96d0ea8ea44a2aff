use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Create a linked trigger/signal pair.
pub fn stop_signal() -> (StopTrigger, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopTrigger { tx: Arc::new(tx) }, StopSignal { rx })
}

/// Write side of the process-wide stop flag. Set once, never cleared.
#[derive(Debug, Clone)]
pub struct StopTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl StopTrigger {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal { rx: self.tx.subscribe() }
    }
}

/// Read side handed to every worker. A dropped trigger also reads as stopped.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once stop has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless stopped first. Returns `false` if the
    /// sleep was cut short by the stop signal.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.stopped() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
