use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::HazardKind;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Alert endpoint connection timed out")]
    Timeout,

    #[error("Alert transport failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub camera_name: String,
    pub kind: HazardKind,
    pub at: DateTime<Local>,
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, alert: &Alert) -> Result<(), TransportError>;
}

/// `2024-05-01 12:00:00 | CAMERA: Dock | EVENT: FIRE\n`
pub fn format_alert(alert: &Alert) -> String {
    format!(
        "{} | CAMERA: {} | EVENT: {}\n",
        alert.at.format("%Y-%m-%d %H:%M:%S"),
        alert.camera_name,
        alert.kind.upper()
    )
}

/// Fire-and-forget line over a fresh TCP connection per alert.
#[derive(Debug, Clone)]
pub struct TcpAlertDispatcher {
    endpoint: String,
    timeout: Duration,
}

impl TcpAlertDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AlertDispatcher for TcpAlertDispatcher {
    async fn dispatch(&self, alert: &Alert) -> Result<(), TransportError> {
        let message = format_alert(alert);

        let send = async {
            let mut stream = TcpStream::connect(&self.endpoint).await?;
            stream.write_all(message.as_bytes()).await?;
            stream.shutdown().await?;
            Ok::<_, std::io::Error>(())
        };

        tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| TransportError::Timeout)??;

        debug!("Alert delivered to {}: {}", self.endpoint, message.trim_end());
        Ok(())
    }
}
