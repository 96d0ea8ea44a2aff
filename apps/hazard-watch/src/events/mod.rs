pub mod alert;
pub mod debounce;
pub mod sink;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::stream::Frame;
use alert::{Alert, AlertDispatcher};
use sink::{encode_jpeg, EventRecord, EventSink};

pub use debounce::Debouncer;

/// Hazard taxonomy. Anything the model reports outside of these is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardKind {
    Fire,
    Smoke,
    Spill,
}

impl HazardKind {
    pub const ALL: [HazardKind; 3] = [HazardKind::Fire, HazardKind::Smoke, HazardKind::Spill];

    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::Fire => "fire",
            HazardKind::Smoke => "smoke",
            HazardKind::Spill => "spill",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(label))
    }

    /// Form used on the alert wire.
    pub fn upper(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admitted detection, owned by the event pipeline from here on.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub camera_name: String,
    pub kind: HazardKind,
    pub frame: Arc<Frame>,
    pub captured_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Stored and the alert went out
    Alerted,
    /// Stored, alert transport failed
    StoredOnly,
    /// Encoding or persistence failed, event dropped
    Dropped,
}

/// Encode, persist, then alert. The alert step only runs when the row was
/// written.
pub struct EventPipeline {
    sink: Arc<dyn EventSink>,
    alerts: Arc<dyn AlertDispatcher>,
    jpeg_quality: u8,
}

impl EventPipeline {
    pub fn new(sink: Arc<dyn EventSink>, alerts: Arc<dyn AlertDispatcher>, jpeg_quality: u8) -> Self {
        Self { sink, alerts, jpeg_quality }
    }

    pub async fn handle(&self, event: DetectionEvent) -> EventOutcome {
        let camera = event.camera_name.clone();
        let quality = self.jpeg_quality;
        let frame = event.frame.clone();

        let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await;
        let jpeg = match encoded {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                error!(camera = %camera, kind = %event.kind, "Dropping event: {}", e);
                return EventOutcome::Dropped;
            }
            Err(e) => {
                error!(camera = %camera, kind = %event.kind, "Dropping event, encoder task failed: {}", e);
                return EventOutcome::Dropped;
            }
        };

        let record = EventRecord {
            camera_name: event.camera_name.clone(),
            kind: event.kind,
            detected_at: event.captured_at,
            jpeg,
        };

        match self.sink.persist(&record).await {
            Ok(id) => debug!(camera = %camera, kind = %event.kind, "Stored detection event {}", id),
            Err(e) => {
                error!(camera = %camera, kind = %event.kind, "Dropping event: {}", e);
                return EventOutcome::Dropped;
            }
        }

        let alert = Alert {
            camera_name: event.camera_name,
            kind: event.kind,
            at: event.captured_at,
        };

        match self.alerts.dispatch(&alert).await {
            Ok(()) => {
                info!(camera = %camera, kind = %alert.kind, "Hazard alert sent");
                EventOutcome::Alerted
            }
            Err(e) => {
                warn!(camera = %camera, kind = %alert.kind, "Alert not delivered: {}", e);
                EventOutcome::StoredOnly
            }
        }
    }
}
