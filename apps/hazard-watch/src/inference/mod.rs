// Hazard classifier integration

pub mod cpu;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DetectionConfig;
use crate::events::HazardKind;
use crate::stream::Frame;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),

    #[error("Inference task failed: {0}")]
    TaskFailed(String),
}

/// One weighted class hit from the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
}

/// Opaque detection capability. Implementations own any runtime, device or
/// model details; the worker only sees class ids and confidences.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: Arc<Frame>) -> Result<Vec<Detection>, DetectorError>;
}

/// Model class index to hazard taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    kinds: Vec<Option<HazardKind>>,
}

impl ClassMap {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        Self {
            kinds: labels.iter().map(|l| HazardKind::from_label(l.as_ref())).collect(),
        }
    }

    pub fn kind(&self, class_id: u32) -> Option<HazardKind> {
        self.kinds.get(class_id as usize).copied().flatten()
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self {
            kinds: HazardKind::ALL.iter().copied().map(Some).collect(),
        }
    }
}

/// Distinct hazard kinds present in one frame at or above `threshold`.
pub fn candidate_events(
    detections: &[Detection],
    threshold: f32,
    class_map: &ClassMap,
) -> BTreeSet<HazardKind> {
    detections
        .iter()
        .filter(|d| d.confidence >= threshold)
        .filter_map(|d| class_map.kind(d.class_id))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceleratorPreference {
    /// Use an accelerator when one is available
    #[default]
    Auto,
    Gpu,
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda(u32),
    Cpu,
}

/// Static device policy, evaluated once when the detector is built.
pub fn select_device(preference: AcceleratorPreference, accelerator_available: bool) -> Device {
    match preference {
        AcceleratorPreference::Cpu => Device::Cpu,
        AcceleratorPreference::Auto | AcceleratorPreference::Gpu if accelerator_available => {
            Device::Cuda(0)
        }
        AcceleratorPreference::Gpu => {
            warn!("GPU requested but no accelerator is available, falling back to CPU");
            Device::Cpu
        }
        AcceleratorPreference::Auto => Device::Cpu,
    }
}

/// Build the configured classifier. The model artifact is expected to have
/// been checked already.
pub fn build_detector(config: &DetectionConfig) -> crate::Result<Arc<dyn Detector>> {
    #[cfg(feature = "cpu-inference")]
    {
        let detector = cpu::OnnxDetector::load(config)?;
        info!("Hazard classifier ready on {:?}", detector.device());
        Ok(Arc::new(detector))
    }

    #[cfg(not(feature = "cpu-inference"))]
    {
        info!("Requested model {:?}", config.model_path);
        Err(crate::HazardWatchError::ConfigError(
            "built without the cpu-inference feature, no hazard classifier available".to_string(),
        ))
    }
}
