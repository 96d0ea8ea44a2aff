// CPU/GPU inference using ONNX Runtime

use std::collections::BTreeMap;

use super::{Detection, DetectorError};
use crate::stream::Frame;

#[cfg(feature = "cpu-inference")]
use {
    super::{select_device, Detector, Device},
    crate::config::DetectionConfig,
    async_trait::async_trait,
    ndarray::{Array4, CowArray},
    ort::{
        Environment, ExecutionProvider, GraphOptimizationLevel, LoggingLevel, Session,
        SessionBuilder, Value,
    },
    std::sync::Arc,
    tracing::{debug, info},
};

/// Resize to a square model input and lay the pixels out as normalized CHW.
pub fn preprocess_frame(frame: &Frame, input_size: u32) -> Vec<f32> {
    let resized = image::imageops::resize(
        frame,
        input_size,
        input_size,
        image::imageops::FilterType::Triangle,
    );

    let plane = (input_size * input_size) as usize;
    let mut tensor = vec![0.0f32; plane * 3];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y * input_size + x) as usize;
        tensor[offset] = pixel.0[0] as f32 / 255.0;
        tensor[plane + offset] = pixel.0[1] as f32 / 255.0;
        tensor[2 * plane + offset] = pixel.0[2] as f32 / 255.0;
    }

    tensor
}

/// Parse a YOLO-style head: `[1, 4 + classes, anchors]`, or its transpose
/// when only the second axis is `4 + classes` long. Only the best score per
/// class is kept, the boxes are not needed.
pub fn parse_yolo_output(
    data: &[f32],
    shape: &[usize],
    num_classes: usize,
) -> Result<Vec<Detection>, DetectorError> {
    let (rows, cols) = match shape {
        [1, a, b] | [a, b] => (*a, *b),
        _ => {
            return Err(DetectorError::InvalidOutput(format!("unsupported shape {:?}", shape)));
        }
    };

    if data.len() != rows * cols {
        return Err(DetectorError::InvalidOutput(format!(
            "{} values for shape {:?}",
            data.len(),
            shape
        )));
    }

    let expected = 4 + num_classes;
    let transposed = rows != expected && cols == expected;
    let (attributes, anchors) = if transposed { (cols, rows) } else { (rows, cols) };
    if attributes <= 4 {
        return Err(DetectorError::InvalidOutput(format!("no class scores in shape {:?}", shape)));
    }

    let value = |attribute: usize, anchor: usize| {
        if transposed {
            data[anchor * attributes + attribute]
        } else {
            data[attribute * anchors + anchor]
        }
    };

    let mut best: BTreeMap<u32, f32> = BTreeMap::new();
    for anchor in 0..anchors {
        let mut class_id = 0u32;
        let mut score = f32::MIN;
        for attribute in 4..attributes {
            let s = value(attribute, anchor);
            if s > score {
                score = s;
                class_id = (attribute - 4) as u32;
            }
        }

        let entry = best.entry(class_id).or_insert(score);
        if score > *entry {
            *entry = score;
        }
    }

    Ok(best
        .into_iter()
        .map(|(class_id, confidence)| Detection { class_id, confidence })
        .collect())
}

#[cfg(feature = "cpu-inference")]
fn ort_error(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::Inference(e.to_string())
}

#[cfg(feature = "cpu-inference")]
pub struct OnnxDetector {
    session: Arc<Session>,
    input_size: u32,
    num_classes: usize,
    device: Device,
}

#[cfg(feature = "cpu-inference")]
impl std::fmt::Debug for OnnxDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxDetector")
            .field("input_size", &self.input_size)
            .field("num_classes", &self.num_classes)
            .field("device", &self.device)
            .finish()
    }
}

#[cfg(feature = "cpu-inference")]
impl OnnxDetector {
    pub fn load(config: &DetectionConfig) -> Result<Self, DetectorError> {
        let cuda = ExecutionProvider::CUDA(Default::default());
        let device = select_device(config.accelerator, cuda.is_available());

        let providers = match device {
            Device::Cuda(_) => vec![cuda, ExecutionProvider::CPU(Default::default())],
            Device::Cpu => vec![ExecutionProvider::CPU(Default::default())],
        };

        info!("Loading ONNX model from: {:?}", config.model_path);

        let threads = i16::try_from(config.num_threads)
            .map_err(|_| DetectorError::Load(format!("num_threads {} out of range", config.num_threads)))?;

        let env = Environment::builder()
            .with_name("hazard_watch")
            .with_log_level(LoggingLevel::Warning)
            .build()
            .map_err(|e| DetectorError::Load(e.to_string()))?
            .into_arc();

        let session = SessionBuilder::new(&env)
            .and_then(|b| b.with_execution_providers(providers))
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_model_from_file(&config.model_path))
            .map_err(|e| DetectorError::Load(e.to_string()))?;

        Ok(Self {
            session: Arc::new(session),
            input_size: config.input_size,
            num_classes: config.classes.len(),
            device,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    fn run(
        session: &Session,
        frame: &Frame,
        input_size: u32,
        num_classes: usize,
    ) -> Result<Vec<Detection>, DetectorError> {
        let size = input_size as usize;
        let input = Array4::from_shape_vec((1, 3, size, size), preprocess_frame(frame, input_size))
            .map_err(ort_error)?
            .into_dyn();
        let input = CowArray::from(input);

        let value = Value::from_array(session.allocator(), &input).map_err(ort_error)?;
        let outputs = session.run(vec![value]).map_err(ort_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| DetectorError::InvalidOutput("no output tensors".to_string()))?;

        let tensor = output.try_extract::<f32>().map_err(ort_error)?;
        let view = tensor.view();
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();

        let detections = parse_yolo_output(&data, &shape, num_classes)?;
        debug!("Model returned {} class hits", detections.len());
        Ok(detections)
    }
}

#[cfg(feature = "cpu-inference")]
#[async_trait]
impl Detector for OnnxDetector {
    async fn detect(&self, frame: Arc<Frame>) -> Result<Vec<Detection>, DetectorError> {
        let session = self.session.clone();
        let input_size = self.input_size;
        let num_classes = self.num_classes;

        tokio::task::spawn_blocking(move || Self::run(&session, &frame, input_size, num_classes))
            .await
            .map_err(|e| DetectorError::TaskFailed(e.to_string()))?
    }
}
