use async_trait::async_trait;
use gst::prelude::*;
use gst_app::AppSink;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ConnectivityError, Frame, FrameStream, StreamBackend};
use crate::camera::CameraSource;
use crate::config::StreamConfig;

fn clock_time(duration: Duration) -> gst::ClockTime {
    gst::ClockTime::from_mseconds(duration.as_millis() as u64)
}

fn pipeline_error(context: &str, e: impl std::fmt::Display) -> ConnectivityError {
    ConnectivityError::Open(format!("{}: {}", context, e))
}

/// First error message waiting on the pipeline bus, if any.
fn pending_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
        gst::MessageView::Error(err) => Some(match err.debug() {
            Some(debug) => format!("{} ({})", err.error(), debug),
            None => err.error().to_string(),
        }),
        _ => None,
    }
}

/// Pack a possibly padded RGB plane into a tight frame.
pub fn copy_rgb_rows(data: &[u8], width: u32, height: u32, stride: usize) -> Option<Frame> {
    let row_bytes = width as usize * 3;
    if stride < row_bytes {
        return None;
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(data.get(start..start + row_bytes)?);
    }

    Frame::from_raw(width, height, pixels)
}

/// `uridecodebin ! videoconvert ! appsink` per camera, RGB out.
#[derive(Debug, Clone)]
pub struct GstBackend {
    open_timeout: Duration,
    read_timeout: Duration,
}

impl GstBackend {
    pub fn new(open_timeout: Duration, read_timeout: Duration) -> Self {
        Self { open_timeout, read_timeout }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            Duration::from_secs(config.open_timeout_seconds),
            Duration::from_secs(config.read_timeout_seconds),
        )
    }

    fn build_pipeline(
        name: &str,
        uri: &str,
        buffer_frames: u32,
    ) -> Result<(gst::Pipeline, AppSink), ConnectivityError> {
        let pipeline = gst::Pipeline::with_name(&format!("camera-{}", name));

        let source = gst::ElementFactory::make("uridecodebin")
            .property("uri", uri)
            .build()
            .map_err(|e| pipeline_error("Failed to create uridecodebin", e))?;

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| pipeline_error("Failed to create videoconvert", e))?;

        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgb)
            .build();

        // Keep only the newest frames, drop the rest
        let appsink = AppSink::builder()
            .caps(&caps)
            .max_buffers(buffer_frames)
            .drop(true)
            .sync(false)
            .build();

        pipeline
            .add_many([&source, &convert, appsink.upcast_ref()])
            .map_err(|e| pipeline_error("Failed to add elements", e))?;

        convert
            .link(&appsink)
            .map_err(|e| pipeline_error("Failed to link videoconvert to appsink", e))?;

        let convert_weak = convert.downgrade();
        source.connect_pad_added(move |_src, pad| {
            let Some(convert) = convert_weak.upgrade() else {
                return;
            };
            let Some(sink_pad) = convert.static_pad("sink") else {
                return;
            };
            if sink_pad.is_linked() {
                return;
            }

            let is_video = pad
                .current_caps()
                .and_then(|caps| caps.structure(0).map(|s| s.name().starts_with("video/")))
                .unwrap_or(false);
            if !is_video {
                return;
            }

            if let Err(e) = pad.link(&sink_pad) {
                warn!("Failed to link decoded pad {}: {:?}", pad.name(), e);
            }
        });

        Ok((pipeline, appsink))
    }

    fn start(
        name: &str,
        uri: &str,
        buffer_frames: u32,
        open_timeout: Duration,
    ) -> Result<(gst::Pipeline, AppSink), ConnectivityError> {
        let (pipeline, appsink) = Self::build_pipeline(name, uri, buffer_frames)?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let detail = pending_bus_error(&pipeline).unwrap_or_else(|| e.to_string());
            let _ = pipeline.set_state(gst::State::Null);
            return Err(ConnectivityError::Open(detail));
        }

        let (result, current, _pending) = pipeline.state(clock_time(open_timeout));
        match result {
            Ok(gst::StateChangeSuccess::Success) | Ok(gst::StateChangeSuccess::NoPreroll) => {
                debug!("Pipeline for {} reached {:?}", name, current);
                Ok((pipeline, appsink))
            }
            Ok(gst::StateChangeSuccess::Async) => {
                let _ = pipeline.set_state(gst::State::Null);
                Err(ConnectivityError::Timeout(open_timeout))
            }
            Err(e) => {
                let detail = pending_bus_error(&pipeline).unwrap_or_else(|| e.to_string());
                let _ = pipeline.set_state(gst::State::Null);
                Err(ConnectivityError::Open(detail))
            }
        }
    }
}

#[async_trait]
impl StreamBackend for GstBackend {
    async fn open(
        &self,
        source: &CameraSource,
        buffer_frames: u32,
    ) -> Result<Box<dyn FrameStream>, ConnectivityError> {
        let name = source.name.clone();
        let uri = source.uri.clone();
        let open_timeout = self.open_timeout;

        let (pipeline, appsink) = tokio::task::spawn_blocking(move || {
            Self::start(&name, &uri, buffer_frames, open_timeout)
        })
        .await
        .map_err(|e| ConnectivityError::Open(e.to_string()))??;

        Ok(Box::new(GstFrameStream {
            pipeline,
            appsink,
            read_timeout: self.read_timeout,
        }))
    }
}

pub struct GstFrameStream {
    pipeline: gst::Pipeline,
    appsink: AppSink,
    read_timeout: Duration,
}

impl GstFrameStream {
    fn pull(
        pipeline: &gst::Pipeline,
        appsink: &AppSink,
        read_timeout: Duration,
    ) -> Result<Frame, ConnectivityError> {
        let Some(sample) = appsink.try_pull_sample(clock_time(read_timeout)) else {
            if appsink.is_eos() {
                return Err(ConnectivityError::Eos);
            }
            if let Some(detail) = pending_bus_error(pipeline) {
                return Err(ConnectivityError::Read(detail));
            }
            return Err(ConnectivityError::Timeout(read_timeout));
        };

        let caps = sample
            .caps()
            .ok_or_else(|| ConnectivityError::Read("sample without caps".to_string()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| ConnectivityError::Read(e.to_string()))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| ConnectivityError::Read("sample without buffer".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| ConnectivityError::Read(e.to_string()))?;

        let stride = info.stride()[0] as usize;
        copy_rgb_rows(map.as_slice(), info.width(), info.height(), stride)
            .ok_or_else(|| ConnectivityError::Read("truncated frame buffer".to_string()))
    }
}

#[async_trait]
impl FrameStream for GstFrameStream {
    async fn read_frame(&mut self) -> Result<Frame, ConnectivityError> {
        let pipeline = self.pipeline.clone();
        let appsink = self.appsink.clone();
        let read_timeout = self.read_timeout;

        tokio::task::spawn_blocking(move || Self::pull(&pipeline, &appsink, read_timeout))
            .await
            .map_err(|e| ConnectivityError::Read(e.to_string()))?
    }
}

impl Drop for GstFrameStream {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
