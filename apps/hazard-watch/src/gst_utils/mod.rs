use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::{HazardWatchError, Result};

/// Elements every camera pipeline is built from
const REQUIRED_ELEMENTS: &[&str] = &[
    "uridecodebin",
    "videoconvert",
    "appsink",
];

/// Source and decoder elements that widen what cameras can be opened
const OPTIONAL_ELEMENTS: &[&str] = &[
    // Transports
    "rtspsrc",
    "souphttpsrc",

    // Decoders
    "avdec_h264",
    "avdec_h265",
    "jpegdec",

    // Hardware decode
    "nvh264dec",
    "vah264dec",
];

#[derive(Debug, Clone)]
pub struct GstCapabilities {
    pub has_rtsp: bool,
    pub has_http: bool,
    pub has_hw_decode: bool,
    pub available_elements: HashMap<String, bool>,
}

impl GstCapabilities {
    pub fn has_element(&self, element: &str) -> bool {
        self.available_elements.get(element).copied().unwrap_or(false)
    }
}

/// Initialize GStreamer and verify the camera pipeline elements exist.
pub fn initialize() -> Result<GstCapabilities> {
    info!("Initializing GStreamer");

    gst::init().map_err(|e| {
        error!("Failed to initialize GStreamer: {}", e);
        HazardWatchError::ConfigError(format!("GStreamer initialization failed: {}", e))
    })?;

    let (major, minor, micro, nano) = gst::version();
    info!("GStreamer version: {}.{}.{}.{}", major, minor, micro, nano);

    if let Ok(plugin_path) = std::env::var("GST_PLUGIN_PATH") {
        info!("Using custom GST_PLUGIN_PATH: {}", plugin_path);
    }

    let capabilities = discover_plugins()?;
    info!(
        "GStreamer capabilities: rtsp={} http={} hw_decode={}",
        capabilities.has_rtsp, capabilities.has_http, capabilities.has_hw_decode
    );

    Ok(capabilities)
}

pub fn discover_plugins() -> Result<GstCapabilities> {
    let mut available_elements = HashMap::new();
    let mut missing_required = Vec::new();

    for element in REQUIRED_ELEMENTS {
        let found = gst::ElementFactory::find(element).is_some();
        if !found {
            error!("Missing required element: {}", element);
            missing_required.push(*element);
        }
        available_elements.insert(element.to_string(), found);
    }

    if !missing_required.is_empty() {
        return Err(HazardWatchError::ConfigError(format!(
            "Missing required GStreamer elements: {:?}",
            missing_required
        )));
    }

    for element in OPTIONAL_ELEMENTS {
        let found = gst::ElementFactory::find(element).is_some();
        if !found {
            debug!("Optional element not found: {}", element);
        }
        available_elements.insert(element.to_string(), found);
    }

    let has = |name: &str| available_elements.get(name).copied().unwrap_or(false);
    Ok(GstCapabilities {
        has_rtsp: has("rtspsrc"),
        has_http: has("souphttpsrc"),
        has_hw_decode: has("nvh264dec") || has("vah264dec"),
        available_elements,
    })
}

/// Print the element report (for --check-plugins)
pub fn print_plugin_info(capabilities: &GstCapabilities) {
    println!("\nGStreamer Plugin Discovery Report");
    println!("==================================");

    let (major, minor, micro, nano) = gst::version();
    println!("\nGStreamer Version: {}.{}.{}.{}", major, minor, micro, nano);

    let mark = |element: &str| if capabilities.has_element(element) { "✓" } else { "✗" };

    println!("\nRequired Elements:");
    for element in REQUIRED_ELEMENTS {
        println!("  {} {}", mark(element), element);
    }

    println!("\nOptional Elements:");
    for element in OPTIONAL_ELEMENTS {
        println!("  {} {}", mark(element), element);
    }

    let yes_no = |flag: bool| if flag { "Yes" } else { "No" };
    println!("\nCamera Sources:");
    println!("  RTSP: {}", yes_no(capabilities.has_rtsp));
    println!("  HTTP: {}", yes_no(capabilities.has_http));
    println!("  Hardware decode: {}", yes_no(capabilities.has_hw_decode));

    let registry = gst::Registry::get();
    println!("\nRegistry Statistics:");
    println!("  Total Plugins: {}", registry.plugins().len());
}
