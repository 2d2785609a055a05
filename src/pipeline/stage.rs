//! The fixed stage layout of the detection graph

use crate::config::AppConfig;
use std::fmt;
use std::path::Path;

/// Buffer-count cap applied to both queues around the accelerator
pub const QUEUE_MAX_BUFFERS: u32 = 10;
/// Frames per `hailonet` inference batch
pub const INFERENCE_BATCH_SIZE: u32 = 1;

/// Role of a stage within the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    NetworkSource,
    JpegDecoder,
    ColorConverter,
    Scaler,
    CapsFilter,
    IngressQueue,
    Inference,
    PostProcess,
    EgressQueue,
    Sink,
}

impl StageKind {
    /// Every kind in link order
    pub const ORDER: [StageKind; 10] = [
        StageKind::NetworkSource,
        StageKind::JpegDecoder,
        StageKind::ColorConverter,
        StageKind::Scaler,
        StageKind::CapsFilter,
        StageKind::IngressQueue,
        StageKind::Inference,
        StageKind::PostProcess,
        StageKind::EgressQueue,
        StageKind::Sink,
    ];

    /// Element name inside the pipeline
    pub fn element_name(&self) -> &'static str {
        match self {
            StageKind::NetworkSource => "source",
            StageKind::JpegDecoder => "jpeg-decoder",
            StageKind::ColorConverter => "converter",
            StageKind::Scaler => "scaler",
            StageKind::CapsFilter => "capsfilter",
            StageKind::IngressQueue => "queue1",
            StageKind::Inference => "hailonet",
            StageKind::PostProcess => "hailofilter",
            StageKind::EgressQueue => "queue2",
            StageKind::Sink => "sink",
        }
    }

    /// Element factory used unless the configuration overrides it
    pub fn default_factory(&self) -> &'static str {
        match self {
            StageKind::NetworkSource => "souphttpsrc",
            StageKind::JpegDecoder => "jpegdec",
            StageKind::ColorConverter => "videoconvert",
            StageKind::Scaler => "videoscale",
            StageKind::CapsFilter => "capsfilter",
            StageKind::IngressQueue | StageKind::EgressQueue => "queue",
            StageKind::Inference => "hailonet",
            StageKind::PostProcess => "hailofilter",
            StageKind::Sink => "autovideosink",
        }
    }

    /// Whether the element comes from the Hailo plugin set
    pub fn is_accelerator(&self) -> bool {
        matches!(self, StageKind::Inference | StageKind::PostProcess)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Typed element property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i32),
    UInt(u32),
    UInt64(u64),
    Bool(bool),
    /// Caps in their string serialization
    Caps(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => write!(f, "\"{}\"", s),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::UInt64(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Caps(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// One stage to create: kind, factory, name and the properties to set on it
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub kind: StageKind,
    pub factory: String,
    pub name: &'static str,
    pub properties: Vec<(&'static str, PropertyValue)>,
}

impl StageSpec {
    fn new(kind: StageKind) -> Self {
        Self {
            kind,
            factory: kind.default_factory().to_string(),
            name: kind.element_name(),
            properties: Vec::new(),
        }
    }

    fn with(mut self, key: &'static str, value: PropertyValue) -> Self {
        self.properties.push((key, value));
        self
    }

    /// Look up a configured property by key
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// The ordered list of stages making up the detection graph
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<StageSpec>,
}

impl StagePlan {
    pub fn new(config: &AppConfig, hef_path: &Path) -> Self {
        let stages = StageKind::ORDER
            .iter()
            .map(|kind| Self::configure(StageSpec::new(*kind), config, hef_path))
            .collect();
        Self { stages }
    }

    fn configure(spec: StageSpec, config: &AppConfig, hef_path: &Path) -> StageSpec {
        match spec.kind {
            StageKind::NetworkSource => spec
                .with("location", PropertyValue::Str(config.camera.location.clone()))
                .with("timeout", PropertyValue::UInt(config.camera.timeout_secs))
                .with("retries", PropertyValue::Int(config.camera.retries)),
            StageKind::CapsFilter => {
                spec.with("caps", PropertyValue::Caps(config.video.caps_string()))
            }
            StageKind::IngressQueue | StageKind::EgressQueue => spec
                .with("max-size-buffers", PropertyValue::UInt(QUEUE_MAX_BUFFERS))
                .with("max-size-time", PropertyValue::UInt64(0))
                .with("max-size-bytes", PropertyValue::UInt(0)),
            StageKind::Inference => spec
                .with(
                    "hef-path",
                    PropertyValue::Str(hef_path.to_string_lossy().into_owned()),
                )
                .with("batch-size", PropertyValue::UInt(INFERENCE_BATCH_SIZE)),
            StageKind::Sink => {
                let mut spec = spec.with("sync", PropertyValue::Bool(config.output.sync));
                spec.factory = config.output.sink.clone();
                spec
            }
            StageKind::JpegDecoder
            | StageKind::ColorConverter
            | StageKind::Scaler
            | StageKind::PostProcess => spec,
        }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn get(&self, kind: StageKind) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Render the plan as a `gst-launch-1.0` description
    pub fn launch_description(&self) -> String {
        self.stages
            .iter()
            .map(|stage| {
                let mut part = format!("{} name={}", stage.factory, stage.name);
                for (key, value) in &stage.properties {
                    part.push_str(&format!(" {}={}", key, value));
                }
                part
            })
            .collect::<Vec<_>>()
            .join(" ! ")
    }
}
