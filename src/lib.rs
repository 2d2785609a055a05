//! hailocam
//!
//! Object detection on an IP camera MJPEG stream using GStreamer and the
//! Hailo `hailonet`/`hailofilter` elements.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;

// Re-export commonly used types
pub use config::{AppConfig, CameraConfig, ConfigError, ModelConfig, OutputConfig, VideoConfig};
pub use error::{HailoCamError, HailoCamResult};
pub use metrics::FrameStats;
pub use models::HardwareVariant;
pub use pipeline::{
    BusEvent, DetectionPipeline, FrameworkState, GstBackend, GstRuntime, MediaBackend,
    PipelineState, ProbeStatus, RecordingBackend, StageKind, StagePlan,
};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
