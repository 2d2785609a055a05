//! Configuration management

use crate::models::HardwareVariant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default MJPEG endpoint of the sample camera
pub const DEFAULT_CAMERA_LOCATION: &str =
    "http://14.160.87.118:82/cgi-bin/camera?resolution=640&quality=1&Language=0&1733285069";

/// Network camera source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// MJPEG-over-HTTP URL, including any access query parameters
    pub location: String,
    /// Read timeout in seconds
    pub timeout_secs: u32,
    /// Number of reconnection attempts
    pub retries: i32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_CAMERA_LOCATION.to_string(),
            timeout_secs: 5,
            retries: 3,
        }
    }
}

/// Model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Symbolic model name, looked up in the registry for `hardware`
    pub name: String,
    /// Accelerator variant
    pub hardware: HardwareVariant,
    /// Installation root holding `resources/`; derived from the executable when unset
    pub install_dir: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "yolov5m".to_string(),
            hardware: HardwareVariant::Hailo8,
            install_dir: None,
        }
    }
}

/// Raw video format fed to the accelerator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub format: String,
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            format: "RGB".to_string(),
            width: 640,
            height: 480,
        }
    }
}

impl VideoConfig {
    /// Caps string applied by the capsfilter stage
    pub fn caps_string(&self) -> String {
        format!(
            "video/x-raw,format={},width={},height={}",
            self.format, self.width, self.height
        )
    }
}

/// Output sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Sink element factory, e.g. "autovideosink" or "fakesink"
    pub sink: String,
    /// Whether the sink paces frames to the pipeline clock
    pub sync: bool,
    /// Interval between frame statistics log lines, 0 disables them
    pub stats_interval_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: "autovideosink".to_string(),
            sync: false,
            stats_interval_secs: 5,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub model: ModelConfig,
    pub video: VideoConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_toml_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(format!("TOML serialize error: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::FileWriteError(path.to_path_buf(), e))?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.name.trim().is_empty() {
            return Err(ConfigError::invalid("model.name", &self.model.name));
        }

        let location = self.camera.location.as_str();
        if !(location.starts_with("http://") || location.starts_with("https://")) {
            return Err(ConfigError::invalid("camera.location", location));
        }

        if self.camera.timeout_secs == 0 {
            return Err(ConfigError::invalid("camera.timeout_secs", "0"));
        }

        if self.camera.retries < 0 {
            return Err(ConfigError::invalid(
                "camera.retries",
                &self.camera.retries.to_string(),
            ));
        }

        if self.video.width == 0 || self.video.height == 0 {
            return Err(ConfigError::invalid(
                "video.size",
                &format!("{}x{}", self.video.width, self.video.height),
            ));
        }

        if self.video.format.trim().is_empty() {
            return Err(ConfigError::invalid("video.format", &self.video.format));
        }

        if self.output.sink.trim().is_empty() {
            return Err(ConfigError::invalid("output.sink", &self.output.sink));
        }

        Ok(())
    }

    /// Installation root used to resolve model resources
    pub fn install_dir(&self) -> crate::HailoCamResult<PathBuf> {
        match &self.model.install_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::models::default_install_dir(),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileReadError(PathBuf, std::io::Error),

    #[error("Failed to write config file {0}: {1}")]
    FileWriteError(PathBuf, std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(String),

    #[error("Config serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },
}

impl ConfigError {
    fn invalid(field: &str, value: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}
