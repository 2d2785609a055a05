//! Model registry for the supported Hailo accelerators

use crate::error::{HailoCamError, HailoCamResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory, relative to the installation root, holding the `.hef` files
pub const RESOURCES_DIR: &str = "resources";

const HAILO8_MODELS: &[(&str, &str)] = &[
    ("yolov5m", "resources/yolov5m_wo_spp.hef"),
    ("yolov8s", "resources/yolov8s.hef"),
    ("yolov8m", "resources/yolov8m.hef"),
    ("yolov6n", "resources/yolov6n.hef"),
];

const HAILO8L_MODELS: &[(&str, &str)] = &[
    ("yolov8s", "resources/yolov8s_h8l.hef"),
    ("yolov6n", "resources/yolov6n.hef"),
    ("yolox_s", "resources/yolox_s_leaky_h8l_mz.hef"),
];

/// Accelerator hardware the model was compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareVariant {
    /// Hailo-8
    #[default]
    Hailo8,
    /// Hailo-8L
    Hailo8L,
}

impl HardwareVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareVariant::Hailo8 => "hailo8",
            HardwareVariant::Hailo8L => "hailo8l",
        }
    }

    /// Registry entries for this variant, in declaration order
    pub fn models(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            HardwareVariant::Hailo8 => HAILO8_MODELS,
            HardwareVariant::Hailo8L => HAILO8L_MODELS,
        }
    }

    /// Names of the models available for this variant
    pub fn model_names(&self) -> Vec<&'static str> {
        self.models().iter().map(|(name, _)| *name).collect()
    }
}

impl fmt::Display for HardwareVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look up the installation-relative resource path of `model`.
pub fn relative_path(model: &str, hardware: HardwareVariant) -> HailoCamResult<&'static str> {
    hardware
        .models()
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, path)| *path)
        .ok_or_else(|| HailoCamError::Configuration {
            model: model.to_string(),
            hardware: hardware.to_string(),
            available: hardware
                .model_names()
                .into_iter()
                .map(String::from)
                .collect(),
        })
}

/// Absolute HEF path of `model` under `install_dir`. A relative
/// `install_dir` is taken from the current directory.
pub fn hef_path(
    model: &str,
    hardware: HardwareVariant,
    install_dir: &Path,
) -> HailoCamResult<PathBuf> {
    let path = install_dir.join(relative_path(model, hardware)?);
    Ok(std::path::absolute(path)?)
}

/// Resolve `model` to an absolute HEF path under `install_dir` and check the
/// file is present.
pub fn resolve_hef(
    model: &str,
    hardware: HardwareVariant,
    install_dir: &Path,
) -> HailoCamResult<PathBuf> {
    let hef_path = hef_path(model, hardware, install_dir)?;
    if !hef_path.is_file() {
        return Err(HailoCamError::ResourceNotFound(hef_path));
    }
    Ok(hef_path)
}

/// Installation root derived from the running executable: the parent of the
/// directory containing it.
pub fn default_install_dir() -> HailoCamResult<PathBuf> {
    let exe = std::env::current_exe()?;
    let exe_dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(exe_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| exe_dir.to_path_buf()))
}
