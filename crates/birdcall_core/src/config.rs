//! TOML configuration for the classifier and the audio controller.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "BIRDCALL_CONFIG";
/// File name looked up in the working and platform config directories.
pub const CONFIG_FILE_NAME: &str = "birdcall.toml";

/// Channel order of the input tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, C]`, the Keras default.
    #[default]
    Nhwc,
    /// `[1, C, H, W]`.
    Nchw,
}

/// Configuration for the image classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    /// Labels shipped with the model; `None` uses the built-in table.
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    /// Per-channel means subtracted after RGB→BGR, in B, G, R order.
    pub bgr_mean: [f32; 3],
    pub layout: TensorLayout,
    /// Set when the model emits raw logits instead of probabilities.
    pub apply_softmax: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/bird_classifier.onnx"),
            labels_path: None,
            input_size: 224,
            bgr_mean: [103.939, 116.779, 123.68],
            layout: TensorLayout::Nhwc,
            apply_softmax: false,
        }
    }
}

/// Configuration for audio lookup and position reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sounds_dir: PathBuf,
    /// Extension appended to the sanitized species name, without the dot.
    pub extension: String,
    pub tick_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sounds_dir: PathBuf::from("Birds Sounds"),
            extension: "mp3".to_string(),
            tick_interval_ms: 200,
        }
    }
}

impl AudioConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// First existing config file: `$BIRDCALL_CONFIG`, `./birdcall.toml`,
    /// then `<config_dir>/birdcall.toml`.
    pub fn locate(config_dir: Option<&Path>) -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(explicit));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        config_dir
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .filter(|p| p.is_file())
    }

    /// Load the located config file, or fall back to defaults when there is none.
    pub fn load_or_default(config_dir: Option<&Path>) -> Result<Self> {
        match Self::locate(config_dir) {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::from_file(path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.classifier.input_size == 0 {
            return Err(Error::Config("classifier.input_size must be positive".into()));
        }
        if !(100..=250).contains(&self.audio.tick_interval_ms) {
            return Err(Error::Config(format!(
                "audio.tick_interval_ms must be within 100..=250, got {}",
                self.audio.tick_interval_ms
            )));
        }
        if self.audio.extension.trim_start_matches('.').is_empty() {
            return Err(Error::Config("audio.extension must not be empty".into()));
        }
        Ok(())
    }
}
