use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classify::{check_threshold, TensorLayout};
use crate::{CONFIDENCE_THRESHOLD, NUM_CLASSES};

const DEFAULT_MODEL_PATH: &str = "assets/skin_disease_model.onnx";
#[cfg(feature = "backend-tract")]
const DEFAULT_BACKEND: &str = "tract";
#[cfg(not(feature = "backend-tract"))]
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_CAMERA_URL: &str = "stub://back_camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

const KNOWN_BACKENDS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    backend: Option<String>,
    confidence_threshold: Option<f32>,
    layout: Option<TensorLayout>,
    stub_scores: Option<[f32; NUM_CLASSES]>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model: ModelSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Bundled model artifact.
    pub path: PathBuf,
    /// Backend name: "stub" or "tract".
    pub backend: String,
    /// Scores below this fall back to `Healthy`.
    pub confidence_threshold: f32,
    pub layout: TensorLayout,
    /// Fixed output for the stub backend.
    pub stub_scores: Option<[f32; NUM_CLASSES]>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://<name>` or a local image file/directory.
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            backend: DEFAULT_BACKEND.to_string(),
            confidence_threshold: CONFIDENCE_THRESHOLD,
            layout: TensorLayout::default(),
            stub_scores: None,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            target_fps: DEFAULT_CAMERA_FPS,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
        }
    }
}

impl ClassifierConfig {
    /// Defaults, then the file named by `SKIN_CONFIG` (if set), then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SKIN_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as `load`, with an explicit config file instead of `SKIN_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ClassifierConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClassifierConfigFile) -> Self {
        let model_defaults = ModelSettings::default();
        let camera_defaults = CameraSettings::default();
        let model = file.model.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        Self {
            model: ModelSettings {
                path: model.path.unwrap_or(model_defaults.path),
                backend: model.backend.unwrap_or(model_defaults.backend),
                confidence_threshold: model
                    .confidence_threshold
                    .unwrap_or(model_defaults.confidence_threshold),
                layout: model.layout.unwrap_or(model_defaults.layout),
                stub_scores: model.stub_scores,
            },
            camera: CameraSettings {
                url: camera.url.unwrap_or(camera_defaults.url),
                target_fps: camera.target_fps.unwrap_or(camera_defaults.target_fps),
                width: camera.width.unwrap_or(camera_defaults.width),
                height: camera.height.unwrap_or(camera_defaults.height),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SKIN_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("SKIN_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(threshold) = std::env::var("SKIN_CONFIDENCE_THRESHOLD") {
            self.model.confidence_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("SKIN_CONFIDENCE_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Ok(layout) = std::env::var("SKIN_TENSOR_LAYOUT") {
            self.model.layout = layout.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Ok(url) = std::env::var("SKIN_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(fps) = std::env::var("SKIN_CAMERA_FPS") {
            self.camera.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("SKIN_CAMERA_FPS must be a positive integer"))?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.model.confidence_threshold)?;
        if !KNOWN_BACKENDS.contains(&self.model.backend.as_str()) {
            return Err(anyhow!(
                "unknown backend '{}' (expected one of: {})",
                self.model.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        if self.model.path.as_os_str().is_empty() {
            return Err(anyhow!("model path must not be empty"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be >= 1"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.camera.width % 2 != 0 || self.camera.height % 2 != 0 {
            return Err(anyhow!(
                "camera dimensions must be even for 4:2:0 frames, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        Ok(())
    }
}

/// Confidence thresholds must be finite and within `[0, 1]`.
pub fn validate_threshold(threshold: f32) -> Result<()> {
    check_threshold(threshold)?;
    Ok(())
}

fn read_config_file(path: &Path) -> Result<ClassifierConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
