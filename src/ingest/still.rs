//! Still-image camera.
//!
//! Replays a local image file, or every JPEG/PNG in a directory, as a stream of
//! planar 4:2:0 frames. Images are decoded once when the camera is created and
//! cropped to even dimensions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{imageops, RgbImage};

use super::normalize::rgb_to_frame;
use super::{CameraSource, CaptureLoop, FrameCallback};
use crate::error::PipelineError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Configuration for a still-image camera.
#[derive(Clone, Debug)]
pub struct StillImageConfig {
    /// Image file or directory of images.
    pub path: PathBuf,
    pub target_fps: u32,
    /// Loop over the images until stopped instead of ending after one pass.
    pub repeat: bool,
}

impl Default for StillImageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            target_fps: 2,
            repeat: false,
        }
    }
}

pub struct StillImageCamera {
    config: StillImageConfig,
    name: String,
    images: Arc<Vec<RgbImage>>,
    capture: Option<CaptureLoop>,
}

impl StillImageCamera {
    pub fn new(config: StillImageConfig) -> Result<Self, PipelineError> {
        let paths = image_paths(&config.path)?;
        let mut images = Vec::with_capacity(paths.len());
        for path in &paths {
            images.push(load_even_rgb(path)?);
        }
        if images.is_empty() {
            return Err(PipelineError::Camera(format!(
                "no images found under {}",
                config.path.display()
            )));
        }
        log::debug!(
            "StillImageCamera: loaded {} image(s) from {}",
            images.len(),
            config.path.display()
        );
        Ok(Self {
            name: config.path.display().to_string(),
            config,
            images: Arc::new(images),
            capture: None,
        })
    }

    /// Number of images in one replay pass.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl CameraSource for StillImageCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, on_frame: FrameCallback) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::Camera(format!("{} is already running", self.name)));
        }
        let images = self.images.clone();
        let repeat = self.config.repeat;
        let capture = CaptureLoop::spawn(
            "still",
            self.config.target_fps,
            move |delivered| {
                let count = images.len() as u64;
                if !repeat && delivered >= count {
                    return None;
                }
                let image = &images[(delivered % count) as usize];
                match rgb_to_frame(image) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        log::warn!("StillImageCamera: failed to build frame: {}", e);
                        None
                    }
                }
            },
            on_frame,
        )?;
        self.capture = Some(capture);
        log::info!("StillImageCamera: replaying {}", self.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        if let Some(mut capture) = self.capture.take() {
            let delivered = capture.stop()?;
            log::info!(
                "StillImageCamera: stopped {} after {} frames",
                self.name,
                delivered
            );
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_running())
    }
}

impl Drop for StillImageCamera {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Decode an image and crop it to even width and height.
pub fn load_even_rgb(path: &Path) -> Result<RgbImage, PipelineError> {
    let image = image::open(path)
        .map_err(|e| PipelineError::Camera(format!("failed to decode {}: {}", path.display(), e)))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    let (even_w, even_h) = (width & !1, height & !1);
    if even_w == 0 || even_h == 0 {
        return Err(PipelineError::Camera(format!(
            "{} is too small ({}x{})",
            path.display(),
            width,
            height
        )));
    }
    if (even_w, even_h) == (width, height) {
        return Ok(image);
    }
    Ok(imageops::crop_imm(&image, 0, 0, even_w, even_h).to_image())
}

fn image_paths(path: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if path.as_os_str().is_empty() {
        return Err(PipelineError::Camera("image path is empty".into()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = std::fs::read_dir(path)
        .map_err(|e| PipelineError::Camera(format!("failed to read {}: {}", path.display(), e)))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
