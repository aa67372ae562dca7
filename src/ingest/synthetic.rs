//! Synthetic camera for `stub://` URLs.
//!
//! Produces planar 4:2:0 frames of a skin-toned background with a darker,
//! redder patch that drifts across the image, plus a little sensor noise.
//! Used by tests and by the daemon when no real camera is wired in.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CameraSource, CaptureLoop, FrameCallback};
use crate::error::PipelineError;
use crate::frame::{plane_lengths, RawFrame};

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL (e.g., "stub://back_camera").
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second delivered to the callback.
    pub target_fps: u32,
    /// Simulates the host granting or refusing camera access.
    pub permission_granted: bool,
    /// Stop after this many frames. `None` runs until `stop`.
    pub max_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://back_camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
            permission_granted: true,
            max_frames: None,
        }
    }
}

/// Camera that generates frames instead of reading a sensor.
pub struct SyntheticCamera {
    config: SyntheticConfig,
    capture: Option<CaptureLoop>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Result<Self, PipelineError> {
        if !config.url.starts_with("stub://") {
            return Err(PipelineError::Camera(format!(
                "synthetic camera requires a stub:// url, got {}",
                config.url
            )));
        }
        plane_lengths(config.width, config.height)
            .map_err(|e| PipelineError::Camera(format!("invalid synthetic frame size: {}", e)))?;
        Ok(Self {
            config,
            capture: None,
        })
    }
}

impl CameraSource for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn start(&mut self, on_frame: FrameCallback) -> Result<(), PipelineError> {
        if !self.config.permission_granted {
            log::error!("SyntheticCamera: camera permission denied for {}", self.config.url);
            return Err(PipelineError::PermissionDenied(self.config.url.clone()));
        }
        if self.is_running() {
            return Err(PipelineError::Camera(format!(
                "{} is already running",
                self.config.url
            )));
        }

        let mut scene = SyntheticScene::new(self.config.width, self.config.height);
        let max_frames = self.config.max_frames;
        let capture = CaptureLoop::spawn(
            self.config.url.trim_start_matches("stub://"),
            self.config.target_fps,
            move |delivered| {
                if max_frames.is_some_and(|max| delivered >= max) {
                    return None;
                }
                Some(scene.next_frame())
            },
            on_frame,
        )?;
        self.capture = Some(capture);
        log::info!(
            "SyntheticCamera: started {} ({}x{} @ {} fps)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        if let Some(mut capture) = self.capture.take() {
            let delivered = capture.stop()?;
            log::info!(
                "SyntheticCamera: stopped {} after {} frames",
                self.config.url,
                delivered
            );
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_running())
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Frame generator state.
struct SyntheticScene {
    width: u32,
    height: u32,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticScene {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_count: 0,
            rng: StdRng::from_entropy(),
        }
    }

    fn next_frame(&mut self) -> RawFrame {
        self.frame_count += 1;
        let w = self.width as usize;
        let h = self.height as usize;

        // Patch is a quarter of the frame wide and drifts two columns per frame.
        let patch = (w / 4).max(2);
        let patch_x = (self.frame_count as usize * 2) % (w - patch + 1);
        let patch_y = (h - patch.min(h)) / 2;
        let in_patch = |x: usize, y: usize| {
            x >= patch_x && x < patch_x + patch && y >= patch_y && y < patch_y + patch
        };

        let mut y_plane = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let base: i16 = if in_patch(x, y) { 110 } else { 172 };
                let noise: i16 = self.rng.gen_range(-4..=4);
                y_plane.push((base + noise).clamp(0, 255) as u8);
            }
        }

        let mut u_plane = Vec::with_capacity(w * h / 4);
        let mut v_plane = Vec::with_capacity(w * h / 4);
        for cy in 0..h / 2 {
            for cx in 0..w / 2 {
                if in_patch(cx * 2, cy * 2) {
                    u_plane.push(112);
                    v_plane.push(176);
                } else {
                    u_plane.push(118);
                    v_plane.push(146);
                }
            }
        }

        RawFrame::new(y_plane, u_plane, v_plane, self.width, self.height)
    }
}
