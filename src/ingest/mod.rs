//! Frame ingestion.
//!
//! This module provides:
//! - `normalize`: planar frame to model tensor (the frame normalizer)
//! - `CameraSource`: the camera collaborator seam (`start`, `stop`, per-frame callback)
//! - `SyntheticCamera`: generated frames for `stub://` URLs
//! - `StillImageCamera`: replays image files as camera frames
//!
//! Cameras own their capture thread. They hand every frame to the callback and
//! keep no reference to it afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::CameraSettings;
use crate::error::PipelineError;
use crate::frame::RawFrame;

pub mod normalize;
pub mod still;
pub mod synthetic;

pub use normalize::{normalize, rgb_to_frame, rgb_to_tensor, yuv420_to_rgb};
pub use still::{StillImageCamera, StillImageConfig};
pub use synthetic::{SyntheticCamera, SyntheticConfig};

/// Per-frame callback registered with a camera.
pub type FrameCallback = Box<dyn FnMut(RawFrame) + Send + 'static>;

/// Camera collaborator.
///
/// The host lifecycle decides when to call `start` and `stop`; the core only
/// sees frames arriving through the callback.
pub trait CameraSource: Send {
    /// Source identifier, used in logs.
    fn name(&self) -> &str;

    /// Begin delivering frames to `on_frame`.
    ///
    /// Fails with `PermissionDenied` when the host refuses camera access.
    fn start(&mut self, on_frame: FrameCallback) -> Result<(), PipelineError>;

    /// Stop delivering frames. Stopping a stopped camera is a no-op.
    fn stop(&mut self) -> Result<(), PipelineError>;

    fn is_running(&self) -> bool;
}

/// Open the camera described by `settings`.
///
/// `stub://` URLs give a synthetic camera; anything else is treated as a local
/// image file or directory to replay.
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn CameraSource>, PipelineError> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(SyntheticConfig {
            url: settings.url.clone(),
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
            ..SyntheticConfig::default()
        })?));
    }
    if settings.url.contains("://") {
        return Err(PipelineError::Camera(format!(
            "unsupported camera url {} (expected stub:// or a local path)",
            settings.url
        )));
    }
    Ok(Box::new(StillImageCamera::new(StillImageConfig {
        path: settings.url.clone().into(),
        target_fps: settings.target_fps,
        repeat: true,
    })?))
}

// ----------------------------------------------------------------------------
// Capture thread shared by the built-in cameras
// ----------------------------------------------------------------------------

/// Background thread calling a frame producer at a fixed rate.
struct CaptureLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl CaptureLoop {
    /// Spawn the capture thread.
    ///
    /// `produce` returns `None` when the source is exhausted, which ends the
    /// loop. The thread returns the number of frames delivered.
    fn spawn<P>(
        name: &str,
        target_fps: u32,
        mut produce: P,
        mut on_frame: FrameCallback,
    ) -> Result<Self, PipelineError>
    where
        P: FnMut(u64) -> Option<RawFrame> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);
        let handle = std::thread::Builder::new()
            .name(format!("capture-{}", name))
            .spawn(move || {
                let mut delivered = 0u64;
                while !stop_flag.load(Ordering::Acquire) {
                    let Some(frame) = produce(delivered) else {
                        break;
                    };
                    on_frame(frame);
                    delivered += 1;
                    std::thread::sleep(interval);
                }
                delivered
            })
            .map_err(|e| PipelineError::Camera(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn stop(&mut self) -> Result<u64, PipelineError> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PipelineError::Camera("capture thread panicked".into())),
            None => Ok(0),
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
