//! Skin condition classifier core
//!
//! Turns live camera frames into a label string using a pretrained on-device
//! image classifier.
//!
//! # Architecture
//!
//! ```text
//! CameraSource --RawFrame--> LatestFrameSlot --> worker: normalize -> Classifier
//!                                                         |
//!                                   DisplaySink <-- "Result: <label>"
//! ```
//!
//! 1. **Frame Normalizer** (`ingest::normalize`): planar 4:2:0 frame to a
//!    224x224 RGB tensor with channels in `[0, 1]`.
//! 2. **Classifier** (`classify`): runs the model once per tensor and maps its
//!    five scores to a label using a confidence threshold.
//! 3. **Pipeline** (`pipeline`): one worker thread, keep-only-latest
//!    backpressure, per-frame errors never stop the loop.
//!
//! # Module Structure
//!
//! - `frame`: `RawFrame` and `RgbTensor`
//! - `ingest`: normalizer and camera collaborators
//! - `classify`: inference backends and the decision rule
//! - `pipeline`: worker, frame slot, stats
//! - `display`: result sinks
//! - `config`: file + environment settings

pub mod classify;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use classify::{
    argmax, decide, ClassLabel, Classification, Classifier, InferenceBackend, ProbabilityVector,
    StubBackend, TensorLayout,
};
#[cfg(feature = "backend-tract")]
pub use classify::TractBackend;
pub use config::{CameraSettings, ClassifierConfig, ModelSettings};
pub use display::{ChannelDisplay, DisplaySink, LatestLabel, LogDisplay};
pub use error::PipelineError;
pub use frame::{RawFrame, RgbTensor};
pub use ingest::{
    normalize, open_camera, CameraSource, FrameCallback, StillImageCamera, StillImageConfig,
    SyntheticCamera, SyntheticConfig,
};
pub use pipeline::{
    process_frame, FrameSubmitter, LatestFrameSlot, Pipeline, PipelineStats, SubmitOutcome,
};

/// Model input width in pixels.
pub const INPUT_WIDTH: u32 = 224;
/// Model input height in pixels.
pub const INPUT_HEIGHT: u32 = 224;
/// Channels per pixel (R, G, B).
pub const INPUT_CHANNELS: usize = 3;
/// Values in one model input tensor: 224 * 224 * 3.
pub const TENSOR_LEN: usize = INPUT_WIDTH as usize * INPUT_HEIGHT as usize * INPUT_CHANNELS;

/// Number of conditions the model scores.
pub const NUM_CLASSES: usize = 5;

/// Default cutoff: a top score below this is reported as `Healthy`.
///
/// This is a fixed policy constant, not a calibrated probability. Override it
/// with `model.confidence_threshold` or `SKIN_CONFIDENCE_THRESHOLD`.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Text handed to the display for one classified frame.
pub fn format_result(label: ClassLabel) -> String {
    format!("Result: {}", label)
}
