use anyhow::Result;

use crate::classify::backend::InferenceBackend;
use crate::frame::RgbTensor;
use crate::NUM_CLASSES;

/// Stub backend for testing. Returns the same scores for every tensor.
pub struct StubBackend {
    scores: [f32; NUM_CLASSES],
}

impl StubBackend {
    pub fn new(scores: [f32; NUM_CLASSES]) -> Self {
        Self { scores }
    }
}

impl Default for StubBackend {
    /// Uniform low scores, which always classify as `Healthy`.
    fn default() -> Self {
        Self::new([0.1; NUM_CLASSES])
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, _tensor: &RgbTensor) -> Result<Vec<f32>> {
        Ok(self.scores.to_vec())
    }
}
