use anyhow::Result;

use crate::frame::RgbTensor;

/// Inference engine seam.
///
/// A backend wraps one loaded model. `infer` takes `&mut self` because engines
/// are not assumed to be reentrant; the `Classifier` serializes calls.
///
/// Implementations receive the tensor read-only and must not keep it past the
/// call.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model and return its raw output scores, one per class.
    fn infer(&mut self, tensor: &RgbTensor) -> Result<Vec<f32>>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
