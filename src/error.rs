use thiserror::Error;

/// Failures raised while turning camera frames into labels.
///
/// Only `ModelLoad` and `PermissionDenied` stop the feature. Frame-level
/// errors drop that frame and the pipeline keeps running. `InvalidThreshold`
/// is raised while building the classifier, before any frame flows.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Plane sizes do not describe a 4:2:0 frame of the declared dimensions.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Tensor handed to the classifier does not have the model input shape.
    #[error("tensor shape mismatch: expected {expected:?} ({expected_len} values), got {actual:?} ({actual_len} values)")]
    ShapeMismatch {
        expected: [usize; 3],
        expected_len: usize,
        actual: [usize; 3],
        actual_len: usize,
    },

    /// Model artifact missing, unreadable or rejected by the engine.
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    /// Inference engine failed or produced an unusable output.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Host refused camera access.
    #[error("camera permission denied for {0}")]
    PermissionDenied(String),

    /// Camera collaborator failed for a reason other than permission.
    #[error("camera error: {0}")]
    Camera(String),

    /// Confidence threshold is NaN, infinite or outside `[0, 1]`.
    #[error("confidence threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),
}

impl PipelineError {
    /// True when the feature cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelLoad { .. } | PipelineError::PermissionDenied(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_model_load_and_permission_are_fatal() {
        let model = PipelineError::ModelLoad {
            path: "model.onnx".into(),
            reason: "missing".into(),
        };
        assert!(model.is_fatal());
        assert!(PipelineError::PermissionDenied("stub://cam".into()).is_fatal());

        assert!(!PipelineError::MalformedFrame("short".into()).is_fatal());
        assert!(!PipelineError::Inference("engine".into()).is_fatal());
        assert!(!PipelineError::Camera("closed".into()).is_fatal());
        assert!(!PipelineError::InvalidThreshold(f32::NAN).is_fatal());
        assert!(!PipelineError::ShapeMismatch {
            expected: [224, 224, 3],
            expected_len: 150_528,
            actual: [10, 10, 3],
            actual_len: 300,
        }
        .is_fatal());
    }

    #[test]
    fn messages_name_the_failure() {
        let err = PipelineError::ModelLoad {
            path: "assets/skin_disease_model.onnx".into(),
            reason: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to load model assets/skin_disease_model.onnx: No such file or directory"
        );
    }
}
