use std::sync::Mutex;

use crate::config::ModelSettings;
use crate::error::PipelineError;
use crate::frame::RgbTensor;
use crate::CONFIDENCE_THRESHOLD;

use super::backend::InferenceBackend;
use super::backends::build_backend;
use super::result::{ClassLabel, Classification, ProbabilityVector};

/// Loaded model plus the decision policy that turns its scores into a label.
///
/// The backend sits behind a mutex: the model is shared read-only, but calls
/// into the engine are serialized.
pub struct Classifier {
    backend: Mutex<Box<dyn InferenceBackend>>,
    backend_name: &'static str,
    threshold: f32,
}

impl Classifier {
    pub fn new<B: InferenceBackend + 'static>(backend: B) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend_name: backend.name(),
            backend: Mutex::new(backend),
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    /// Build the configured backend, load its model and warm it up.
    ///
    /// Every failure here is a `ModelLoad` error: the feature cannot run.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, PipelineError> {
        let classifier = Self::from_boxed(build_backend(settings)?)
            .with_threshold(settings.confidence_threshold)?;
        classifier
            .warm_up()
            .map_err(|e| PipelineError::ModelLoad {
                path: settings.path.display().to_string(),
                reason: e.to_string(),
            })?;
        log::info!(
            "classifier ready: backend={} threshold={:.2} model={}",
            classifier.backend_name,
            classifier.threshold,
            settings.path.display()
        );
        Ok(classifier)
    }

    /// Override the default confidence threshold.
    ///
    /// A NaN threshold would never report `Healthy`, so only finite values in
    /// `[0, 1]` are accepted.
    pub fn with_threshold(mut self, threshold: f32) -> Result<Self, PipelineError> {
        self.threshold = check_threshold(threshold)?;
        Ok(self)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn warm_up(&self) -> Result<(), PipelineError> {
        let mut backend = self
            .backend
            .lock()
            .map_err(|_| PipelineError::Inference("backend lock poisoned".into()))?;
        backend
            .warm_up()
            .map_err(|e| PipelineError::Inference(format!("{:#}", e)))
    }

    /// Run one tensor through the model and apply the decision rule.
    pub fn classify(&self, tensor: &RgbTensor) -> Result<Classification, PipelineError> {
        tensor.ensure_model_shape()?;

        let raw = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| PipelineError::Inference("backend lock poisoned".into()))?;
            backend
                .infer(tensor)
                .map_err(|e| PipelineError::Inference(format!("{:#}", e)))?
        };
        let scores = ProbabilityVector::from_scores(&raw)?;
        log::debug!("model scores: {:?}", scores.as_slice());

        Ok(decide(&scores, self.threshold))
    }

    /// Same as `classify`, returning only the label.
    pub fn classify_label(&self, tensor: &RgbTensor) -> Result<ClassLabel, PipelineError> {
        self.classify(tensor).map(|c| c.label)
    }
}

/// Returns `threshold` if it is finite and within `[0, 1]`.
pub fn check_threshold(threshold: f32) -> Result<f32, PipelineError> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(PipelineError::InvalidThreshold(threshold))
    }
}

/// Index of the highest score. Ties go to the lowest index; NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Apply the threshold policy: the top class wins unless its score is below
/// `threshold`, in which case the frame is `Healthy`.
pub fn decide(scores: &ProbabilityVector, threshold: f32) -> Classification {
    let Some(idx) = argmax(scores.as_slice()) else {
        return Classification {
            label: ClassLabel::Healthy,
            confidence: 0.0,
            scores: *scores,
        };
    };
    let confidence = scores.as_slice()[idx];
    let label = if confidence < threshold {
        ClassLabel::Healthy
    } else {
        ClassLabel::from_index(idx).unwrap_or(ClassLabel::Healthy)
    };
    Classification {
        label,
        confidence,
        scores: *scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StubBackend;
    use crate::{INPUT_HEIGHT, INPUT_WIDTH, TENSOR_LEN};
    use anyhow::anyhow;

    fn label_for(scores: [f32; 5]) -> ClassLabel {
        decide(&ProbabilityVector::new(scores), CONFIDENCE_THRESHOLD).label
    }

    fn model_tensor(value: f32) -> RgbTensor {
        RgbTensor::from_values(vec![value; TENSOR_LEN], INPUT_WIDTH, INPUT_HEIGHT)
    }

    #[test]
    fn threshold_is_strictly_less_than() {
        assert_eq!(label_for([0.4999, 0.1, 0.1, 0.1, 0.1]), ClassLabel::Healthy);
        assert_eq!(label_for([0.5, 0.1, 0.1, 0.1, 0.1]), ClassLabel::Acne);
        assert_eq!(label_for([0.0, 0.0, 0.0, 0.0, 0.5]), ClassLabel::Eczema);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        assert_eq!(label_for([0.6, 0.6, 0.0, 0.0, 0.0]), ClassLabel::Acne);
        assert_eq!(label_for([0.0, 0.0, 0.7, 0.7, 0.7]), ClassLabel::Carcinoma);
    }

    #[test]
    fn nan_scores_never_win() {
        assert_eq!(label_for([f32::NAN, 0.8, 0.0, 0.0, 0.0]), ClassLabel::Keratosis);
        let all_nan = decide(&ProbabilityVector::new([f32::NAN; 5]), 0.5);
        assert_eq!(all_nan.label, ClassLabel::Healthy);
        assert_eq!(all_nan.confidence, 0.0);
    }

    #[test]
    fn uniform_low_scores_are_healthy() {
        assert_eq!(label_for([0.1; 5]), ClassLabel::Healthy);
        assert_eq!(label_for([0.9, 0.05, 0.02, 0.02, 0.01]), ClassLabel::Acne);
    }

    #[test]
    fn custom_threshold_moves_the_cutoff() {
        let scores = ProbabilityVector::new([0.0, 0.0, 0.0, 0.3, 0.0]);
        assert_eq!(decide(&scores, 0.5).label, ClassLabel::Healthy);
        assert_eq!(decide(&scores, 0.25).label, ClassLabel::Rosacea);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        for bad in [f32::NAN, f32::INFINITY, -3.0, -0.01, 1.5] {
            let result = Classifier::new(StubBackend::new([0.01, 0.0, 0.0, 0.0, 0.0]))
                .with_threshold(bad);
            assert!(
                matches!(result, Err(PipelineError::InvalidThreshold(_))),
                "threshold {} was accepted",
                bad
            );
        }
    }

    #[test]
    fn boundary_thresholds_are_accepted() {
        let strict = Classifier::new(StubBackend::new([0.01, 0.0, 0.0, 0.0, 0.0]))
            .with_threshold(1.0)
            .unwrap();
        assert_eq!(
            strict.classify_label(&model_tensor(0.5)).unwrap(),
            ClassLabel::Healthy
        );

        let permissive = Classifier::new(StubBackend::new([0.01, 0.0, 0.0, 0.0, 0.0]))
            .with_threshold(0.0)
            .unwrap();
        assert_eq!(
            permissive.classify_label(&model_tensor(0.5)).unwrap(),
            ClassLabel::Acne
        );
    }

    #[test]
    fn classify_rejects_wrong_shape() {
        let classifier = Classifier::new(StubBackend::new([0.9, 0.0, 0.0, 0.0, 0.0]));
        let tensor = RgbTensor::from_values(vec![0.5; 300], 10, 10);
        let err = classifier.classify(&tensor).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
        assert_eq!(classifier.backend_name(), "stub");
    }

    #[test]
    fn classify_is_deterministic() {
        let classifier = Classifier::new(StubBackend::new([0.2, 0.7, 0.05, 0.03, 0.02]));
        let tensor = model_tensor(0.25);
        let first = classifier.classify(&tensor).unwrap();
        for _ in 0..5 {
            assert_eq!(classifier.classify(&tensor).unwrap(), first);
        }
        assert_eq!(first.label, ClassLabel::Keratosis);
        assert_eq!(first.confidence, 0.7);
    }

    struct ShortOutput;

    impl InferenceBackend for ShortOutput {
        fn name(&self) -> &'static str {
            "short"
        }

        fn infer(&mut self, _tensor: &RgbTensor) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.9, 0.1])
        }
    }

    struct Failing;

    impl InferenceBackend for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn infer(&mut self, _tensor: &RgbTensor) -> anyhow::Result<Vec<f32>> {
            Err(anyhow!("delegate crashed"))
        }

        fn warm_up(&mut self) -> anyhow::Result<()> {
            Err(anyhow!("no device"))
        }
    }

    #[test]
    fn engine_problems_surface_as_inference_errors() {
        let short = Classifier::new(ShortOutput);
        assert!(matches!(
            short.classify(&model_tensor(0.0)),
            Err(PipelineError::Inference(_))
        ));

        let failing = Classifier::new(Failing);
        match failing.classify(&model_tensor(0.0)) {
            Err(PipelineError::Inference(msg)) => assert!(msg.contains("delegate crashed")),
            other => panic!("expected inference error, got {:?}", other),
        }
        assert!(failing.warm_up().is_err());
    }
}
