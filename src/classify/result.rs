use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::NUM_CLASSES;

/// Label published for one classified frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassLabel {
    Acne,
    Keratosis,
    Carcinoma,
    Rosacea,
    Eczema,
    /// No class reached the confidence threshold.
    Healthy,
}

impl ClassLabel {
    /// Model output order. Index `i` of the probability vector scores `CLASSES[i]`.
    pub const CLASSES: [ClassLabel; NUM_CLASSES] = [
        ClassLabel::Acne,
        ClassLabel::Keratosis,
        ClassLabel::Carcinoma,
        ClassLabel::Rosacea,
        ClassLabel::Eczema,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::CLASSES.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Acne => "Acne",
            ClassLabel::Keratosis => "Keratosis",
            ClassLabel::Carcinoma => "Carcinoma",
            ClassLabel::Rosacea => "Rosacea",
            ClassLabel::Eczema => "Eczema",
            ClassLabel::Healthy => "Healthy",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw model scores, one per known class, read straight from the output tensor.
///
/// Values are not renormalized and need not sum to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbabilityVector([f32; NUM_CLASSES]);

impl ProbabilityVector {
    pub fn new(scores: [f32; NUM_CLASSES]) -> Self {
        Self(scores)
    }

    /// Build from engine output. Any length other than `NUM_CLASSES` is an
    /// inference failure.
    pub fn from_scores(scores: &[f32]) -> Result<Self, PipelineError> {
        let array: [f32; NUM_CLASSES] = scores.try_into().map_err(|_| {
            PipelineError::Inference(format!(
                "model produced {} scores, expected {}",
                scores.len(),
                NUM_CLASSES
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn get(&self, label: ClassLabel) -> Option<f32> {
        ClassLabel::CLASSES
            .iter()
            .position(|known| *known == label)
            .map(|idx| self.0[idx])
    }
}

/// Outcome of one classification call.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub label: ClassLabel,
    /// Highest score in `scores`, whether or not it cleared the threshold.
    pub confidence: f32,
    pub scores: ProbabilityVector,
}

/// Memory layout the model expects for its single image input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, the layout `RgbTensor` already has.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`, channel planes.
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout '{}' (expected nhwc or nchw)", other)),
        }
    }
}
