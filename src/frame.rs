//! Frame and tensor containers.
//!
//! - `RawFrame`: opaque planar 4:2:0 frame as delivered by a camera. Planes are
//!   private, the type is not `Clone`, and bytes are zeroized on drop.
//! - `RgbTensor`: flattened, normalized model input built from one frame.
//!
//! A `RawFrame` is consumed exactly once, by `ingest::normalize`.

use std::time::Instant;

use zeroize::Zeroize;

use crate::error::PipelineError;
use crate::{INPUT_CHANNELS, INPUT_HEIGHT, INPUT_WIDTH, TENSOR_LEN};

// ----------------------------------------------------------------------------
// RawFrame: planar luma/chroma container
// ----------------------------------------------------------------------------

/// One captured camera image in planar Y/U/V form.
///
/// Plane 0 is luma, plane 1 is the blue-difference chroma (U, Cb) and plane 2
/// the red-difference chroma (V, Cr), each tightly packed with no row padding.
/// Dimensions are public; pixel bytes are not.
pub struct RawFrame {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Monotonic capture instant, used for latency logging only.
    captured_at: Instant,
}

// Explicitly NOT implementing Clone: a frame is handed to the normalizer once.

impl RawFrame {
    /// Wrap three planes from a camera. Sizes are checked by the normalizer,
    /// not here, so a collaborator can hand over whatever it captured.
    pub fn new(y: Vec<u8>, u: Vec<u8>, v: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            y,
            u,
            v,
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    /// Split an NV21 buffer (luma followed by interleaved V,U pairs) into planes.
    pub fn from_nv21(bytes: &[u8], width: u32, height: u32) -> Result<Self, PipelineError> {
        let (luma_len, chroma_len) = plane_lengths(width, height)?;
        let expected = luma_len + 2 * chroma_len;
        if bytes.len() != expected {
            return Err(PipelineError::MalformedFrame(format!(
                "NV21 buffer length mismatch: expected {}, got {}",
                expected,
                bytes.len()
            )));
        }

        let (luma, chroma) = bytes.split_at(luma_len);
        let mut u = Vec::with_capacity(chroma_len);
        let mut v = Vec::with_capacity(chroma_len);
        for pair in chroma.chunks_exact(2) {
            v.push(pair[0]);
            u.push(pair[1]);
        }

        Ok(Self::new(luma.to_vec(), u, v, width, height))
    }

    /// Combined byte length of all three planes.
    pub fn byte_len(&self) -> usize {
        self.y.len() + self.u.len() + self.v.len()
    }

    pub(crate) fn planes(&self) -> (&[u8], &[u8], &[u8]) {
        (&self.y, &self.u, &self.v)
    }

    pub(crate) fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.y.zeroize();
        self.u.zeroize();
        self.v.zeroize();
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.byte_len())
            .finish()
    }
}

/// Luma and per-chroma plane lengths for a 4:2:0 frame.
///
/// Both dimensions must be non-zero and even so that the chroma planes cover
/// exactly a quarter of the luma plane each.
pub(crate) fn plane_lengths(width: u32, height: u32) -> Result<(usize, usize), PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::MalformedFrame(format!(
            "frame dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(PipelineError::MalformedFrame(format!(
            "4:2:0 frames need even dimensions, got {}x{}",
            width, height
        )));
    }
    let luma = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| PipelineError::MalformedFrame("frame dimensions overflow".into()))?;
    Ok((luma, luma / 4))
}

// ----------------------------------------------------------------------------
// RgbTensor: normalized model input
// ----------------------------------------------------------------------------

/// Row-major, pixel-interleaved (R,G,B) intensities in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbTensor {
    values: Vec<f32>,
    width: u32,
    height: u32,
}

impl RgbTensor {
    /// Wrap externally produced values. The classifier rejects anything that is
    /// not `INPUT_WIDTH` x `INPUT_HEIGHT` x 3.
    pub fn from_values(values: Vec<f32>, width: u32, height: u32) -> Self {
        Self {
            values,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Values regrouped into channel planes: all R, then all G, then all B.
    ///
    /// This is the `[C, H, W]` order channel-first models expect.
    pub fn to_planar(&self) -> Vec<f32> {
        let pixels = self.width as usize * self.height as usize;
        let mut planar = Vec::with_capacity(self.values.len());
        for channel in 0..INPUT_CHANNELS {
            planar.extend(
                (0..pixels).filter_map(|idx| self.values.get(idx * INPUT_CHANNELS + channel)),
            );
        }
        planar
    }

    /// Checks the tensor against the model input shape.
    pub fn ensure_model_shape(&self) -> Result<(), PipelineError> {
        let shape_ok = self.width == INPUT_WIDTH && self.height == INPUT_HEIGHT;
        if shape_ok && self.values.len() == TENSOR_LEN {
            return Ok(());
        }
        Err(PipelineError::ShapeMismatch {
            expected: [
                INPUT_HEIGHT as usize,
                INPUT_WIDTH as usize,
                INPUT_CHANNELS,
            ],
            expected_len: TENSOR_LEN,
            actual: [self.height as usize, self.width as usize, INPUT_CHANNELS],
            actual_len: self.values.len(),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv21_split_deinterleaves_chroma() {
        // 2x2 frame: 4 luma bytes then one V,U pair.
        let bytes = [10u8, 20, 30, 40, 200, 50];
        let frame = RawFrame::from_nv21(&bytes, 2, 2).unwrap();
        let (y, u, v) = frame.planes();
        assert_eq!(y, &[10, 20, 30, 40]);
        assert_eq!(u, &[50]);
        assert_eq!(v, &[200]);
        assert_eq!(frame.byte_len(), 6);
    }

    #[test]
    fn nv21_rejects_wrong_length() {
        let err = RawFrame::from_nv21(&[0u8; 5], 2, 2).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedFrame(_)));
    }

    #[test]
    fn plane_lengths_require_even_non_zero_dimensions() {
        assert_eq!(plane_lengths(4, 2).unwrap(), (8, 2));
        assert!(plane_lengths(0, 2).is_err());
        assert!(plane_lengths(3, 2).is_err());
        assert!(plane_lengths(2, 5).is_err());
    }

    #[test]
    fn debug_output_hides_pixels() {
        let frame = RawFrame::new(vec![7; 4], vec![8], vec![9], 2, 2);
        let rendered = format!("{:?}", frame);
        assert_eq!(rendered, "RawFrame { width: 2, height: 2, bytes: 6 }");
    }

    #[test]
    fn planar_groups_values_by_channel() {
        // 2x2 image, pixel p has (R, G, B) = (p, 10 + p, 20 + p).
        let values = vec![
            0.0, 10.0, 20.0, 1.0, 11.0, 21.0, //
            2.0, 12.0, 22.0, 3.0, 13.0, 23.0,
        ];
        let tensor = RgbTensor::from_values(values, 2, 2);
        assert_eq!(
            tensor.to_planar(),
            vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0, 20.0, 21.0, 22.0, 23.0]
        );
    }

    #[test]
    fn tensor_shape_check_reports_both_shapes() {
        let tensor = RgbTensor::from_values(vec![0.0; 12], 2, 2);
        match tensor.ensure_model_shape() {
            Err(PipelineError::ShapeMismatch {
                expected,
                expected_len,
                actual,
                actual_len,
            }) => {
                assert_eq!(expected, [224, 224, 3]);
                assert_eq!(expected_len, TENSOR_LEN);
                assert_eq!(actual, [2, 2, 3]);
                assert_eq!(actual_len, 12);
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }

        let full = RgbTensor::from_values(vec![0.0; TENSOR_LEN], INPUT_WIDTH, INPUT_HEIGHT);
        assert!(full.ensure_model_shape().is_ok());
    }
}
