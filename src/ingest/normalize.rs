use image::{imageops, imageops::FilterType, RgbImage};

use crate::error::PipelineError;
use crate::frame::{plane_lengths, RawFrame, RgbTensor};
use crate::{INPUT_CHANNELS, INPUT_HEIGHT, INPUT_WIDTH, TENSOR_LEN};

/// Turn one camera frame into the model input tensor.
///
/// Steps: planar 4:2:0 to packed RGB, bilinear resize to the model input
/// size, then each channel scaled by 1/255 in R,G,B pixel order.
/// The frame is consumed and its planes zeroized when this returns.
pub fn normalize(frame: RawFrame) -> Result<RgbTensor, PipelineError> {
    let rgb = yuv420_to_rgb(&frame)?;
    drop(frame);
    Ok(rgb_to_tensor(&rgb))
}

/// Direct planar-to-interleaved transform with full-range BT.601 coefficients.
pub fn yuv420_to_rgb(frame: &RawFrame) -> Result<RgbImage, PipelineError> {
    let (width, height) = (frame.width, frame.height);
    let (luma_len, chroma_len) = plane_lengths(width, height)?;
    let (y_plane, u_plane, v_plane) = frame.planes();

    let expected = luma_len + 2 * chroma_len;
    if frame.byte_len() != expected {
        return Err(PipelineError::MalformedFrame(format!(
            "plane length mismatch for {}x{}: expected {} bytes, got {}",
            width,
            height,
            expected,
            frame.byte_len()
        )));
    }
    if y_plane.len() != luma_len || u_plane.len() != chroma_len || v_plane.len() != chroma_len {
        return Err(PipelineError::MalformedFrame(format!(
            "plane split mismatch: expected {}/{}/{}, got {}/{}/{}",
            luma_len,
            chroma_len,
            chroma_len,
            y_plane.len(),
            u_plane.len(),
            v_plane.len()
        )));
    }

    let w = width as usize;
    let h = height as usize;
    let chroma_w = w / 2;
    let mut rgb = vec![0u8; luma_len * 3];
    for j in 0..h {
        for i in 0..w {
            let y = y_plane[j * w + i] as f32;
            let chroma_index = (j / 2) * chroma_w + i / 2;
            let u = u_plane[chroma_index] as f32 - 128.0;
            let v = v_plane[chroma_index] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| PipelineError::MalformedFrame("RGB buffer size mismatch".into()))
}

/// Resize to the model input and scale channels into `[0, 1]`.
pub fn rgb_to_tensor(image: &RgbImage) -> RgbTensor {
    let resized;
    let image = if image.dimensions() == (INPUT_WIDTH, INPUT_HEIGHT) {
        image
    } else {
        resized = imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);
        &resized
    };

    let mut values = Vec::with_capacity(TENSOR_LEN);
    for pixel in image.pixels() {
        for channel in 0..INPUT_CHANNELS {
            values.push(pixel[channel] as f32 / 255.0);
        }
    }
    RgbTensor::from_values(values, INPUT_WIDTH, INPUT_HEIGHT)
}

/// Inverse transform: packed RGB to a planar 4:2:0 frame.
///
/// Chroma is the average of each 2x2 block. Used by the still-image camera to
/// replay files as if they came off a sensor.
pub fn rgb_to_frame(image: &RgbImage) -> Result<RawFrame, PipelineError> {
    let (width, height) = image.dimensions();
    let (luma_len, chroma_len) = plane_lengths(width, height)?;
    let w = width as usize;
    let raw = image.as_raw();

    let mut y_plane = Vec::with_capacity(luma_len);
    for px in raw.chunks_exact(3) {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        y_plane.push(clamp_to_u8(0.299 * r + 0.587 * g + 0.114 * b));
    }

    let mut u_plane = Vec::with_capacity(chroma_len);
    let mut v_plane = Vec::with_capacity(chroma_len);
    for cj in 0..(height as usize / 2) {
        for ci in 0..(w / 2) {
            let mut sum = [0f32; 3];
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let offset = ((cj * 2 + dy) * w + ci * 2 + dx) * 3;
                sum[0] += raw[offset] as f32;
                sum[1] += raw[offset + 1] as f32;
                sum[2] += raw[offset + 2] as f32;
            }
            let (r, g, b) = (sum[0] / 4.0, sum[1] / 4.0, sum[2] / 4.0);
            u_plane.push(clamp_to_u8(-0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0));
            v_plane.push(clamp_to_u8(0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0));
        }
    }

    Ok(RawFrame::new(y_plane, u_plane, v_plane, width, height))
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
