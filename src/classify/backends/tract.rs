#![cfg(feature = "backend-tract")]

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use memmap2::Mmap;
use tract_onnx::prelude::*;

use crate::classify::backend::InferenceBackend;
use crate::classify::result::TensorLayout;
use crate::error::PipelineError;
use crate::frame::RgbTensor;
use crate::{INPUT_CHANNELS, INPUT_HEIGHT, INPUT_WIDTH};

/// Tract-based backend for ONNX inference.
///
/// The model file is memory-mapped, parsed and optimized once. It does not
/// perform any network I/O or write to disk.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    layout: TensorLayout,
}

impl TractBackend {
    /// Load an ONNX classifier expecting one 224x224 RGB image per run.
    pub fn load<P: AsRef<Path>>(model_path: P, layout: TensorLayout) -> Result<Self, PipelineError> {
        let model_path = model_path.as_ref();
        Self::load_model(model_path, layout).map_err(|e| PipelineError::ModelLoad {
            path: model_path.display().to_string(),
            reason: format!("{:#}", e),
        })
    }

    fn load_model(model_path: &Path, layout: TensorLayout) -> Result<Self> {
        let file = File::open(model_path)
            .with_context(|| format!("failed to open model {}", model_path.display()))?;
        // SAFETY: the artifact is opened read-only and is only read while mapped.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map model {}", model_path.display()))?;

        let (h, w, c) = (INPUT_HEIGHT as usize, INPUT_WIDTH as usize, INPUT_CHANNELS);
        let shape = match layout {
            TensorLayout::Nhwc => tvec!(1, h, w, c),
            TensorLayout::Nchw => tvec!(1, c, h, w),
        };

        let model = tract_onnx::onnx()
            .model_for_read(&mut &mmap[..])
            .context("failed to parse ONNX model")?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({} bytes, {:?})",
            model_path.display(),
            mmap.len(),
            layout
        );
        Ok(Self { model, layout })
    }

    fn build_input(&self, tensor: &RgbTensor) -> Result<Tensor> {
        let (h, w, c) = (INPUT_HEIGHT as usize, INPUT_WIDTH as usize, INPUT_CHANNELS);
        match self.layout {
            TensorLayout::Nhwc => Tensor::from_shape(&[1, h, w, c], tensor.as_slice())
                .context("failed to shape NHWC input"),
            TensorLayout::Nchw => Tensor::from_shape(&[1, c, h, w], &tensor.to_planar())
                .context("failed to shape NCHW input"),
        }
    }
}

/// Flatten the first model output into a score list.
fn flatten_scores(outputs: TVec<TValue>) -> Result<Vec<f32>> {
    let output = outputs
        .first()
        .ok_or_else(|| anyhow!("model produced no outputs"))?;
    let scores = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    Ok(scores.iter().copied().collect())
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, tensor: &RgbTensor) -> Result<Vec<f32>> {
        let input = self.build_input(tensor)?;
        let outputs = self
            .model
            .run(tvec!(input.into_tvalue()))
            .context("ONNX inference failed")?;
        flatten_scores(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbTensor::from_values(
            vec![0.0; crate::TENSOR_LEN],
            INPUT_WIDTH,
            INPUT_HEIGHT,
        );
        let scores = self.infer(&blank).context("warm-up inference failed")?;
        log::debug!("TractBackend: warm-up produced {} scores", scores.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TractBackend::load(dir.path().join("absent.onnx"), TensorLayout::Nhwc)
            .err()
            .unwrap();
        match err {
            PipelineError::ModelLoad { path, reason } => {
                assert!(path.ends_with("absent.onnx"));
                assert!(reason.contains("failed to open model"));
            }
            other => panic!("expected model load error, got {:?}", other),
        }
    }

    #[test]
    fn garbage_model_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();
        let err = TractBackend::load(&path, TensorLayout::Nhwc).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn scores_are_flattened_from_first_output() {
        let output = tract_ndarray::arr2(&[[0.1f32, 0.2, 0.3, 0.4, 0.5]]).into_tensor();
        let scores = flatten_scores(tvec!(output.into_tvalue())).unwrap();
        assert_eq!(scores, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        assert!(flatten_scores(tvec!()).is_err());
    }

    /// Minimal protobuf writer for building ONNX fixtures in memory.
    struct Proto(Vec<u8>);

    impl Proto {
        fn new() -> Self {
            Proto(Vec::new())
        }

        fn varint(&mut self, mut value: u64) {
            loop {
                let byte = (value & 0x7f) as u8;
                value >>= 7;
                if value == 0 {
                    self.0.push(byte);
                    return;
                }
                self.0.push(byte | 0x80);
            }
        }

        fn int(mut self, field: u64, value: i64) -> Self {
            self.varint(field << 3);
            self.varint(value as u64);
            self
        }

        fn bytes(mut self, field: u64, data: &[u8]) -> Self {
            self.varint(field << 3 | 2);
            self.varint(data.len() as u64);
            self.0.extend_from_slice(data);
            self
        }

        fn string(self, field: u64, value: &str) -> Self {
            self.bytes(field, value.as_bytes())
        }

        fn message(self, field: u64, message: Proto) -> Self {
            self.bytes(field, &message.0)
        }

        fn floats(self, field: u64, values: &[f32]) -> Self {
            let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            self.bytes(field, &raw)
        }
    }

    fn float_value_info(name: &str, dims: &[i64]) -> Proto {
        let shape = dims
            .iter()
            .fold(Proto::new(), |shape, &dim| shape.message(1, Proto::new().int(1, dim)));
        let tensor_type = Proto::new().int(1, 1).message(2, shape);
        Proto::new()
            .string(1, name)
            .message(2, Proto::new().message(1, tensor_type))
    }

    /// ONNX model that averages each color channel over the image and maps
    /// R, G, B onto the first three classes.
    fn mean_color_model(spatial_axes: [i64; 2], input_dims: [i64; 4]) -> Vec<u8> {
        let weights = [
            1.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, 0.0,
        ];
        let initializer = Proto::new()
            .int(1, 3)
            .int(1, 5)
            .int(2, 1)
            .floats(4, &weights)
            .string(8, "weights");
        let axes = Proto::new()
            .string(1, "axes")
            .int(8, spatial_axes[0])
            .int(8, spatial_axes[1])
            .int(20, 7);
        let keepdims = Proto::new().string(1, "keepdims").int(3, 0).int(20, 2);
        let reduce = Proto::new()
            .string(1, "input")
            .string(2, "mean")
            .string(3, "reduce")
            .string(4, "ReduceMean")
            .message(5, axes)
            .message(5, keepdims);
        let project = Proto::new()
            .string(1, "mean")
            .string(1, "weights")
            .string(2, "scores")
            .string(3, "project")
            .string(4, "MatMul");
        let graph = Proto::new()
            .message(1, reduce)
            .message(1, project)
            .string(2, "mean_color")
            .message(5, initializer)
            .message(11, float_value_info("input", &input_dims))
            .message(12, float_value_info("scores", &[1, 5]));
        Proto::new()
            .int(1, 7)
            .string(2, "skin-classifier-tests")
            .message(7, graph)
            .message(8, Proto::new().string(1, "").int(2, 13))
            .0
    }

    #[test]
    fn runs_onnx_model_in_both_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = INPUT_WIDTH as usize * INPUT_HEIGHT as usize;
        let tensor =
            RgbTensor::from_values([0.9f32, 0.1, 0.2].repeat(pixels), INPUT_WIDTH, INPUT_HEIGHT);
        let expected = [0.9f32, 0.1, 0.2, 0.0, 0.0];

        for (layout, axes, dims) in [
            (TensorLayout::Nhwc, [1, 2], [1, 224, 224, 3]),
            (TensorLayout::Nchw, [2, 3], [1, 3, 224, 224]),
        ] {
            let path = dir.path().join(format!("mean_color_{:?}.onnx", layout));
            std::fs::write(&path, mean_color_model(axes, dims)).unwrap();

            let mut backend = TractBackend::load(&path, layout).unwrap();
            backend.warm_up().unwrap();
            let scores = backend.infer(&tensor).unwrap();
            assert_eq!(scores.len(), crate::NUM_CLASSES, "{:?}", layout);
            for (got, want) in scores.iter().zip(expected) {
                assert!((got - want).abs() < 1e-3, "{:?}: {:?}", layout, scores);
            }

            let classifier = crate::Classifier::new(backend);
            assert_eq!(
                classifier.classify_label(&tensor).unwrap(),
                crate::ClassLabel::Acne
            );
        }
    }
}
