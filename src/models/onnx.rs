//! ONNX Runtime mask model for the pro tier
//!
//! Owns at most one live inference session, created on the first
//! successful `ensure_loaded` and reused for every prediction. Loads are
//! single-flight: a try-lock gate serializes attempts, and a contender
//! observing a held gate fails with `WarmupPending` instead of queueing.

use crate::config::DeviceRequest;
use crate::download;
use crate::error::{CutoutError, Result};
use crate::models::MaskModel;
use crate::registry::{ModelKind, ModelSpec, OutputActivation};
use crate::status::{ModelStatus, StatusHandle};
use crate::types::AlphaMatte;
use image::DynamicImage;
use log::{debug, info, warn};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::PathBuf;
use std::sync::Mutex;

/// Neural segmentation model backed by an ONNX Runtime session
pub struct OnnxMaskModel {
    kind: ModelKind,
    model_dir: PathBuf,
    device: DeviceRequest,
    allow_remote_download: bool,
    session: Mutex<Option<Session>>,
    load_gate: Mutex<()>,
    status: StatusHandle,
}

impl std::fmt::Debug for OnnxMaskModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxMaskModel")
            .field("kind", &self.kind)
            .field("model_dir", &self.model_dir)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl OnnxMaskModel {
    /// Create an unloaded model; no file I/O happens until `ensure_loaded`
    #[must_use]
    pub fn new(
        kind: ModelKind,
        model_dir: PathBuf,
        device: DeviceRequest,
        allow_remote_download: bool,
    ) -> Self {
        Self {
            kind,
            model_dir,
            device,
            allow_remote_download,
            session: Mutex::new(None),
            load_gate: Mutex::new(()),
            status: StatusHandle::new(),
        }
    }

    fn spec(&self) -> &'static ModelSpec {
        self.kind.spec()
    }

    /// Ordered execution providers plus the backend label reported in status
    fn select_providers(device: DeviceRequest) -> (Vec<ExecutionProviderDispatch>, &'static str) {
        match device {
            DeviceRequest::Cpu => (vec![], "cpu"),
            DeviceRequest::Cuda | DeviceRequest::Auto => {
                let cuda = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda).unwrap_or(false) {
                    info!("CUDA execution provider available, CPU kept as fallback");
                    (vec![cuda.build()], "cuda")
                } else {
                    if device == DeviceRequest::Cuda {
                        warn!("CUDA requested but not available, using CPU");
                    }
                    (vec![], "cpu")
                }
            },
        }
    }

    fn load_session(&self) -> Result<(Session, PathBuf, &'static str)> {
        let spec = self.spec();
        let path = download::ensure_weight_file(spec, &self.model_dir, self.allow_remote_download)?;

        let (providers, device_label) = Self::select_providers(self.device);
        let mut builder = Session::builder()
            .map_err(|e| CutoutError::model_load(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                CutoutError::model_load(format!("Failed to set optimization level: {e}"))
            })?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                CutoutError::model_load(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let session = builder.commit_from_file(&path).map_err(|e| {
            CutoutError::model_load(format!(
                "Failed to create session from {}: {e}",
                path.display()
            ))
        })?;

        debug!(
            "Session created for {} on {} ({})",
            spec.label,
            device_label,
            path.display()
        );
        Ok((session, path, device_label))
    }
}

impl MaskModel for OnnxMaskModel {
    fn identity(&self) -> &str {
        self.spec().label
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.status.is_ready() {
            return Ok(());
        }

        let Ok(_gate) = self.load_gate.try_lock() else {
            return Err(CutoutError::warmup_pending(format!(
                "{} load already in progress",
                self.spec().label
            )));
        };
        // Re-check under the gate: a load may have finished while we raced
        // for it.
        if self.status.is_ready() {
            return Ok(());
        }

        self.status.begin_loading();
        match self.load_session() {
            Ok((session, path, device)) => {
                *self
                    .session
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(session);
                self.status.mark_ready(Some(path), Some(device.to_string()));
                info!("Model {} ready on {}", self.spec().label, device);
                Ok(())
            },
            Err(err) => {
                match &err {
                    CutoutError::ModelMissing(msg) | CutoutError::Download(msg) => {
                        self.status.mark_missing(msg.clone());
                    },
                    other => {
                        self.status.mark_error(other.to_string());
                    },
                }
                warn!("Model {} failed to load: {err}", self.spec().label);
                Err(err)
            },
        }
    }

    fn predict_mask(&self, image: &DynamicImage) -> Result<AlphaMatte> {
        let spec = self.spec();
        let original_dimensions = (image.width(), image.height());
        let input = preprocess(image, spec);

        let mut session_guard = self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let session = session_guard
            .as_mut()
            .ok_or_else(|| CutoutError::not_loaded(spec.label.to_string()))?;

        let input_value = Value::from_array(input)
            .map_err(|e| CutoutError::inference(format!("Failed to convert input tensor: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| CutoutError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional output access, first tensor
        let output = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| CutoutError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| CutoutError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    CutoutError::inference(format!("Failed to extract output tensor: {e}"))
                })?
                .to_owned()
        };
        drop(session_guard);

        let shape = output.shape().to_vec();
        if shape.len() != 4 {
            return Err(CutoutError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        }
        let output = Array4::from_shape_vec(
            (
                shape.first().copied().unwrap_or(1),
                shape.get(1).copied().unwrap_or(1),
                shape.get(2).copied().unwrap_or(1),
                shape.get(3).copied().unwrap_or(1),
            ),
            output.into_raw_vec_and_offset().0,
        )
        .map_err(|e| CutoutError::inference(format!("Failed to reshape output tensor: {e}")))?;

        postprocess(&output, spec.activation, original_dimensions)
    }

    fn status(&self) -> ModelStatus {
        self.status.snapshot()
    }
}

/// Spec-driven preprocessing into an NCHW batch of one
///
/// Resizes to the spec's target resolution with Lanczos resampling, scales
/// pixel values by the observed maximum (not a fixed 255, to tolerate
/// non-standard bit depths), then applies per-channel normalization.
fn preprocess(image: &DynamicImage, spec: &ModelSpec) -> Array4<f32> {
    let (target_w, target_h) = spec.target_size;
    let resized = image
        .resize_exact(target_w, target_h, image::imageops::FilterType::Lanczos3)
        .to_rgb32f();

    let observed_max = resized
        .pixels()
        .flat_map(|p| p.0)
        .fold(0.0f32, f32::max);
    let scale = if observed_max > 0.0 { observed_max } else { 1.0 };

    let mut tensor = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
    #[allow(clippy::indexing_slicing)] // tensor pre-allocated to image size
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel.0[c] / scale;
            tensor[[0, c, y as usize, x as usize]] =
                (value - spec.normalization_mean[c]) / spec.normalization_std[c];
        }
    }
    tensor
}

/// Activation, min-max rescale, and resize back to the source dimensions
fn postprocess(
    output: &Array4<f32>,
    activation: OutputActivation,
    original_dimensions: (u32, u32),
) -> Result<AlphaMatte> {
    let shape = output.shape();
    let (mask_h, mask_w) = (
        shape.get(2).copied().unwrap_or(0),
        shape.get(3).copied().unwrap_or(0),
    );
    if mask_h == 0 || mask_w == 0 {
        return Err(CutoutError::inference("Empty output tensor"));
    }

    let mut values: Vec<f32> = output.iter().take(mask_h * mask_w).copied().collect();
    if activation == OutputActivation::Sigmoid {
        for v in &mut values {
            *v = 1.0 / (1.0 + (-*v).exp());
        }
    }

    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        // Constant output carries no segmentation signal
        values.fill(0.0);
    } else {
        for v in &mut values {
            *v = (*v - min) / range;
        }
    }

    let matte = AlphaMatte::new(values, mask_w as u32, mask_h as u32)?;
    Ok(matte
        .resize(original_dimensions.0, original_dimensions.1)
        .clipped())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let spec = ModelKind::IsnetGeneral.spec();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, image::Rgb([255, 0, 0])));
        let tensor = preprocess(&img, spec);
        assert_eq!(tensor.shape(), &[1, 3, 1024, 1024]);
        // Red channel: observed max is 1.0, so (1.0 - 0.5) / 0.5 = 1.0
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-4);
        // Green channel: (0.0 - 0.5) / 0.5 = -1.0
        assert!((tensor[[0, 1, 10, 10]] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_scales_by_observed_max() {
        let spec = ModelKind::IsnetGeneral.spec();
        // Dim image: max channel value 128, so that pixel maps to 1.0 before
        // normalization regardless of bit depth
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([128, 64, 0])));
        let tensor = preprocess(&img, spec);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_postprocess_minmax_and_resize() {
        let mut output = Array4::<f32>::zeros((1, 1, 4, 4));
        output[[0, 0, 1, 1]] = 3.0;
        output[[0, 0, 2, 2]] = 1.0;
        let matte = postprocess(&output, OutputActivation::Linear, (8, 8)).unwrap();
        assert_eq!(matte.dimensions(), (8, 8));
        assert!(matte.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_postprocess_constant_output_is_all_zero() {
        let output = Array4::<f32>::from_elem((1, 1, 4, 4), 0.7);
        let matte = postprocess(&output, OutputActivation::Linear, (4, 4)).unwrap();
        assert!(matte.data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_postprocess_sigmoid_squashes_logits() {
        let mut output = Array4::<f32>::zeros((1, 1, 2, 2));
        output[[0, 0, 0, 0]] = 10.0;
        output[[0, 0, 1, 1]] = -10.0;
        let matte = postprocess(&output, OutputActivation::Sigmoid, (2, 2)).unwrap();
        assert!((matte.get(0, 0) - 1.0).abs() < 1e-3);
        assert!(matte.get(1, 1) < 1e-3);
    }

    #[test]
    fn test_unloaded_model_predict_fails() {
        let dir = tempfile::tempdir().unwrap();
        let model = OnnxMaskModel::new(
            ModelKind::IsnetGeneral,
            dir.path().to_path_buf(),
            DeviceRequest::Cpu,
            false,
        );
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0])));
        let err = model.predict_mask(&img).unwrap_err();
        assert!(matches!(err, CutoutError::NotLoaded(_)));
    }

    #[test]
    fn test_missing_weights_mark_status() {
        let dir = tempfile::tempdir().unwrap();
        let model = OnnxMaskModel::new(
            ModelKind::IsnetGeneral,
            dir.path().to_path_buf(),
            DeviceRequest::Cpu,
            false,
        );
        let err = model.ensure_loaded().unwrap_err();
        assert!(matches!(err, CutoutError::ModelMissing(_)));
        assert_eq!(model.status().state, crate::status::ModelState::Missing);
    }
}
