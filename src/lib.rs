#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Cutout
//!
//! A two-tier background removal library built on ONNX Runtime.
//!
//! Every request names a quality tier. The **fast** tier is a lightweight
//! heuristic matte that is always available and never blocks. The **pro**
//! tier runs a neural segmentation model whose weight file is large and
//! loaded lazily; while it is missing, loading, or broken, requests can
//! fall back to the fast tier instead of failing (see
//! [`PipelineConfig::auto_fallback`]).
//!
//! ## Features
//!
//! - **Two quality tiers**: heuristic fast matting plus `ISNet`, `MODNet`,
//!   or `BiRefNet` neural matting
//! - **Background warmup**: single-flight pro model loading off the
//!   request path, optionally started at construction
//! - **Fallback policy**: degraded service beats no service, with the
//!   substitution reported on every response
//! - **Scored compositing**: raw and refined mattes are scored and the
//!   best one composited; low-confidence pro output is rejected
//! - **Straight-alpha PNG output**: RGB carried through untouched
//! - **Hardware selection**: automatic CUDA detection with CPU fallback
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cutout::{Pipeline, PipelineConfig};
//!
//! # fn example(upload: Vec<u8>) -> cutout::Result<()> {
//! let config = PipelineConfig::builder()
//!     .allow_remote_download(true)
//!     .warmup_on_start(true)
//!     .build()?;
//! let pipeline = Pipeline::new(config)?;
//!
//! let outcome = pipeline.remove_background(&upload, "pro")?;
//! std::fs::write("cutout.png", &outcome.png_bytes)?;
//! if outcome.used_fallback {
//!     eprintln!("served by the fast tier");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Async usage
//!
//! Inference is CPU-bound, so the async entry points wrap the synchronous
//! pipeline in [`tokio::task::spawn_blocking`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cutout::{remove_background_from_bytes, Pipeline, PipelineConfig};
//!
//! # async fn example(upload: Vec<u8>) -> cutout::Result<()> {
//! let pipeline = Arc::new(Pipeline::new(PipelineConfig::default())?);
//! let outcome = remove_background_from_bytes(&pipeline, upload, "pro").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `onnx` (default): ONNX Runtime pro-tier backend; without it the pro
//!   tier reports missing and fallback policy applies
//! - `cli` (default): the `fetch-models` weight prefetch binary

pub mod compositor;
pub mod config;
pub mod download;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod status;
pub mod types;

pub use config::{
    CompositingStrategy, DeviceRequest, PipelineConfig, PipelineConfigBuilder, Quality,
};
pub use error::{CutoutError, Result};
pub use models::{HeuristicMatteModel, MaskModel, StubMaskModel};
#[cfg(feature = "onnx")]
pub use models::OnnxMaskModel;
pub use pipeline::{HealthReport, Pipeline, ServiceStatus};
pub use registry::{ModelKind, ModelSpec, OutputActivation};
pub use status::{ModelState, ModelStatus};
pub use types::{AlphaMatte, RemovalOutcome};

use std::sync::Arc;

/// Remove the background from encoded image bytes off the async runtime
///
/// Decoding, inference, and PNG encoding all run on the blocking thread
/// pool; the future resolves when the synchronous pipeline call returns.
///
/// # Arguments
///
/// * `pipeline` - Shared pipeline handle
/// * `image_bytes` - Raw encoded image data (JPEG, PNG, WebP)
/// * `quality` - Requested tier; anything other than `"fast"` means pro
pub async fn remove_background_from_bytes(
    pipeline: &Arc<Pipeline>,
    image_bytes: Vec<u8>,
    quality: impl Into<String>,
) -> Result<RemovalOutcome> {
    let pipeline = Arc::clone(pipeline);
    let quality = quality.into();
    tokio::task::spawn_blocking(move || pipeline.remove_background(&image_bytes, &quality))
        .await
        .map_err(|e| CutoutError::internal(format!("blocking task failed: {e}")))?
}

/// Run a blocking warmup off the async runtime
///
/// Resolves once the in-flight load attempt finishes, whether it
/// succeeded or not; inspect [`Pipeline::health`] for the result.
pub async fn warmup(pipeline: &Arc<Pipeline>) -> Result<()> {
    let pipeline = Arc::clone(pipeline);
    tokio::task::spawn_blocking(move || pipeline.start_warmup(true))
        .await
        .map_err(|e| CutoutError::internal(format!("blocking task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_async_entry_point_runs_fast_tier() {
        let config = PipelineConfig::builder()
            .model_dir(std::env::temp_dir().join("cutout-lib-test"))
            .build()
            .unwrap();
        let pipeline = Arc::new(Pipeline::with_models(
            config,
            Arc::new(StubMaskModel::ready()),
            Arc::new(StubMaskModel::missing()),
        ));

        let mut bytes = Vec::new();
        image::DynamicImage::new_rgb8(8, 8)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let outcome = remove_background_from_bytes(&pipeline, bytes, "fast")
            .await
            .unwrap();
        assert!(!outcome.used_fallback);
    }

    #[tokio::test]
    async fn test_async_warmup_resolves() {
        let config = PipelineConfig::builder()
            .model_dir(std::env::temp_dir().join("cutout-lib-test"))
            .build()
            .unwrap();
        let pipeline = Arc::new(Pipeline::with_models(
            config,
            Arc::new(StubMaskModel::ready()),
            Arc::new(StubMaskModel::new()),
        ));
        warmup(&pipeline).await.unwrap();
        assert!(pipeline.health().ready);
    }
}
