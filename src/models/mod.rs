//! Mask model abstraction and implementations

mod fast;
#[cfg(feature = "onnx")]
mod onnx;
mod stub;

pub use fast::HeuristicMatteModel;
#[cfg(feature = "onnx")]
pub use onnx::OnnxMaskModel;
pub use stub::{LoadBehavior, PredictFailure, StubMaskModel};

use crate::error::Result;
use crate::status::ModelStatus;
use crate::types::AlphaMatte;
use image::DynamicImage;

/// Capability set shared by all mask models
///
/// Implementations own at most one live inference session, created at most
/// once per successful load and reused for every subsequent prediction.
pub trait MaskModel: Send + Sync {
    /// Stable identity used in status reports and logs
    fn identity(&self) -> &str;

    /// Bring the model to `Ready`, loading its session if necessary
    ///
    /// Idempotent: returns immediately when already loaded.
    ///
    /// # Errors
    /// - `ModelMissing` when the weight file is absent and downloads are
    ///   disallowed or fail
    /// - `ModelLoadFailure` when session construction fails
    /// - `WarmupPending` when another load attempt holds the load gate
    fn ensure_loaded(&self) -> Result<()>;

    /// Predict the foreground matte for an image
    ///
    /// The returned matte has exactly the input image's pixel dimensions,
    /// values in `[0, 1]`.
    ///
    /// # Errors
    /// - `NotLoaded` when no session has been created
    /// - `Inference` on preprocessing or forward-pass failures
    fn predict_mask(&self, image: &DynamicImage) -> Result<AlphaMatte>;

    /// Snapshot of the model's shared status
    fn status(&self) -> ModelStatus;
}
