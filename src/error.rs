//! Error types for the background removal pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error taxonomy for the two-tier removal pipeline
///
/// The orchestrator dispatches on these variants to apply the fallback
/// policy: `WarmupPending`, `ModelMissing` and `ModelLoadFailure` are
/// substitutable by the fast tier, while `ModelsUnavailable` raised from
/// inference is surfaced unconditionally.
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Weight file absent and remote download disallowed or failed
    #[error("Model missing: {0}")]
    ModelMissing(String),

    /// Inference session construction failed (corrupt file, backend init error)
    #[error("Model load failure: {0}")]
    ModelLoadFailure(String),

    /// Prediction requested on a model whose session was never loaded
    #[error("Model not loaded: {0}")]
    NotLoaded(String),

    /// Another load attempt is in flight for the requested tier
    #[error("Warmup pending: {0}")]
    WarmupPending(String),

    /// Pro tier cannot serve requests (missing or errored, not warming)
    #[error("Models unavailable: {0}")]
    ModelsUnavailable(String),

    /// Forward pass or preprocessing raised at request time
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model weight download failures
    #[error("Download error: {0}")]
    Download(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CutoutError {
    /// Create a new model-missing error
    pub fn model_missing<S: Into<String>>(msg: S) -> Self {
        Self::ModelMissing(msg.into())
    }

    /// Create a new model-load-failure error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadFailure(msg.into())
    }

    /// Create a new not-loaded error
    pub fn not_loaded<S: Into<String>>(msg: S) -> Self {
        Self::NotLoaded(msg.into())
    }

    /// Create a new warmup-pending error
    pub fn warmup_pending<S: Into<String>>(msg: S) -> Self {
        Self::WarmupPending(msg.into())
    }

    /// Create a new models-unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelsUnavailable(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new download error
    pub fn download<S: Into<String>>(msg: S) -> Self {
        Self::Download(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CutoutError::model_missing("isnet-general-use.onnx not found");
        assert!(matches!(err, CutoutError::ModelMissing(_)));

        let err = CutoutError::warmup_pending("segmentation model loading");
        assert!(matches!(err, CutoutError::WarmupPending(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CutoutError::unavailable("pro tier degraded");
        assert_eq!(err.to_string(), "Models unavailable: pro tier degraded");
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CutoutError::file_io_error("write model file", "/models/a.onnx", io_error);
        let rendered = err.to_string();
        assert!(rendered.contains("write model file"));
        assert!(rendered.contains("/models/a.onnx"));
    }
}
