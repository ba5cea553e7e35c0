//! Configuration types for the removal pipeline

use crate::error::{CutoutError, Result};
use crate::registry::ModelKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Compute backend preference for the pro-tier session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceRequest {
    /// Auto-detect best available backend (CUDA if present, else CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration with CPU fallback
    Cuda,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

/// Requested output quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Always-available heuristic matte, no model load required
    Fast,
    /// Neural segmentation model, lazily loaded
    Pro,
}

impl Quality {
    /// Normalize a quality selector. Anything other than the two
    /// recognized tiers is treated as `pro`.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fast" => Self::Fast,
            _ => Self::Pro,
        }
    }
}

/// How pro-tier mattes are turned into the final PNG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositingStrategy {
    /// Score raw and refined matte candidates, reject low-confidence results
    ScoredCandidates,
    /// Feather the single predicted matte and encode it directly
    SingleMatte,
}

impl Default for CompositingStrategy {
    fn default() -> Self {
        Self::ScoredCandidates
    }
}

/// Process-wide pipeline configuration
///
/// Constructed once at process start and handed to [`crate::Pipeline`].
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineConfig {
    /// Compute backend preference for the pro model
    pub device: DeviceRequest,
    /// Substitute fast-tier output when the pro tier is unavailable
    pub auto_fallback: bool,
    /// Permit on-demand weight downloads from the spec's remote URL
    pub allow_remote_download: bool,
    /// Pro-tier model identity
    pub pro_model: ModelKind,
    /// Directory holding model weight files
    pub model_dir: PathBuf,
    /// Kick off a background warmup when the pipeline is constructed
    pub warmup_on_start: bool,
    /// Make the startup warmup block until it finishes
    pub warmup_blocking: bool,
    /// Pro-tier compositing strategy
    pub strategy: CompositingStrategy,
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Default model directory under the user cache
    #[must_use]
    pub fn default_model_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("cutout")
            .join("models")
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device: DeviceRequest::Auto,
            auto_fallback: true,
            allow_remote_download: false,
            pro_model: ModelKind::IsnetGeneral,
            model_dir: Self::default_model_dir(),
            warmup_on_start: false,
            warmup_blocking: false,
            strategy: CompositingStrategy::default(),
        }
    }
}

/// Builder for [`PipelineConfig`]
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn device(mut self, device: DeviceRequest) -> Self {
        self.config.device = device;
        self
    }

    #[must_use]
    pub fn auto_fallback(mut self, enabled: bool) -> Self {
        self.config.auto_fallback = enabled;
        self
    }

    #[must_use]
    pub fn allow_remote_download(mut self, allowed: bool) -> Self {
        self.config.allow_remote_download = allowed;
        self
    }

    #[must_use]
    pub fn pro_model(mut self, kind: ModelKind) -> Self {
        self.config.pro_model = kind;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    #[must_use]
    pub fn warmup_on_start(mut self, enabled: bool) -> Self {
        self.config.warmup_on_start = enabled;
        self
    }

    #[must_use]
    pub fn warmup_blocking(mut self, blocking: bool) -> Self {
        self.config.warmup_blocking = blocking;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: CompositingStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Build the pipeline configuration
    ///
    /// # Errors
    ///
    /// Returns `CutoutError::InvalidConfig` when the model directory is an
    /// empty path.
    pub fn build(self) -> Result<PipelineConfig> {
        if self.config.model_dir.as_os_str().is_empty() {
            return Err(CutoutError::invalid_config(
                "model directory must not be empty",
            ));
        }
        Ok(self.config)
    }
}
