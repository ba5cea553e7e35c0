//! Two-tier pipeline orchestrator
//!
//! Owns the always-ready fast model and the lazily-loaded pro model,
//! runs background warmup, and applies the fallback policy: the pro tier
//! depends on a large, optionally-remote weight file, and a request must
//! never hang on that dependency while a degraded-but-available fast tier
//! exists.

use crate::compositor::{self, MatteCandidate, FEATHER_SIGMA};
use crate::config::{CompositingStrategy, PipelineConfig, Quality};
use crate::error::{CutoutError, Result};
use crate::models::{HeuristicMatteModel, MaskModel};
use crate::status::ModelState;
use crate::types::RemovalOutcome;
use image::DynamicImage;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use tracing::{debug, error, info, instrument, warn};

/// Composite service status derived from the pro model's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Pro model is ready
    Ok,
    /// Pro model is idle/loading or a warmup is in flight
    WarmingUp,
    /// Pro model is missing or errored and nothing is warming
    Degraded,
}

/// Side-effect-free snapshot of the pipeline for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub fast_model: String,
    pub pro_model: String,
    pub pro_state: ModelState,
    pub ready: bool,
    pub warming: bool,
    pub message: Option<String>,
    pub model_path: Option<PathBuf>,
    pub device: Option<String>,
    pub model_dir: PathBuf,
}

/// Warmup bookkeeping shared with the warmup thread
type WarmupSignal = Arc<(Mutex<bool>, Condvar)>;

/// Process-wide pipeline instance
///
/// Constructed once at process start and shared by reference (or `Arc`)
/// with the boundary layer. The pro model's session and status are the
/// only shared mutable state; load attempts are single-flight.
pub struct Pipeline {
    config: PipelineConfig,
    fast: Arc<dyn MaskModel>,
    pro: Arc<dyn MaskModel>,
    warmup: WarmupSignal,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("fast", &self.fast.identity())
            .field("pro", &self.pro.identity())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build the production pipeline from configuration
    ///
    /// Creates the model directory, constructs the eager fast model and
    /// the lazy pro model, and optionally kicks off the startup warmup.
    ///
    /// # Errors
    /// - `Io` when the model directory cannot be created
    pub fn new(config: PipelineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.model_dir).map_err(|e| {
            CutoutError::file_io_error("create model directory", &config.model_dir, e)
        })?;

        let fast: Arc<dyn MaskModel> = Arc::new(HeuristicMatteModel::new());

        #[cfg(feature = "onnx")]
        let pro: Arc<dyn MaskModel> = Arc::new(crate::models::OnnxMaskModel::new(
            config.pro_model,
            config.model_dir.clone(),
            config.device,
            config.allow_remote_download,
        ));
        // Without the onnx feature the pro tier has no backend, it behaves
        // as permanently missing and fallback policy applies.
        #[cfg(not(feature = "onnx"))]
        let pro: Arc<dyn MaskModel> = Arc::new(crate::models::StubMaskModel::missing());

        Ok(Self::with_models(config, fast, pro))
    }

    /// Build a pipeline around explicit model handles
    ///
    /// This is the injection seam for tests and alternative backends.
    #[must_use]
    pub fn with_models(
        config: PipelineConfig,
        fast: Arc<dyn MaskModel>,
        pro: Arc<dyn MaskModel>,
    ) -> Self {
        let pipeline = Self {
            config,
            fast,
            pro,
            warmup: Arc::new((Mutex::new(false), Condvar::new())),
        };
        if pipeline.config.warmup_on_start {
            pipeline.start_warmup(pipeline.config.warmup_blocking);
        }
        pipeline
    }

    /// Pipeline configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start an asynchronous attempt to bring the pro model to ready
    ///
    /// Single-flight: while an attempt is in progress a second call is a
    /// no-op. In blocking mode the caller waits for the attempt to finish
    /// (success or failure). Warmup failures are recorded in status and
    /// logged; they never surface here.
    pub fn start_warmup(&self, blocking: bool) {
        {
            let (lock, _) = &*self.warmup;
            let mut in_progress = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !*in_progress {
                *in_progress = true;
                let pro = Arc::clone(&self.pro);
                let warmup = Arc::clone(&self.warmup);
                let spawned = std::thread::Builder::new()
                    .name("cutout-warmup".to_string())
                    .spawn(move || {
                        match pro.ensure_loaded() {
                            Ok(()) => info!(model = pro.identity(), "Warmup finished, model ready"),
                            Err(CutoutError::ModelMissing(msg)) => {
                                warn!(model = pro.identity(), "Warmup: model missing: {msg}");
                            },
                            Err(err) => {
                                error!(model = pro.identity(), "Warmup: load failed: {err}");
                            },
                        }
                        let (lock, cvar) = &*warmup;
                        *lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = false;
                        cvar.notify_all();
                    });
                if let Err(err) = spawned {
                    error!("Failed to spawn warmup thread: {err}");
                    *in_progress = false;
                }
            }
        }

        if blocking {
            let (lock, cvar) = &*self.warmup;
            let mut in_progress =
                lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            while *in_progress {
                in_progress = cvar
                    .wait(in_progress)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
            }
        }
    }

    /// Whether a warmup attempt is currently in flight
    #[must_use]
    pub fn warming(&self) -> bool {
        let (lock, _) = &*self.warmup;
        *lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Derive the composite status with no side effects
    #[must_use]
    pub fn status_snapshot(&self) -> HealthReport {
        let warmup_in_flight = self.warming();
        let mut pro_status = self.pro.status();
        pro_status.warming = warmup_in_flight;

        let warming = warmup_in_flight
            || matches!(pro_status.state, ModelState::Idle | ModelState::Loading);
        let status = if pro_status.ready {
            ServiceStatus::Ok
        } else if warming {
            ServiceStatus::WarmingUp
        } else {
            ServiceStatus::Degraded
        };

        HealthReport {
            status,
            fast_model: self.fast.identity().to_string(),
            pro_model: self.pro.identity().to_string(),
            pro_state: pro_status.state,
            ready: pro_status.ready,
            warming,
            message: pro_status.message,
            model_path: pro_status.path,
            device: pro_status.device,
            model_dir: self.config.model_dir.clone(),
        }
    }

    /// Health endpoint payload (alias of [`Self::status_snapshot`])
    #[must_use]
    pub fn health(&self) -> HealthReport {
        self.status_snapshot()
    }

    /// Remove the background from an encoded image
    ///
    /// Decodes the bytes, dispatches on the normalized quality tier, and
    /// returns straight-alpha RGBA PNG bytes plus a flag indicating
    /// whether the fast tier was substituted for the requested pro tier.
    ///
    /// # Errors
    /// - `Image` when the input bytes cannot be decoded
    /// - `WarmupPending` / `ModelsUnavailable` for pro requests when
    ///   auto-fallback is disabled
    /// - any fast-tier failure, unconditionally
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len(), quality = %quality))]
    pub fn remove_background(&self, image_bytes: &[u8], quality: &str) -> Result<RemovalOutcome> {
        let image = image::load_from_memory(image_bytes)?;
        let quality = Quality::normalize(quality);

        if quality == Quality::Fast {
            // Fast-path failures are not intercepted: the fast model is
            // assumed always loadable and a failure here means a serious
            // environment problem.
            return Ok(RemovalOutcome {
                png_bytes: self.render_fast(&image)?,
                used_fallback: false,
            });
        }

        // Blocking load on first use, not a background warmup.
        match self.pro.ensure_loaded() {
            Ok(()) => {},
            Err(CutoutError::WarmupPending(msg)) => {
                if self.config.auto_fallback {
                    warn!("Pro tier warming up, falling back to fast: {msg}");
                    return Ok(RemovalOutcome {
                        png_bytes: self.render_fast(&image)?,
                        used_fallback: true,
                    });
                }
                return Err(CutoutError::warmup_pending(msg));
            },
            Err(err) => {
                if self.config.auto_fallback {
                    warn!("Pro tier unavailable ({err}), falling back to fast");
                    return Ok(RemovalOutcome {
                        png_bytes: self.render_fast(&image)?,
                        used_fallback: true,
                    });
                }
                return Err(CutoutError::unavailable(err.to_string()));
            },
        }

        match self.render_pro(&image) {
            Ok(Some(png_bytes)) => Ok(RemovalOutcome {
                png_bytes,
                used_fallback: false,
            }),
            Ok(None) => {
                // Low-confidence pro result: substitute fast regardless of
                // the auto-fallback toggle rather than return a bad matte.
                warn!("Pro result below confidence threshold, falling back to fast");
                Ok(RemovalOutcome {
                    png_bytes: self.render_fast(&image)?,
                    used_fallback: true,
                })
            },
            Err(err @ CutoutError::ModelsUnavailable(_)) => {
                // Persistent configuration problem, never masked by fallback.
                Err(err)
            },
            Err(err) => {
                if self.config.auto_fallback {
                    error!("Pro inference failed ({err}), falling back to fast");
                    Ok(RemovalOutcome {
                        png_bytes: self.render_fast(&image)?,
                        used_fallback: true,
                    })
                } else {
                    Err(err)
                }
            },
        }
    }

    /// Run the fast tier and encode
    fn render_fast(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let matte = self.fast.predict_mask(image)?;
        let soft = compositor::feather(&matte, FEATHER_SIGMA);
        compositor::encode_straight_rgba(image, &soft)
    }

    /// Run pro inference and composite
    ///
    /// `Ok(None)` means every candidate scored below the confidence
    /// threshold and the caller should substitute the fast tier.
    fn render_pro(&self, image: &DynamicImage) -> Result<Option<Vec<u8>>> {
        let matte = self.pro.predict_mask(image)?;

        match self.config.strategy {
            CompositingStrategy::SingleMatte => {
                let soft = compositor::feather(&matte, FEATHER_SIGMA);
                Ok(Some(compositor::encode_straight_rgba(image, &soft)?))
            },
            CompositingStrategy::ScoredCandidates => {
                let candidates = [
                    MatteCandidate::scored("raw", matte.clone()),
                    MatteCandidate::scored("refined", compositor::refine(&matte)),
                ];
                for candidate in &candidates {
                    debug!(
                        label = candidate.label,
                        score = candidate.score,
                        "Pro candidate scored"
                    );
                }
                match compositor::select_best(&candidates) {
                    Some(best) => {
                        info!(label = best.label, score = best.score, "Pro candidate chosen");
                        Ok(Some(compositor::encode_straight_rgba(image, &best.matte)?))
                    },
                    None => Ok(None),
                }
            },
        }
    }
}
