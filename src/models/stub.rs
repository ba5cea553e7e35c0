//! Deterministic stub model for exercising the orchestrator without weights

use crate::error::{CutoutError, Result};
use crate::models::MaskModel;
use crate::status::{ModelStatus, StatusHandle};
use crate::types::AlphaMatte;
use image::DynamicImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a stub load attempt should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehavior {
    /// Load succeeds and the model becomes ready
    Succeed,
    /// Weight file is reported missing
    ReportMissing,
    /// Session construction fails
    FailLoad,
}

/// How stub predictions should fail, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictFailure {
    /// Raise a plain inference error
    Inference,
    /// Raise `ModelsUnavailable` (never masked by fallback)
    Unavailable,
}

/// Deterministic mask model requiring no weight files
///
/// Its matte is a centered rectangle covering the middle half of each
/// dimension. Load attempts and predictions are counted so tests can
/// verify idempotence and single-flight behavior.
#[derive(Debug)]
pub struct StubMaskModel {
    identity: String,
    status: StatusHandle,
    behavior: Mutex<LoadBehavior>,
    predict_failure: Mutex<Option<PredictFailure>>,
    load_delay: Duration,
    load_attempts: AtomicUsize,
    predict_calls: AtomicUsize,
    load_gate: Mutex<()>,
}

impl StubMaskModel {
    /// Stub that loads successfully on first `ensure_loaded`
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(LoadBehavior::Succeed)
    }

    /// Stub that is ready from construction (stands in for the fast tier)
    #[must_use]
    pub fn ready() -> Self {
        let stub = Self::new();
        stub.status.mark_ready(None, Some("cpu".to_string()));
        stub
    }

    /// Stub whose load attempts report a missing weight file
    #[must_use]
    pub fn missing() -> Self {
        Self::with_behavior(LoadBehavior::ReportMissing)
    }

    /// Stub whose load attempts fail during session construction
    #[must_use]
    pub fn failing_load() -> Self {
        Self::with_behavior(LoadBehavior::FailLoad)
    }

    /// Stub with explicit load behavior
    #[must_use]
    pub fn with_behavior(behavior: LoadBehavior) -> Self {
        Self {
            identity: "stub-centered-rect".to_string(),
            status: StatusHandle::new(),
            behavior: Mutex::new(behavior),
            predict_failure: Mutex::new(None),
            load_delay: Duration::ZERO,
            load_attempts: AtomicUsize::new(0),
            predict_calls: AtomicUsize::new(0),
            load_gate: Mutex::new(()),
        }
    }

    /// Make load attempts take this long (for concurrency tests)
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Make subsequent predictions fail the given way
    pub fn set_predict_failure(&self, failure: Option<PredictFailure>) {
        *self.predict_failure.lock().unwrap() = failure;
    }

    /// Change what the next load attempt does (for recovery tests)
    pub fn set_load_behavior(&self, behavior: LoadBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Number of actual load attempts (not calls short-circuited as ready)
    #[must_use]
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Number of predictions run
    #[must_use]
    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }
}

impl Default for StubMaskModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskModel for StubMaskModel {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.status.is_ready() {
            return Ok(());
        }

        let Ok(_gate) = self.load_gate.try_lock() else {
            return Err(CutoutError::warmup_pending(format!(
                "{} load already in progress",
                self.identity
            )));
        };
        if self.status.is_ready() {
            return Ok(());
        }

        self.status.begin_loading();
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }

        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            LoadBehavior::Succeed => {
                self.status.mark_ready(None, Some("cpu".to_string()));
                Ok(())
            },
            LoadBehavior::ReportMissing => {
                let message = format!("{}: weight file absent", self.identity);
                self.status.mark_missing(&message);
                Err(CutoutError::model_missing(message))
            },
            LoadBehavior::FailLoad => {
                let message = format!("{}: session construction failed", self.identity);
                self.status.mark_error(&message);
                Err(CutoutError::model_load(message))
            },
        }
    }

    fn predict_mask(&self, image: &DynamicImage) -> Result<AlphaMatte> {
        self.predict_calls.fetch_add(1, Ordering::SeqCst);

        if !self.status.is_ready() {
            return Err(CutoutError::not_loaded(self.identity.clone()));
        }
        if let Some(failure) = *self.predict_failure.lock().unwrap() {
            return Err(match failure {
                PredictFailure::Inference => {
                    CutoutError::inference("stub inference failure")
                },
                PredictFailure::Unavailable => {
                    CutoutError::unavailable("stub reports models unavailable")
                },
            });
        }

        let width = image.width();
        let height = image.height();
        let (x0, x1) = (width / 4, width - width / 4);
        let (y0, y1) = (height / 4, height - height / 4);
        Ok(AlphaMatte::from_fn(width, height, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn status(&self) -> ModelStatus {
        self.status.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ModelState;
    use image::RgbImage;

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([100, 100, 100])))
    }

    #[test]
    fn test_centered_rectangle_matte() {
        let stub = StubMaskModel::ready();
        let matte = stub.predict_mask(&test_image()).unwrap();
        assert_eq!(matte.dimensions(), (8, 8));
        assert_eq!(matte.get(4, 4), 1.0);
        assert_eq!(matte.get(0, 0), 0.0);
        assert_eq!(matte.get(7, 7), 0.0);
        // Middle half of each dimension: [2, 6)
        assert_eq!(matte.get(2, 2), 1.0);
        assert_eq!(matte.get(6, 4), 0.0);
    }

    #[test]
    fn test_load_attempt_counting_and_idempotence() {
        let stub = StubMaskModel::new();
        assert_eq!(stub.load_attempts(), 0);
        stub.ensure_loaded().unwrap();
        assert_eq!(stub.load_attempts(), 1);
        stub.ensure_loaded().unwrap();
        stub.ensure_loaded().unwrap();
        assert_eq!(stub.load_attempts(), 1);
    }

    #[test]
    fn test_missing_stub_state() {
        let stub = StubMaskModel::missing();
        let err = stub.ensure_loaded().unwrap_err();
        assert!(matches!(err, CutoutError::ModelMissing(_)));
        assert_eq!(stub.status().state, ModelState::Missing);
    }

    #[test]
    fn test_failing_stub_retries_from_error() {
        let stub = StubMaskModel::failing_load();
        assert!(stub.ensure_loaded().is_err());
        assert_eq!(stub.status().state, ModelState::Error);
        // A fresh attempt is permitted after a failure
        assert!(stub.ensure_loaded().is_err());
        assert_eq!(stub.load_attempts(), 2);
    }

    #[test]
    fn test_predict_before_load_fails() {
        let stub = StubMaskModel::new();
        let err = stub.predict_mask(&test_image()).unwrap_err();
        assert!(matches!(err, CutoutError::NotLoaded(_)));
    }
}
