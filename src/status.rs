//! Shared model status with guarded state transitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Lifecycle state of a lazily-loaded model
///
/// Transitions are monotonic within one load attempt
/// (`Idle -> Loading -> {Ready | Missing | Error}`); a fresh attempt may
/// retry from `Missing` or `Error` back to `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Idle,
    Loading,
    Ready,
    Missing,
    Error,
}

/// Mutable status record shared between the orchestrator and load attempts
///
/// Invariant: `ready == (state == ModelState::Ready)`, maintained by the
/// transition methods on [`StatusHandle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub state: ModelState,
    pub ready: bool,
    pub warming: bool,
    /// Last failure description, if any
    pub message: Option<String>,
    /// Resolved weight-file location after a successful load
    pub path: Option<PathBuf>,
    /// Selected compute backend identifier after a successful load
    pub device: Option<String>,
}

impl Default for ModelStatus {
    fn default() -> Self {
        Self {
            state: ModelState::Idle,
            ready: false,
            warming: false,
            message: None,
            path: None,
            device: None,
        }
    }
}

/// Thread-shared handle over one model's status
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<ModelStatus>>,
}

impl StatusHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that starts out ready (for eager, weight-free models)
    #[must_use]
    pub fn ready(device: &str) -> Self {
        let handle = Self::new();
        {
            let mut status = handle.lock();
            status.state = ModelState::Ready;
            status.ready = true;
            status.device = Some(device.to_string());
        }
        handle
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ModelStatus> {
        // A poisoned status mutex means a transition panicked; the record
        // itself is still plain data, so keep serving it.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Snapshot the current status
    #[must_use]
    pub fn snapshot(&self) -> ModelStatus {
        self.lock().clone()
    }

    /// Whether the model reached `Ready`
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ModelState {
        self.lock().state
    }

    /// Transition into `Loading` at the start of an attempt
    pub fn begin_loading(&self) {
        let mut status = self.lock();
        status.state = ModelState::Loading;
        status.ready = false;
        status.message = None;
    }

    /// Record a successful load
    pub fn mark_ready(&self, path: Option<PathBuf>, device: Option<String>) {
        let mut status = self.lock();
        status.state = ModelState::Ready;
        status.ready = true;
        status.message = None;
        status.path = path;
        status.device = device;
    }

    /// Record a missing weight file
    pub fn mark_missing(&self, message: impl Into<String>) {
        let mut status = self.lock();
        status.state = ModelState::Missing;
        status.ready = false;
        status.message = Some(message.into());
    }

    /// Record a failed load attempt
    pub fn mark_error(&self, message: impl Into<String>) {
        let mut status = self.lock();
        status.state = ModelState::Error;
        status.ready = false;
        status.message = Some(message.into());
    }
}
