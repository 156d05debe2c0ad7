//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::manager::CertificateManager;
use crate::kube_client::KubeClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] crate::error::Error),
}

/// Why the next reconciliation was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    /// Periodic check after a successful pass
    Scheduled,
    /// Issuance still pending
    NotReady,
    /// Fibonacci backoff after a failed pass
    ErrorBackoff,
}

impl RequeueReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequeueReason::Scheduled => "scheduled",
            RequeueReason::NotReady => "not-ready",
            RequeueReason::ErrorBackoff => "error-backoff",
        }
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconciliation context
pub struct Reconciler {
    pub kube: Arc<dyn KubeClient>,
    pub manager: Arc<CertificateManager>,
    pub config: ControllerConfig,
    // Keyed by namespace/name; driven by the error policy, reset on success
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        kube: Arc<dyn KubeClient>,
        manager: Arc<CertificateManager>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            manager,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a failure for `key` and return the next delay with the error count
    pub fn next_error_backoff(&self, key: &str) -> (std::time::Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(|| {
                    BackoffState::new(self.config.backoff_min_minutes, self.config.backoff_max_minutes)
                });
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                tracing::warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (std::time::Duration::from_secs(60), 0)
            }
        }
    }

    /// Reset backoff for `key`; returns whether it had recorded errors
    pub fn reset_backoff(&self, key: &str) -> bool {
        self.backoff_states
            .lock()
            .ok()
            .and_then(|mut states| {
                states.get_mut(key).map(|state| {
                    let had_errors = state.error_count > 0;
                    state.reset();
                    had_errors
                })
            })
            .unwrap_or(false)
    }

    /// Drop backoff state for a resource that is gone
    pub fn forget_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}
