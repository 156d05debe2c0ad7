//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError, RequeueReason};
use crate::crd::Certificate;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::{self, Action};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing Certificate never
/// slows down the others. The reconciler resets it after the next success.
pub fn handle_reconciliation_error(
    obj: Arc<Certificate>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {:?}", name, error);
    metrics::increment_reconciliation_errors();

    let resource_key = format!("{namespace}/{name}");
    let (delay, error_count) = ctx.next_error_backoff(&resource_key);

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {})",
        delay.as_secs(),
        error_count
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s, reason: {})",
        next_trigger_time.to_rfc3339(),
        delay.as_secs(),
        RequeueReason::ErrorBackoff.as_str()
    );

    metrics::increment_requeues(RequeueReason::ErrorBackoff.as_str());
    Action::requeue(delay)
}

/// Classification of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    TooManyRequests,
    NotFound,
    Other,
}

impl WatchErrorKind {
    #[must_use]
    pub fn classify(error_string: &str) -> Self {
        // 404 first: a plain-text 404 body surfaces as a serde error inside WatchFailed
        let is_not_found = error_string.contains("ObjectNotFound")
            || error_string.contains("404")
            || error_string.contains("not found");
        if is_not_found {
            return Self::NotFound;
        }
        if error_string.contains("401") || error_string.contains("Unauthorized") {
            return Self::Unauthorized;
        }
        if error_string.contains("410")
            || error_string.contains("too old resource version")
            || error_string.contains("Expired")
            || error_string.contains("Gone")
        {
            return Self::Expired;
        }
        if error_string.contains("429")
            || error_string.contains("storage is (re)initializing")
            || error_string.contains("TooManyRequests")
        {
            return Self::TooManyRequests;
        }
        Self::Other
    }
}

/// Handle an error item from the controller stream
///
/// Reconciler failures already carry a retry from
/// [`handle_reconciliation_error`], so they are logged and kept without
/// pausing the stream. Everything else goes through
/// [`handle_watch_stream_error`].
pub async fn handle_controller_error<QueueErr: std::fmt::Debug>(
    error: &controller::Error<ReconcilerError, QueueErr>,
    restart_delay: Duration,
) -> bool {
    if let controller::Error::ReconcilerFailed(err, object) = error {
        warn!(resource = %object, error = %err, "Reconcile failed, retry scheduled");
        return true;
    }
    handle_watch_stream_error(&format!("{error:?}"), restart_delay).await
}

/// Handle a watch stream error
///
/// Returns `true` when the event should be kept in the stream and `false`
/// when it should be dropped so the watch restarts.
pub async fn handle_watch_stream_error(error_string: &str, restart_delay: Duration) -> bool {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match WatchErrorKind::classify(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("   Verify the operator ServiceAccount can list certificates.certificate.println.kr, secrets, issuers and certificates.cert-manager.io");
            warn!(
                "⏳ Waiting {}s before retrying watch...",
                restart_delay.as_secs()
            );
            tokio::time::sleep(restart_delay).await;
            false
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "Watch resource version expired, watch will restart");
            false
        }
        WatchErrorKind::TooManyRequests => {
            warn!(
                "API server storage reinitializing (429), backing off for {}s before restart...",
                restart_delay.as_secs()
            );
            tokio::time::sleep(restart_delay).await;
            false
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) - normal if it was deleted or the CRD is missing. Error: {}",
                error_string
            );
            true
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(restart_delay).await;
            false
        }
    }
}
