//! # Reconciler
//!
//! Entry point invoked by the watch loop for every Certificate event.
//!
//! The reconciler:
//! - Owns the finalizer protocol (added before anything else, removed after teardown)
//! - Delegates the forward pass to the [`CertificateManager`](crate::controller::manager::CertificateManager)
//! - Persists status only when the pass changed it
//! - Translates the outcome into a requeue decision

pub mod reconcile;
pub mod types;

pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError, RequeueReason};
