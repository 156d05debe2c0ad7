//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use certificate_operator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - CRD types (Certificate, CertificateSpec, CertificateStatus, conditions)
//! - Driver traits (CertIssuer, CloudProvider, KubeClient)
//! - The manager and reconciler types
//! - ControllerConfig and the crate error

// CRD types - most commonly used
pub use crate::crd::{
    Certificate, CertificateSpec, CertificateStatus, Condition, ConditionStatus, READY_CONDITION,
};

// Driver seams
pub use crate::issuance::{CertIssuer, Readiness};
pub use crate::kube_client::KubeClient;
pub use crate::provider::{CloudProvider, ProviderKind, ProviderTarget};

// Orchestration
pub use crate::controller::manager::{CertificateManager, ProcessOutcome, TeardownReport};
pub use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};

pub use crate::config::ControllerConfig;
pub use crate::error::Error;
