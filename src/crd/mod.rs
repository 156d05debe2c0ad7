//! # Custom Resource Definitions
//!
//! CRD types for the certificate operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `Certificate` resource and its desired state
//! - `status.rs` - Status types for tracking issuance and distribution
//! - `cert_manager.rs` - The subset of cert-manager's `Issuer` and `Certificate`
//!   the operator writes and reads back

pub mod cert_manager;
mod spec;
mod status;

pub use spec::{Certificate, CertificateSpec};
pub use status::{CertificateStatus, Condition, ConditionStatus, READY_CONDITION};
