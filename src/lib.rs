//! Certificate Operator Library
//!
//! Issues TLS certificates through cert-manager and distributes them to
//! AWS Certificate Manager and Cloudflare. Tests live next to the code in
//! each module, with public-API tests under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use certificate_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod api;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod issuance;
pub mod kube_client;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
