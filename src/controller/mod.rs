//! # Controller
//!
//! Core controller modules for the certificate operator.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `manager`: issuance and distribution orchestration for one Certificate
//! - `reconciler`: finalizer protocol and status persistence
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod manager;
pub mod reconciler;
pub mod server;
