//! # Runtime
//!
//! Start-up, the kube-runtime watch loop, and its error policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
