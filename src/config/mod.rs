//! # Configuration
//!
//! Process-level configuration for the operator.

pub mod controller;

pub use controller::ControllerConfig;
