//! # Configuration Modules
//!
//! The dashboard's single configuration surface.

/// Camera set, endpoints, allow-list and lifecycle tuning.
pub mod dashboard_config;

pub use dashboard_config::{ConfigError, DashboardConfig, LifecyclePolicy};
