//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Requeue interval after a successful reconciliation (seconds)
    pub requeue_interval_secs: u64,
    /// Polling interval while issuance is still pending (seconds)
    pub not_ready_requeue_secs: u64,
    /// Issuer name used when a Certificate does not specify one
    pub default_issuer_name: String,
    /// Ingress class used by the HTTP-01 solver when a Certificate does not specify one
    pub default_ingress_class: String,
    /// ACME directory URL written into every Issuer
    pub acme_server: String,
    /// Field manager for server-side apply
    pub field_manager: String,
    /// Port serving /metrics, /healthz and /readyz
    pub metrics_port: u16,
    /// Port serving the CRUD API
    pub api_port: u16,
    /// Whether the CRUD API is started
    pub api_enabled: bool,
    /// Cloudflare API base URL (overridable for testing)
    pub cloudflare_api_base_url: String,
    /// ACM endpoint override, e.g. a LocalStack URL
    pub acm_endpoint_url: Option<String>,
    /// Timeout for a single cloud provider call (seconds)
    pub provider_timeout_secs: u64,
    /// Fibonacci backoff floor for failed reconciliations (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff ceiling for failed reconciliations (minutes)
    pub backoff_max_minutes: u64,
    /// Watch stream restart delay (seconds)
    pub watch_restart_delay_secs: u64,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            requeue_interval_secs: DEFAULT_REQUEUE_INTERVAL_SECS,
            not_ready_requeue_secs: DEFAULT_NOT_READY_REQUEUE_SECS,
            default_issuer_name: DEFAULT_ISSUER_NAME.to_string(),
            default_ingress_class: DEFAULT_INGRESS_CLASS.to_string(),
            acme_server: DEFAULT_ACME_SERVER.to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            api_port: DEFAULT_API_PORT,
            api_enabled: true,
            cloudflare_api_base_url: DEFAULT_CLOUDFLARE_API_BASE_URL.to_string(),
            acm_endpoint_url: None,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            requeue_interval_secs: env_var_or_default(
                "REQUEUE_INTERVAL_SECS",
                DEFAULT_REQUEUE_INTERVAL_SECS,
            ),
            not_ready_requeue_secs: env_var_or_default(
                "NOT_READY_REQUEUE_SECS",
                DEFAULT_NOT_READY_REQUEUE_SECS,
            ),
            default_issuer_name: env_var_or_default_str("DEFAULT_ISSUER_NAME", DEFAULT_ISSUER_NAME),
            default_ingress_class: env_var_or_default_str(
                "DEFAULT_INGRESS_CLASS",
                DEFAULT_INGRESS_CLASS,
            ),
            acme_server: env_var_or_default_str("ACME_SERVER", DEFAULT_ACME_SERVER),
            field_manager: env_var_or_default_str("FIELD_MANAGER", DEFAULT_FIELD_MANAGER),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            api_port: env_var_or_default("API_PORT", DEFAULT_API_PORT),
            api_enabled: env_var_or_default_bool("API_ENABLED", true),
            cloudflare_api_base_url: env_var_or_default_str(
                "CLOUDFLARE_API_BASE_URL",
                DEFAULT_CLOUDFLARE_API_BASE_URL,
            ),
            acm_endpoint_url: std::env::var("ACM_ENDPOINT_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            provider_timeout_secs: env_var_or_default(
                "PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            ),
            backoff_min_minutes: env_var_or_default(
                "BACKOFF_MIN_MINUTES",
                DEFAULT_BACKOFF_MIN_MINUTES,
            ),
            backoff_max_minutes: env_var_or_default(
                "BACKOFF_MAX_MINUTES",
                DEFAULT_BACKOFF_MAX_MINUTES,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
        }
    }

    /// Get the requeue duration after a successful pass
    #[must_use]
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_interval_secs)
    }

    /// Get the polling duration while issuance is pending
    #[must_use]
    pub fn not_ready_requeue(&self) -> Duration {
        Duration::from_secs(self.not_ready_requeue_secs)
    }

    /// Get provider call timeout
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
