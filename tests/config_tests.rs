//! # Configuration Tests
//!
//! Defaults the operator runs with when no environment overrides are set.

use certificate_operator::config::ControllerConfig;
use certificate_operator::constants;
use std::time::Duration;

#[test]
fn test_controller_config_defaults() {
    let config = ControllerConfig::default();

    assert_eq!(config.requeue_interval(), Duration::from_secs(60));
    assert_eq!(config.not_ready_requeue(), Duration::from_secs(60));
    assert_eq!(config.provider_timeout(), Duration::from_secs(30));
    assert_eq!(config.default_issuer_name, "letsencrypt-prod");
    assert_eq!(config.default_ingress_class, "nginx");
    assert_eq!(
        config.acme_server,
        "https://acme-v02.api.letsencrypt.org/directory"
    );
    assert_eq!(config.metrics_port, 5000);
    assert_eq!(config.api_port, 8080);
    assert!(config.api_enabled);
    assert_eq!(
        config.cloudflare_api_base_url,
        "https://api.cloudflare.com/client/v4"
    );
    assert_eq!(config.backoff_min_minutes, 1);
    assert_eq!(config.backoff_max_minutes, 10);
}

#[test]
fn test_slot_naming_constants() {
    assert_eq!(format!("web{}", constants::TLS_SECRET_SUFFIX), "web-tls");
    assert_eq!(format!("web{}", constants::CERT_REQUEST_SUFFIX), "web-cert");
    assert_eq!(
        format!("letsencrypt-prod{}", constants::ACCOUNT_KEY_SUFFIX),
        "letsencrypt-prod-account-key"
    );
    assert_eq!(constants::CERTIFICATE_FINALIZER, "certificate.println.kr/finalizer");
}
