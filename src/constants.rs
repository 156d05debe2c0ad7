//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Finalizer placed on every Certificate before any other mutation
pub const CERTIFICATE_FINALIZER: &str = "certificate.println.kr/finalizer";

/// Field manager used for server-side apply and status patches
pub const DEFAULT_FIELD_MANAGER: &str = "certificate-operator";

/// Value of the `app.kubernetes.io/managed-by` label on owned objects
pub const MANAGED_BY: &str = "certificate-operator";

/// Label key for managed-by
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Suffix of the key-material Secret written by cert-manager (`{name}-tls`)
pub const TLS_SECRET_SUFFIX: &str = "-tls";

/// Suffix of the cert-manager Certificate request (`{name}-cert`)
pub const CERT_REQUEST_SUFFIX: &str = "-cert";

/// Suffix of the ACME account key secret referenced by an Issuer
pub const ACCOUNT_KEY_SUFFIX: &str = "-account-key";

/// Key holding the certificate chain inside a TLS secret
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Key holding the private key inside a TLS secret
pub const TLS_KEY_KEY: &str = "tls.key";

/// Issuer used when the Certificate spec does not name one
pub const DEFAULT_ISSUER_NAME: &str = "letsencrypt-prod";

/// Ingress class used by the HTTP-01 solver when the spec does not name one
pub const DEFAULT_INGRESS_CLASS: &str = "nginx";

/// Let's Encrypt production directory
pub const DEFAULT_ACME_SERVER: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Cloudflare v4 API base URL
pub const DEFAULT_CLOUDFLARE_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default requeue interval after a successful pass (seconds)
pub const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 60;

/// Polling interval while cert-manager has not finished issuing (seconds)
pub const DEFAULT_NOT_READY_REQUEUE_SECS: u64 = 60;

/// Default timeout for a single cloud provider HTTP call (seconds)
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP port for the CRUD API
pub const DEFAULT_API_PORT: u16 = 8080;

/// Reconciliation error backoff floor (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Reconciliation error backoff ceiling (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default delay before restarting watch stream after it ends or fails (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// AWS secret key for the access key id
pub const AWS_ACCESS_KEY_ID_KEY: &str = "access-key-id";

/// AWS secret key for the secret access key
pub const AWS_SECRET_ACCESS_KEY_KEY: &str = "secret-access-key";

/// AWS secret key for the (optional) region
pub const AWS_REGION_KEY: &str = "region";

/// Cloudflare secret key for the API token
pub const CLOUDFLARE_API_TOKEN_KEY: &str = "api-token";
