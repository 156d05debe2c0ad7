//! # Certificate Spec
//!
//! Main CRD specification and target configuration rules.

use crate::provider::{ProviderKind, ProviderTarget};
use serde::{Deserialize, Serialize};

/// Certificate Custom Resource Definition
///
/// Declares a TLS certificate for one domain, issued through cert-manager and
/// optionally distributed to AWS ACM and Cloudflare.
///
/// # Example
///
/// ```yaml
/// apiVersion: certificate.println.kr/v1alpha1
/// kind: Certificate
/// metadata:
///   name: example
///   namespace: default
/// spec:
///   domain: example.com
///   email: admin@example.com
///   cloudflareSecretRef: cloudflare-credentials
///   cloudflareZoneID: 023e105f4ecef8ad9ca31a8372d0c353
///   awsSecretRef: aws-credentials
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Certificate",
    group = "certificate.println.kr",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::CertificateStatus",
    shortname = "tlscert",
    printcolumn = r#"{"name":"Domain", "type":"string", "jsonPath":".spec.domain"}, {"name":"AWS", "type":"boolean", "jsonPath":".status.awsUploaded"}, {"name":"Cloudflare", "type":"boolean", "jsonPath":".status.cloudflareUploaded"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Domain name the certificate is issued for
    pub domain: String,
    /// ACME registration email
    pub email: String,
    /// Issuer name (default: `letsencrypt-prod`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<String>,
    /// Ingress class used by the HTTP-01 solver (default: `nginx`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    /// Secret holding the Cloudflare `api-token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudflare_secret_ref: Option<String>,
    /// Cloudflare zone the certificate is uploaded to
    #[serde(
        default,
        rename = "cloudflareZoneID",
        skip_serializing_if = "Option::is_none"
    )]
    pub cloudflare_zone_id: Option<String>,
    /// Enable or disable Cloudflare distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudflare_enabled: Option<bool>,
    /// Secret holding `access-key-id`, `secret-access-key` and optionally `region`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_secret_ref: Option<String>,
    /// ACM region used when the credential secret does not carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    /// Enable or disable ACM distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_enabled: Option<bool>,
}

impl CertificateSpec {
    /// Issuer name, falling back to `default` when unset or empty
    #[must_use]
    pub fn issuer_name_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(self.issuer_name.as_deref()).unwrap_or(default)
    }

    /// Ingress class, falling back to `default` when unset or empty
    #[must_use]
    pub fn ingress_class_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(self.ingress_class_name.as_deref()).unwrap_or(default)
    }

    #[must_use]
    pub fn secret_ref(&self, kind: ProviderKind) -> Option<&str> {
        let secret_ref = match kind {
            ProviderKind::Cloudflare => self.cloudflare_secret_ref.as_deref(),
            ProviderKind::Aws => self.aws_secret_ref.as_deref(),
        };
        non_empty(secret_ref)
    }

    fn enabled_flag(&self, kind: ProviderKind) -> Option<bool> {
        match kind {
            ProviderKind::Cloudflare => self.cloudflare_enabled,
            ProviderKind::Aws => self.aws_enabled,
        }
    }

    /// A target is configured when it has a secret reference or is explicitly enabled
    #[must_use]
    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.secret_ref(kind).is_some() || self.enabled_flag(kind) == Some(true)
    }

    /// A configured target is enabled unless its flag is explicitly `false`
    #[must_use]
    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.is_configured(kind) && self.enabled_flag(kind) != Some(false)
    }

    /// Distribution target settings for one provider
    #[must_use]
    pub fn target(&self, kind: ProviderKind, namespace: &str) -> ProviderTarget {
        let (zone_id, region) = match kind {
            ProviderKind::Cloudflare => (non_empty(self.cloudflare_zone_id.as_deref()), None),
            ProviderKind::Aws => (None, non_empty(self.aws_region.as_deref())),
        };
        ProviderTarget {
            namespace: namespace.to_string(),
            domain: self.domain.clone(),
            secret_ref: self.secret_ref(kind).map(str::to_string),
            zone_id: zone_id.map(str::to_string),
            region: region.map(str::to_string),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
