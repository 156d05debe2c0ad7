//! # Cloud providers
//!
//! Distribution targets for issued certificates.
//!
//! Every target implements [`CloudProvider`] with the same three capabilities:
//! `name`, `upload` and `delete`. Drivers are stateless per call; credentials are
//! resolved from the referenced Secret (or the ambient chain, where the target
//! allows it) on every invocation.

use crate::error::Error;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::fmt;
use zeroize::Zeroizing;

pub mod aws;
pub mod cloudflare;
pub mod credentials;

pub use aws::AwsAcmProvider;
pub use cloudflare::CloudflareProvider;

/// Stable identifier of a distribution target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
    Cloudflare,
    Aws,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Cloudflare, ProviderKind::Aws];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::Aws => "aws",
        }
    }

    /// Status condition type tracking uploads to this target
    #[must_use]
    pub fn condition_type(self) -> &'static str {
        match self {
            Self::Cloudflare => "CloudflareUploaded",
            Self::Aws => "AwsUploaded",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a certificate goes for one target, derived from the Certificate spec
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderTarget {
    /// Namespace holding the credential secret
    pub namespace: String,
    pub domain: String,
    /// Credential secret; `None` means "use the ambient chain if allowed"
    pub secret_ref: Option<String>,
    /// Cloudflare zone
    pub zone_id: Option<String>,
    /// AWS region override
    pub region: Option<String>,
}

/// Key material handed to a driver for one pass
#[derive(Clone)]
pub struct CertificateData {
    pub domain: String,
    /// PEM chain as stored under `tls.crt`
    pub certificate: String,
    /// PEM private key as stored under `tls.key`
    pub private_key: Zeroizing<String>,
    /// Identifier of the record uploaded on a previous pass (renewal)
    pub existing_id: Option<String>,
}

impl fmt::Debug for CertificateData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateData")
            .field("domain", &self.domain)
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .field("existing_id", &self.existing_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// External identifier (ACM ARN, Cloudflare certificate id)
    pub identifier: String,
}

/// Distribution target for certificates
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Stable provider identifier used in status fields and logs
    fn name(&self) -> ProviderKind;

    /// Upload a certificate, replacing the record named by `data.existing_id` on renewal
    async fn upload(
        &self,
        target: &ProviderTarget,
        data: &CertificateData,
    ) -> Result<UploadResult, Error>;

    /// Remove a previously uploaded certificate
    async fn delete(&self, target: &ProviderTarget, identifier: &str) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_data_debug_redacts_key() {
        let data = CertificateData {
            domain: "example.com".into(),
            certificate: "CERT".into(),
            private_key: Zeroizing::new("SECRET-KEY".into()),
            existing_id: None,
        };
        let rendered = format!("{data:?}");
        assert!(!rendered.contains("SECRET-KEY"));
        assert!(rendered.contains("example.com"));
    }

    #[test]
    fn test_provider_names_are_stable() {
        assert_eq!(ProviderKind::Aws.to_string(), "aws");
        assert_eq!(ProviderKind::Cloudflare.as_str(), "cloudflare");
        assert_eq!(ProviderKind::Aws.condition_type(), "AwsUploaded");
    }
}
