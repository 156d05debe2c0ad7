//! # Certificate issuance
//!
//! The issuance driver wraps the external pipeline that actually obtains
//! certificates (cert-manager). It creates the issuing authority and the
//! certificate request, reports readiness, and hands back key material.
//!
//! A pending issuance is reported as [`Readiness::Pending`], never as an error.

use crate::error::Error;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;
use zeroize::Zeroizing;

pub mod cert_manager;

pub use cert_manager::CertManagerIssuer;

/// Parameters for the ACME issuing authority
#[derive(Debug, Clone, PartialEq)]
pub struct IssuerSpec {
    pub name: String,
    pub namespace: String,
    pub email: String,
    /// ACME directory URL
    pub server: String,
    /// Ingress class for the HTTP-01 solver
    pub ingress_class: String,
    /// Owner added alongside any owners already present
    pub owner: OwnerReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerResult {
    pub name: String,
    /// Set when a shared Issuer already carries different ACME settings.
    /// The live settings are left in place.
    pub conflict: Option<String>,
}

/// Parameters for the certificate request
#[derive(Debug, Clone, PartialEq)]
pub struct CertRequestSpec {
    pub name: String,
    pub namespace: String,
    pub domain: String,
    pub issuer_name: String,
    /// Secret the issued key pair is written to
    pub secret_name: String,
    /// Controlling owner of the request
    pub owner: OwnerReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRequestResult {
    pub name: String,
    pub secret_name: String,
}

/// Issued key pair read from the key-material slot
#[derive(Clone)]
pub struct TlsSecret {
    /// Name of the Secret it was read from
    pub name: String,
    pub certificate: String,
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for TlsSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSecret")
            .field("name", &self.name)
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

/// Outcome of a readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Issuance still in progress; check again after `retry_after`
    Pending {
        retry_after: Duration,
        waiting_for: String,
    },
}

/// Certificate issuance backend
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CertIssuer: Send + Sync {
    /// Create the issuing authority, or join it as an owner when it already exists.
    /// Idempotent on identical input.
    async fn ensure_issuer(&self, spec: &IssuerSpec) -> Result<IssuerResult, Error>;

    /// Create or update the certificate request. Idempotent on identical input.
    async fn ensure_certificate(&self, spec: &CertRequestSpec)
        -> Result<CertRequestResult, Error>;

    /// Read the key-material slot.
    ///
    /// `Ok(None)` when the slot exists but is not populated yet; `LookupFailed`
    /// when it does not exist or cannot be read.
    async fn get_tls_secret(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Option<TlsSecret>, Error>;

    /// Whether both the authority and the request report `Ready`
    async fn check_readiness(
        &self,
        namespace: &str,
        issuer_name: &str,
        request_name: &str,
    ) -> Result<Readiness, Error>;
}
