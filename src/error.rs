//! # Errors
//!
//! Error taxonomy shared by the drivers, the manager and the reconciler.
//!
//! Only store I/O and issuance errors escalate to the scheduler. Cloud provider
//! errors (`CredentialsIncomplete`, `UploadFailed`, `DeleteFailed`) are caught by
//! the manager and degrade to "this target was not updated this pass".
//! A pending issuance is not an error at all, see [`crate::issuance::Readiness`].

use crate::provider::ProviderKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An object could not be read from the store, or does not exist when it must
    #[error("lookup failed: {0}")]
    LookupFailed(String),

    /// An object could not be created, updated or patched
    #[error("update failed: {0}")]
    UpdateFailed(String),

    /// Credential secret (or required target settings) missing or incomplete
    #[error("{provider} credentials incomplete: {reason}")]
    CredentialsIncomplete {
        provider: ProviderKind,
        reason: String,
    },

    /// Distribution target rejected or failed the upload
    #[error("upload to {provider} failed: {cause}")]
    UploadFailed { provider: ProviderKind, cause: String },

    /// Distribution target failed to delete a certificate
    #[error("delete from {provider} failed: {cause}")]
    DeleteFailed { provider: ProviderKind, cause: String },

    /// The resource is missing metadata the operator relies on
    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

impl Error {
    pub fn lookup(msg: impl std::fmt::Display) -> Self {
        Self::LookupFailed(msg.to_string())
    }

    pub fn update(msg: impl std::fmt::Display) -> Self {
        Self::UpdateFailed(msg.to_string())
    }

    pub fn credentials(provider: ProviderKind, reason: impl Into<String>) -> Self {
        Self::CredentialsIncomplete {
            provider,
            reason: reason.into(),
        }
    }

    /// Reason string used in status conditions and metric labels
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::LookupFailed(_) => "LookupFailed",
            Self::UpdateFailed(_) => "UpdateFailed",
            Self::CredentialsIncomplete { .. } => "CredentialsIncomplete",
            Self::UploadFailed { .. } => "UploadFailed",
            Self::DeleteFailed { .. } => "DeleteFailed",
            Self::InvalidResource(_) => "InvalidResource",
        }
    }
}

/// Convenience alias for results using the crate error
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_error_mentions_provider() {
        let err = Error::credentials(ProviderKind::Cloudflare, "api-token missing");
        assert_eq!(
            err.to_string(),
            "cloudflare credentials incomplete: api-token missing"
        );
        assert_eq!(err.reason(), "CredentialsIncomplete");
    }

    #[test]
    fn test_upload_failed_display() {
        let err = Error::UploadFailed {
            provider: ProviderKind::Aws,
            cause: "throttled".to_string(),
        };
        assert_eq!(err.to_string(), "upload to aws failed: throttled");
        assert_eq!(err.reason(), "UploadFailed");
    }

    #[test]
    fn test_store_errors_keep_their_reason() {
        assert_eq!(Error::lookup("secret default/web-tls").reason(), "LookupFailed");
        assert_eq!(Error::update("issuer default/le").reason(), "UpdateFailed");
        assert_eq!(
            Error::InvalidResource("no uid".into()).reason(),
            "InvalidResource"
        );
    }
}
