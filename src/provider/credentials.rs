//! # Credential resolution
//!
//! Reads and validates the credential Secret referenced by a target before every
//! driver call.

use crate::error::Error;
use crate::kube_client::KubeClient;
use crate::provider::{ProviderKind, ProviderTarget};
use std::collections::BTreeMap;
use tracing::debug;
use zeroize::Zeroizing;

/// Whether a target may fall back to the ambient credential chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Only an explicit secret is acceptable
    SecretRequired,
    /// Without a secret reference, use environment / workload identity
    AmbientFallback,
}

/// Resolved credentials for one driver call
#[derive(Debug)]
pub enum Credentials {
    Secret(SecretValues),
    Ambient,
}

/// String values of a credential Secret, wiped on drop
pub struct SecretValues(BTreeMap<String, Zeroizing<String>>);

impl std::fmt::Debug for SecretValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl SecretValues {
    /// Non-empty value stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.as_str().trim())
            .filter(|v| !v.is_empty())
    }
}

/// Resolve credentials for `target` according to `policy`.
///
/// Every key in `required` must be present and non-empty, otherwise the call
/// fails with [`Error::CredentialsIncomplete`].
pub async fn resolve(
    kube: &dyn KubeClient,
    provider: ProviderKind,
    policy: CredentialPolicy,
    target: &ProviderTarget,
    required: &[&str],
) -> Result<Credentials, Error> {
    let Some(secret_name) = target.secret_ref.as_deref() else {
        return match policy {
            CredentialPolicy::AmbientFallback => {
                debug!(provider = %provider, "No secret reference, using ambient credential chain");
                Ok(Credentials::Ambient)
            }
            CredentialPolicy::SecretRequired => Err(Error::credentials(
                provider,
                "a credential secret reference is required",
            )),
        };
    };

    let secret = kube
        .get_secret(&target.namespace, secret_name)
        .await?
        .ok_or_else(|| {
            Error::credentials(
                provider,
                format!("secret {}/{secret_name} not found", target.namespace),
            )
        })?;

    let values = SecretValues(
        secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Zeroizing::new(String::from_utf8_lossy(&v.0).into_owned())))
            .collect(),
    );

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| values.get(key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(Error::credentials(
            provider,
            format!(
                "secret {}/{secret_name} is missing {}",
                target.namespace,
                missing.join(", ")
            ),
        ));
    }

    Ok(Credentials::Secret(values))
}
