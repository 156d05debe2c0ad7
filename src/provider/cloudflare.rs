//! # Cloudflare custom certificates
//!
//! Uploads certificates as zone custom certificates through the Cloudflare v4 REST API.
//! Cloudflare cannot replace a custom certificate in place, so a renewal deletes
//! the previous record (best-effort) and creates a fresh one.
//!
//! Credentials always come from the referenced Secret (`api-token`); there is no
//! ambient credential chain for this target.

use crate::constants::CLOUDFLARE_API_TOKEN_KEY;
use crate::error::Error;
use crate::kube_client::KubeClient;
use crate::provider::credentials::{self, CredentialPolicy, Credentials};
use crate::provider::{CertificateData, CloudProvider, ProviderKind, ProviderTarget, UploadResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use zeroize::Zeroizing;

/// Cloudflare API response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CustomCertificate {
    id: String,
}

#[derive(Serialize)]
struct CreateCustomCertificate<'a> {
    certificate: &'a str,
    private_key: &'a str,
    bundle_method: &'static str,
}

/// Cloudflare driver
pub struct CloudflareProvider {
    kube: Arc<dyn KubeClient>,
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Token and zone for one call
struct Session {
    token: Zeroizing<String>,
    zone_id: String,
}

impl CloudflareProvider {
    /// Create a driver talking to `base_url` with every request bounded by `timeout`
    pub fn new(
        kube: Arc<dyn KubeClient>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            kube,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn session(&self, target: &ProviderTarget) -> Result<Session, Error> {
        let creds = credentials::resolve(
            self.kube.as_ref(),
            ProviderKind::Cloudflare,
            CredentialPolicy::SecretRequired,
            target,
            &[CLOUDFLARE_API_TOKEN_KEY],
        )
        .await?;
        let Credentials::Secret(values) = creds else {
            return Err(Error::credentials(
                ProviderKind::Cloudflare,
                "a credential secret reference is required",
            ));
        };
        let token = values
            .get(CLOUDFLARE_API_TOKEN_KEY)
            .map(|t| Zeroizing::new(t.to_string()))
            .ok_or_else(|| Error::credentials(ProviderKind::Cloudflare, "api-token is empty"))?;
        let zone_id = target
            .zone_id
            .clone()
            .ok_or_else(|| Error::credentials(ProviderKind::Cloudflare, "cloudflareZoneID is not set"))?;
        Ok(Session { token, zone_id })
    }

    fn certificates_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{zone_id}/custom_certificates", self.base_url)
    }

    async fn create(&self, session: &Session, data: &CertificateData) -> Result<String, String> {
        let body = CreateCustomCertificate {
            certificate: &data.certificate,
            private_key: data.private_key.as_str(),
            bundle_method: "ubiquitous",
        };
        let response = self
            .http
            .post(self.certificates_url(&session.zone_id))
            .bearer_auth(session.token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let result: CustomCertificate = read_envelope(response).await?;
        Ok(result.id)
    }

    async fn remove(&self, session: &Session, identifier: &str) -> Result<(), String> {
        let url = format!("{}/{identifier}", self.certificates_url(&session.zone_id));
        let response = self
            .http
            .delete(url)
            .bearer_auth(session.token.as_str())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!(id = %identifier, "Custom certificate already absent from Cloudflare");
            return Ok(());
        }
        read_envelope::<serde_json::Value>(response).await.map(|_| ())
    }
}

/// Decode a Cloudflare envelope, turning `success: false` into its error messages
async fn read_envelope<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, String> {
    let status = response.status();
    let text = response.text().await.map_err(|e| e.to_string())?;
    let envelope: Envelope<T> = serde_json::from_str(&text)
        .map_err(|e| format!("HTTP {status}: unexpected response ({e}): {text}"))?;

    if !envelope.success || !status.is_success() {
        let messages: Vec<String> = envelope
            .errors
            .iter()
            .map(|m| format!("{} ({})", m.message, m.code))
            .collect();
        return Err(if messages.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", messages.join("; "))
        });
    }

    envelope
        .result
        .ok_or_else(|| format!("HTTP {status}: response carried no result"))
}

#[async_trait]
impl CloudProvider for CloudflareProvider {
    fn name(&self) -> ProviderKind {
        ProviderKind::Cloudflare
    }

    async fn upload(
        &self,
        target: &ProviderTarget,
        data: &CertificateData,
    ) -> Result<UploadResult, Error> {
        let span = info_span!("cloudflare.upload", domain = %data.domain);
        async move {
            let session = self.session(target).await?;

            if let Some(old_id) = data.existing_id.as_deref() {
                info!(id = %old_id, "Deleting previous custom certificate before upload");
                if let Err(cause) = self.remove(&session, old_id).await {
                    warn!(id = %old_id, error = %cause, "Failed to delete previous custom certificate, continuing with upload");
                }
            }

            let identifier = self
                .create(&session, data)
                .await
                .map_err(|cause| Error::UploadFailed {
                    provider: ProviderKind::Cloudflare,
                    cause,
                })?;
            info!(id = %identifier, zone = %session.zone_id, "Custom certificate uploaded to Cloudflare");
            Ok(UploadResult { identifier })
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, target: &ProviderTarget, identifier: &str) -> Result<(), Error> {
        let span = info_span!("cloudflare.delete", id = %identifier);
        async move {
            let session = self.session(target).await?;
            self.remove(&session, identifier)
                .await
                .map_err(|cause| Error::DeleteFailed {
                    provider: ProviderKind::Cloudflare,
                    cause,
                })?;
            info!("Custom certificate deleted from Cloudflare");
            Ok(())
        }
        .instrument(span)
        .await
    }
}
