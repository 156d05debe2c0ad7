//! # AWS Certificate Manager
//!
//! Imports certificates into ACM. Renewals re-import onto the existing ARN so the
//! identifier stays stable for every load balancer already using it.

use crate::constants::{
    AWS_ACCESS_KEY_ID_KEY, AWS_REGION_KEY, AWS_SECRET_ACCESS_KEY_KEY, MANAGED_BY,
};
use crate::error::Error;
use crate::kube_client::KubeClient;
use crate::provider::credentials::{self, CredentialPolicy, Credentials};
use crate::provider::{CertificateData, CloudProvider, ProviderKind, ProviderTarget, UploadResult};
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_acm::error::DisplayErrorContext;
use aws_sdk_acm::primitives::Blob;
use aws_sdk_acm::types::Tag;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, Instrument};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// ACM driver; falls back to the SDK default credential chain (IRSA, instance profile)
pub struct AwsAcmProvider {
    kube: Arc<dyn KubeClient>,
    timeout: Duration,
    endpoint_url: Option<String>,
}

impl std::fmt::Debug for AwsAcmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsAcmProvider")
            .field("timeout", &self.timeout)
            .field("endpoint_url", &self.endpoint_url)
            .finish_non_exhaustive()
    }
}

impl AwsAcmProvider {
    #[must_use]
    pub fn new(kube: Arc<dyn KubeClient>, timeout: Duration) -> Self {
        Self {
            kube,
            timeout,
            endpoint_url: None,
        }
    }

    /// Send ACM calls to `endpoint_url` instead of the regional AWS endpoint
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: Option<String>) -> Self {
        self.endpoint_url = endpoint_url;
        self
    }

    /// Build SDK config from the credential secret or the default chain.
    ///
    /// Region precedence: secret `region` key, then `awsRegion`, then SDK default.
    async fn sdk_config(&self, target: &ProviderTarget) -> Result<SdkConfig, Error> {
        let creds = credentials::resolve(
            self.kube.as_ref(),
            ProviderKind::Aws,
            CredentialPolicy::AmbientFallback,
            target,
            &[AWS_ACCESS_KEY_ID_KEY, AWS_SECRET_ACCESS_KEY_KEY],
        )
        .await?;

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(self.timeout)
            .build();
        let mut builder = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);

        let region = match &creds {
            Credentials::Secret(values) => values.get(AWS_REGION_KEY).map(str::to_string),
            Credentials::Ambient => None,
        }
        .or_else(|| target.region.clone());
        if let Some(region) = region {
            builder = builder.region(Region::new(region));
        }
        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        if let Credentials::Secret(values) = &creds {
            // resolve() guarantees both keys are present
            let access_key_id = values.get(AWS_ACCESS_KEY_ID_KEY).unwrap_or_default();
            let secret_access_key = values.get(AWS_SECRET_ACCESS_KEY_KEY).unwrap_or_default();
            builder = builder.credentials_provider(aws_credential_types::Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "kubernetes-secret",
            ));
        }

        Ok(builder.load().await)
    }

    async fn client(&self, target: &ProviderTarget) -> Result<aws_sdk_acm::Client, Error> {
        let config = self.sdk_config(target).await?;
        Ok(aws_sdk_acm::Client::new(&config))
    }
}

#[async_trait]
impl CloudProvider for AwsAcmProvider {
    fn name(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    async fn upload(
        &self,
        target: &ProviderTarget,
        data: &CertificateData,
    ) -> Result<UploadResult, Error> {
        let span = info_span!("aws.acm.import", domain = %data.domain);
        async move {
            let client = self.client(target).await?;
            let upload_failed = |cause: String| Error::UploadFailed {
                provider: ProviderKind::Aws,
                cause,
            };

            let (leaf, chain) = split_pem_chain(&data.certificate);
            let mut request = client
                .import_certificate()
                .certificate(Blob::new(leaf.into_bytes()))
                .private_key(Blob::new(data.private_key.as_bytes().to_vec()));
            if let Some(chain) = chain {
                request = request.certificate_chain(Blob::new(chain.into_bytes()));
            }

            if let Some(arn) = data.existing_id.as_deref() {
                info!(arn = %arn, "Re-importing certificate to existing ARN");
                // ACM rejects tags on re-import; the original import carries them
                request = request.certificate_arn(arn);
            } else {
                for (key, value) in [("ManagedBy", MANAGED_BY), ("Domain", data.domain.as_str())] {
                    let tag = Tag::builder()
                        .key(key)
                        .value(value)
                        .build()
                        .map_err(|e| upload_failed(e.to_string()))?;
                    request = request.tags(tag);
                }
            }

            let output = request
                .send()
                .await
                .map_err(|e| upload_failed(DisplayErrorContext(&e).to_string()))?;

            let identifier = output
                .certificate_arn()
                .filter(|arn| !arn.is_empty())
                .ok_or_else(|| upload_failed("ACM returned no certificate ARN".to_string()))?
                .to_string();

            info!(arn = %identifier, "Certificate imported into ACM");
            Ok(UploadResult { identifier })
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, target: &ProviderTarget, identifier: &str) -> Result<(), Error> {
        let span = info_span!("aws.acm.delete", arn = %identifier);
        async move {
            let client = self.client(target).await?;
            match client
                .delete_certificate()
                .certificate_arn(identifier)
                .send()
                .await
            {
                Ok(_) => {
                    info!("Certificate deleted from ACM");
                    Ok(())
                }
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_resource_not_found_exception()) =>
                {
                    info!("Certificate already absent from ACM");
                    Ok(())
                }
                Err(e) => Err(Error::DeleteFailed {
                    provider: ProviderKind::Aws,
                    cause: DisplayErrorContext(&e).to_string(),
                }),
            }
        }
        .instrument(span)
        .await
    }
}

/// Split a PEM bundle into the leaf certificate and the remaining chain.
///
/// Input without recognizable PEM blocks is returned unchanged as the leaf.
#[must_use]
pub fn split_pem_chain(pem: &str) -> (String, Option<String>) {
    let mut blocks = Vec::new();
    let mut rest = pem;
    while let Some(start) = rest.find(PEM_BEGIN) {
        let Some(end) = rest[start..].find(PEM_END) else {
            break;
        };
        let end = start + end + PEM_END.len();
        blocks.push(&rest[start..end]);
        rest = &rest[end..];
    }

    match blocks.split_first() {
        None => (pem.to_string(), None),
        Some((leaf, [])) => (format!("{leaf}\n"), None),
        Some((leaf, chain)) => {
            let mut joined = chain.join("\n");
            joined.push('\n');
            (format!("{leaf}\n"), Some(joined))
        }
    }
}
