//! # Certificate Manager
//!
//! Orchestrates one reconciliation pass for one Certificate:
//!
//! 1. Resolve defaults (issuer name, ingress class)
//! 2. Ensure the Issuer and the certificate request exist, record their names.
//!    A shared Issuer with different ACME settings stops the pass
//! 3. While cert-manager is still issuing, ask for a requeue
//! 4. Read the key material from `{name}-tls`
//! 5. Compare the SHA-256 of `tls.crt` with the last distributed hash
//! 6. Upload to every configured and enabled target, isolating failures
//!
//! The manager never persists anything. It returns the new status and the
//! reconciler decides whether to write it.

use crate::config::ControllerConfig;
use crate::constants::{CERT_REQUEST_SUFFIX, TLS_SECRET_SUFFIX};
use crate::crd::{
    Certificate, CertificateSpec, CertificateStatus, ConditionStatus, READY_CONDITION,
};
use crate::error::Error;
use crate::issuance::{CertIssuer, CertRequestSpec, IssuerSpec, Readiness, TlsSecret};
use crate::observability::metrics;
use crate::provider::{CertificateData, CloudProvider, ProviderKind};
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of [`CertificateManager::process`]
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Status after this pass
    pub status: CertificateStatus,
    /// Whether `status` differs from what the resource carried
    pub changed: bool,
    /// Set while issuance is pending
    pub requeue_after: Option<Duration>,
}

/// Result of [`CertificateManager::finalize`]
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub deleted: Vec<ProviderKind>,
    /// Targets whose delete failed; the cloud record may need manual cleanup
    pub failed: Vec<(ProviderKind, String)>,
}

#[derive(Debug, Default)]
struct Distribution {
    attempted: usize,
    succeeded: usize,
}

/// Issuance and distribution orchestration
pub struct CertificateManager {
    issuer: Arc<dyn CertIssuer>,
    providers: BTreeMap<ProviderKind, Arc<dyn CloudProvider>>,
    config: ControllerConfig,
}

impl std::fmt::Debug for CertificateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateManager")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CertificateManager {
    /// Build a manager; providers are keyed by their [`CloudProvider::name`]
    #[must_use]
    pub fn new(
        issuer: Arc<dyn CertIssuer>,
        providers: Vec<Arc<dyn CloudProvider>>,
        config: ControllerConfig,
    ) -> Self {
        let providers = providers.into_iter().map(|p| (p.name(), p)).collect();
        Self {
            issuer,
            providers,
            config,
        }
    }

    /// Run one forward pass for `cert`
    pub async fn process(&self, cert: &Certificate) -> Result<ProcessOutcome, Error> {
        let name = cert.name_any();
        let namespace = cert
            .namespace()
            .ok_or_else(|| Error::InvalidResource(format!("certificate {name} has no namespace")))?;
        let owner = cert
            .controller_owner_ref(&())
            .ok_or_else(|| Error::InvalidResource(format!("certificate {name} has no uid")))?;
        let spec = &cert.spec;

        let original = cert.status.clone().unwrap_or_default();
        let mut status = original.clone();

        let issuer_name = spec.issuer_name_or(&self.config.default_issuer_name).to_string();
        let ingress_class = spec.ingress_class_or(&self.config.default_ingress_class);

        let issuer = self
            .issuer
            .ensure_issuer(&IssuerSpec {
                name: issuer_name.clone(),
                namespace: namespace.clone(),
                email: spec.email.clone(),
                server: self.config.acme_server.clone(),
                ingress_class: ingress_class.to_string(),
                owner: owner.clone(),
            })
            .await?;
        status.issuer_ref = Some(issuer.name);

        if let Some(conflict) = issuer.conflict {
            warn!(issuer = %issuer_name, "Shared issuer has different ACME settings, not requesting a certificate");
            status.set_condition(READY_CONDITION, ConditionStatus::False, "IssuerConflict", conflict);
            return Ok(outcome(&original, status, None));
        }

        let request = self
            .issuer
            .ensure_certificate(&CertRequestSpec {
                name: format!("{name}{CERT_REQUEST_SUFFIX}"),
                namespace: namespace.clone(),
                domain: spec.domain.clone(),
                issuer_name: issuer_name.clone(),
                secret_name: format!("{name}{TLS_SECRET_SUFFIX}"),
                owner,
            })
            .await?;
        status.certificate_ref = Some(request.name.clone());

        if let Readiness::Pending {
            retry_after,
            waiting_for,
        } = self
            .issuer
            .check_readiness(&namespace, &issuer_name, &request.name)
            .await?
        {
            info!(waiting_for = %waiting_for, retry_after_secs = retry_after.as_secs(), "Issuance pending");
            status.set_condition(
                READY_CONDITION,
                ConditionStatus::False,
                "Issuing",
                format!("waiting for {waiting_for}"),
            );
            return Ok(outcome(&original, status, Some(retry_after)));
        }

        let Some(material) = self
            .issuer
            .get_tls_secret(&namespace, &request.secret_name)
            .await?
        else {
            status.set_condition(
                READY_CONDITION,
                ConditionStatus::False,
                "AwaitingKeyMaterial",
                format!("secret {} is not populated yet", request.secret_name),
            );
            return Ok(outcome(&original, status, Some(self.config.not_ready_requeue())));
        };

        status.set_condition(
            READY_CONDITION,
            ConditionStatus::True,
            "Issued",
            format!("certificate for {} is issued", spec.domain),
        );

        let hash = calculate_cert_hash(material.certificate.as_bytes());
        let cert_changed = status.last_uploaded_cert_hash.as_deref() != Some(hash.as_str());
        let targets = distribution_targets(spec, &status, cert_changed);

        if cert_changed {
            match status.last_uploaded_cert_hash.as_deref() {
                Some(old) => info!(old_hash = %old, new_hash = %hash, "Certificate changed, distributing"),
                None => info!(hash = %hash, "Certificate ready for initial distribution"),
            }
        } else if targets.is_empty() {
            debug!(hash = %hash, "Certificate unchanged, skipping distribution");
            return Ok(outcome(&original, status, None));
        } else {
            info!(targets = ?targets, "Retrying targets that have not received the current certificate");
        }

        let result = self
            .distribute(spec, &namespace, &material, &targets, &mut status)
            .await;

        // Failed targets keep a False condition and are retried on the next pass
        // even when the hash has advanced.
        if cert_changed && (result.attempted == 0 || result.succeeded > 0) {
            status.last_uploaded_cert_hash = Some(hash);
            status.last_uploaded_time = Some(chrono::Utc::now().to_rfc3339());
        }

        Ok(outcome(&original, status, None))
    }

    async fn distribute(
        &self,
        spec: &CertificateSpec,
        namespace: &str,
        material: &TlsSecret,
        targets: &[ProviderKind],
        status: &mut CertificateStatus,
    ) -> Distribution {
        let mut result = Distribution::default();

        for &kind in targets {
            result.attempted += 1;
            let Some(provider) = self.providers.get(&kind) else {
                warn!(provider = %kind, "No driver registered for target, skipping");
                status.record_failure(
                    kind,
                    "ProviderUnavailable",
                    format!("no {kind} driver is registered"),
                );
                metrics::increment_uploads(kind.as_str(), "failure");
                continue;
            };

            let data = CertificateData {
                domain: spec.domain.clone(),
                certificate: material.certificate.clone(),
                private_key: material.private_key.clone(),
                existing_id: status.identifier(kind).map(str::to_string),
            };
            let target = spec.target(kind, namespace);

            match provider.upload(&target, &data).await {
                Ok(upload) => {
                    info!(provider = %kind, identifier = %upload.identifier, "Certificate uploaded");
                    status.record_upload(kind, upload.identifier);
                    metrics::increment_uploads(kind.as_str(), "success");
                    result.succeeded += 1;
                }
                Err(e) => {
                    warn!(provider = %kind, error = %e, "Failed to upload certificate, target skipped for this pass");
                    status.record_failure(kind, e.reason(), e.to_string());
                    metrics::increment_uploads(kind.as_str(), "failure");
                }
            }
        }

        result
    }

    /// Best-effort removal of every recorded cloud record.
    ///
    /// Targets are visited regardless of their enable flags; a failing delete is
    /// logged and reported but never stops the others.
    pub async fn finalize(&self, cert: &Certificate) -> Result<TeardownReport, Error> {
        let name = cert.name_any();
        let namespace = cert
            .namespace()
            .ok_or_else(|| Error::InvalidResource(format!("certificate {name} has no namespace")))?;
        let status = cert.status.clone().unwrap_or_default();
        let mut report = TeardownReport::default();

        for kind in ProviderKind::ALL {
            let Some(identifier) = status.identifier(kind) else {
                continue;
            };
            let Some(provider) = self.providers.get(&kind) else {
                warn!(provider = %kind, identifier = %identifier, "No driver registered, cloud record left behind");
                report
                    .failed
                    .push((kind, format!("no {kind} driver is registered")));
                continue;
            };

            let target = cert.spec.target(kind, &namespace);
            match provider.delete(&target, identifier).await {
                Ok(()) => {
                    info!(provider = %kind, identifier = %identifier, "Deleted certificate from target");
                    metrics::increment_deletes(kind.as_str(), "success");
                    report.deleted.push(kind);
                }
                Err(e) => {
                    warn!(
                        provider = %kind,
                        identifier = %identifier,
                        error = %e,
                        "Failed to delete certificate from target, manual cleanup may be required"
                    );
                    metrics::increment_deletes(kind.as_str(), "failure");
                    report.failed.push((kind, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

/// Targets to upload to in this pass.
///
/// A changed certificate goes to every configured and enabled target. An
/// unchanged one only goes to targets that never received it or whose last
/// attempt failed.
fn distribution_targets(
    spec: &CertificateSpec,
    status: &CertificateStatus,
    cert_changed: bool,
) -> Vec<ProviderKind> {
    ProviderKind::ALL
        .into_iter()
        .filter(|&kind| spec.is_enabled(kind))
        .filter(|&kind| {
            cert_changed
                || !status.uploaded(kind)
                || status
                    .condition(kind.condition_type())
                    .is_some_and(|c| c.status == ConditionStatus::False.as_str())
        })
        .collect()
}

fn outcome(
    original: &CertificateStatus,
    status: CertificateStatus,
    requeue_after: Option<Duration>,
) -> ProcessOutcome {
    ProcessOutcome {
        changed: &status != original,
        status,
        requeue_after,
    }
}

/// Lower-case hex SHA-256 of the certificate bytes
#[must_use]
pub fn calculate_cert_hash(certificate: &[u8]) -> String {
    format!("{:x}", Sha256::digest(certificate))
}
