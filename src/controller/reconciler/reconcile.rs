//! # Reconcile
//!
//! Finalizer protocol and status persistence around one manager pass.

use crate::constants::CERTIFICATE_FINALIZER;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, RequeueReason};
use crate::crd::Certificate;
use crate::error::Error;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

fn has_finalizer(cert: &Certificate) -> bool {
    cert.finalizers().iter().any(|f| f == CERTIFICATE_FINALIZER)
}

/// Reconcile one Certificate
#[instrument(
    skip(cert, ctx),
    fields(name = %cert.name_any(), namespace = ?cert.namespace())
)]
pub async fn reconcile(
    cert: Arc<Certificate>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations();

    let name = cert.name_any();
    let namespace = cert
        .namespace()
        .ok_or_else(|| Error::InvalidResource(format!("certificate {name} has no namespace")))?;
    let resource_key = format!("{namespace}/{name}");

    if cert.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&cert, &ctx, &namespace, &name, &resource_key).await;
    }

    // The finalizer goes on before any other mutation so a deletion that
    // arrives mid-pass still reaches teardown.
    if !has_finalizer(&cert) {
        ctx.kube
            .add_finalizer(&namespace, &name, CERTIFICATE_FINALIZER)
            .await?;
        info!("Added finalizer");
    }

    let outcome = ctx.manager.process(&cert).await?;

    if outcome.changed {
        ctx.kube
            .patch_status(&namespace, &name, &outcome.status)
            .await?;
        debug!("Status updated");
    }

    let was_in_backoff = ctx.reset_backoff(&resource_key);
    if was_in_backoff {
        info!("🔄 Backoff reset after successful reconciliation");
    }
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    let (delay, reason) = match outcome.requeue_after {
        Some(delay) => (delay, RequeueReason::NotReady),
        None => (ctx.config.requeue_interval(), RequeueReason::Scheduled),
    };
    metrics::increment_requeues(reason.as_str());

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
    info!(
        "📅 Next scheduled reconciliation: {} (in {}s, reason: {})",
        next_trigger_time.to_rfc3339(),
        delay.as_secs(),
        reason.as_str()
    );

    Ok(Action::requeue(delay))
}

/// Teardown path: best-effort cloud cleanup, then release the finalizer.
///
/// Issuance objects are owned by the Certificate and removed by garbage collection.
async fn handle_deletion(
    cert: &Certificate,
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    resource_key: &str,
) -> Result<Action, ReconcilerError> {
    if !has_finalizer(cert) {
        debug!("Deletion in progress without our finalizer, nothing to do");
        return Ok(Action::await_change());
    }

    info!("Finalizing certificate");
    let report = ctx.manager.finalize(cert).await?;
    for (provider, cause) in &report.failed {
        warn!(
            provider = %provider,
            error = %cause,
            "Cloud certificate could not be deleted and must be removed manually"
        );
    }

    ctx.kube
        .remove_finalizer(namespace, name, CERTIFICATE_FINALIZER)
        .await?;
    ctx.forget_backoff(resource_key);

    info!(
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "Certificate finalization complete"
    );
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::manager::{calculate_cert_hash, CertificateManager};
    use crate::crd::{CertificateSpec, CertificateStatus};
    use crate::issuance::{CertRequestResult, IssuerResult, MockCertIssuer, Readiness, TlsSecret};
    use crate::kube_client::MockKubeClient;
    use crate::provider::{CloudProvider, MockCloudProvider, ProviderKind, UploadResult};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;
    use mockall::Sequence;
    use std::time::Duration;
    use zeroize::Zeroizing;

    fn sample_certificate(finalizer: bool, status: Option<CertificateStatus>) -> Certificate {
        let mut cert = Certificate::new(
            "web",
            CertificateSpec {
                domain: "example.com".into(),
                email: "admin@example.com".into(),
                aws_secret_ref: Some("aws-creds".into()),
                ..Default::default()
            },
        );
        cert.metadata = ObjectMeta {
            name: Some("web".into()),
            namespace: Some("default".into()),
            uid: Some("uid-1".into()),
            finalizers: finalizer.then(|| vec![CERTIFICATE_FINALIZER.to_string()]),
            ..Default::default()
        };
        cert.status = status;
        cert
    }

    fn deleting(mut cert: Certificate) -> Certificate {
        let timestamp: Time = serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap();
        cert.metadata.deletion_timestamp = Some(timestamp);
        cert
    }

    fn issuer_serving(cert: &'static str) -> MockCertIssuer {
        let mut issuer = MockCertIssuer::new();
        issuer
            .expect_ensure_issuer()
            .returning(|spec| Ok(IssuerResult { name: spec.name.clone(), conflict: None }));
        issuer.expect_ensure_certificate().returning(|spec| {
            Ok(CertRequestResult {
                name: spec.name.clone(),
                secret_name: spec.secret_name.clone(),
            })
        });
        issuer
            .expect_check_readiness()
            .returning(|_, _, _| Ok(Readiness::Ready));
        issuer.expect_get_tls_secret().returning(move |_, _| {
            Ok(Some(TlsSecret {
                name: "web-tls".into(),
                certificate: cert.into(),
                private_key: Zeroizing::new("KEY".into()),
            }))
        });
        issuer
    }

    fn aws_provider() -> MockCloudProvider {
        let mut aws = MockCloudProvider::new();
        aws.expect_name().return_const(ProviderKind::Aws);
        aws.expect_upload().returning(|_, _| {
            Ok(UploadResult {
                identifier: "arn:1".into(),
            })
        });
        aws
    }

    fn context(kube: MockKubeClient, issuer: MockCertIssuer, aws: MockCloudProvider) -> Arc<Reconciler> {
        let config = ControllerConfig::default();
        let manager = CertificateManager::new(
            Arc::new(issuer),
            vec![Arc::new(aws) as Arc<dyn CloudProvider>],
            config.clone(),
        );
        Arc::new(Reconciler::new(Arc::new(kube), Arc::new(manager), config))
    }

    #[tokio::test]
    async fn test_finalizer_added_before_status_write() {
        let mut seq = Sequence::new();
        let mut kube = MockKubeClient::new();
        kube.expect_add_finalizer()
            .withf(|ns, name, f| ns == "default" && name == "web" && f == CERTIFICATE_FINALIZER)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        kube.expect_patch_status()
            .withf(|_, _, status| status.aws_uploaded)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let ctx = context(kube, issuer_serving("B1"), aws_provider());
        let action = reconcile(Arc::new(sample_certificate(false, None)), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let mut status = CertificateStatus {
            issuer_ref: Some("letsencrypt-prod".into()),
            certificate_ref: Some("web-cert".into()),
            aws_uploaded: true,
            aws_certificate_arn: Some("arn:1".into()),
            last_uploaded_cert_hash: Some(calculate_cert_hash(b"B1")),
            last_uploaded_time: Some("2026-01-01T00:00:00+00:00".into()),
            ..Default::default()
        };
        status.set_condition(
            crate::crd::READY_CONDITION,
            crate::crd::ConditionStatus::True,
            "Issued",
            "certificate for example.com is issued".into(),
        );
        status.set_condition(
            "AwsUploaded",
            crate::crd::ConditionStatus::True,
            "Uploaded",
            "certificate uploaded to aws".into(),
        );

        let mut kube = MockKubeClient::new();
        kube.expect_add_finalizer().never();
        kube.expect_patch_status().never();
        let mut aws = MockCloudProvider::new();
        aws.expect_name().return_const(ProviderKind::Aws);
        aws.expect_upload().never();

        let ctx = context(kube, issuer_serving("B1"), aws);
        let action = reconcile(Arc::new(sample_certificate(true, Some(status))), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_pending_issuance_requeues_without_error() {
        let mut issuer = MockCertIssuer::new();
        issuer
            .expect_ensure_issuer()
            .returning(|spec| Ok(IssuerResult { name: spec.name.clone(), conflict: None }));
        issuer.expect_ensure_certificate().returning(|spec| {
            Ok(CertRequestResult {
                name: spec.name.clone(),
                secret_name: spec.secret_name.clone(),
            })
        });
        issuer.expect_check_readiness().returning(|_, _, _| {
            Ok(Readiness::Pending {
                retry_after: Duration::from_secs(30),
                waiting_for: "Issuer letsencrypt-prod".into(),
            })
        });
        let mut kube = MockKubeClient::new();
        kube.expect_patch_status()
            .withf(|_, _, status| status.certificate_ref.as_deref() == Some("web-cert"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let ctx = context(kube, issuer, aws_provider());
        let action = reconcile(Arc::new(sample_certificate(true, None)), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_manager_error_propagates_without_status_write() {
        let mut issuer = MockCertIssuer::new();
        issuer
            .expect_ensure_issuer()
            .returning(|_| Err(Error::update("issuer default/letsencrypt-prod: forbidden")));
        let mut kube = MockKubeClient::new();
        kube.expect_patch_status().never();

        let ctx = context(kube, issuer, aws_provider());
        let err = reconcile(Arc::new(sample_certificate(true, None)), ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcilerError::ReconciliationFailed(Error::UpdateFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_deletion_tears_down_before_releasing_finalizer() {
        let status = CertificateStatus {
            aws_uploaded: true,
            aws_certificate_arn: Some("arn:1".into()),
            ..Default::default()
        };
        let mut seq = Sequence::new();
        let mut aws = MockCloudProvider::new();
        aws.expect_name().return_const(ProviderKind::Aws);
        aws.expect_delete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(Error::DeleteFailed {
                    provider: ProviderKind::Aws,
                    cause: "AccessDenied".into(),
                })
            });
        let mut kube = MockKubeClient::new();
        kube.expect_remove_finalizer()
            .withf(|_, name, f| name == "web" && f == CERTIFICATE_FINALIZER)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        kube.expect_patch_status().never();

        let ctx = context(kube, MockCertIssuer::new(), aws);
        let action = reconcile(
            Arc::new(deleting(sample_certificate(true, Some(status)))),
            ctx,
        )
        .await
        .unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn test_deletion_without_finalizer_is_a_noop() {
        let mut kube = MockKubeClient::new();
        kube.expect_remove_finalizer().never();
        let mut aws = MockCloudProvider::new();
        aws.expect_name().return_const(ProviderKind::Aws);
        aws.expect_delete().never();

        let ctx = context(kube, MockCertIssuer::new(), aws);
        let action = reconcile(Arc::new(deleting(sample_certificate(false, None))), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn test_success_resets_backoff() {
        let mut kube = MockKubeClient::new();
        kube.expect_patch_status().returning(|_, _, _| Ok(()));
        let ctx = context(kube, issuer_serving("B1"), aws_provider());

        ctx.next_error_backoff("default/web");
        ctx.next_error_backoff("default/web");
        reconcile(Arc::new(sample_certificate(true, None)), Arc::clone(&ctx))
            .await
            .unwrap();

        let states = ctx.backoff_states.lock().unwrap();
        assert_eq!(states.get("default/web").unwrap().error_count, 0);
    }
}
