//! # cert-manager issuance driver
//!
//! Issuers and certificate requests are written with server-side apply so
//! repeated passes with the same input are no-ops on the API server.
//!
//! An Issuer can be shared by every Certificate in a namespace. The first
//! Certificate to create it decides its ACME settings; later users only add
//! themselves as owners and get a conflict back when their settings differ.

use crate::constants::{ACCOUNT_KEY_SUFFIX, MANAGED_BY, MANAGED_BY_LABEL, TLS_CERT_KEY, TLS_KEY_KEY};
use crate::crd::cert_manager::{
    AcmeIssuer, AcmeSolver, CertManagerCertificate, CertManagerCertificateSpec, Http01Ingress,
    Http01Solver, Issuer, IssuerReference, SecretKeySelector,
};
use crate::error::Error;
use crate::issuance::{
    CertIssuer, CertRequestResult, CertRequestSpec, IssuerResult, IssuerSpec, Readiness, TlsSecret,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Issuance driver backed by cert-manager
#[derive(Clone)]
pub struct CertManagerIssuer {
    client: Client,
    field_manager: String,
    not_ready_requeue: Duration,
}

impl std::fmt::Debug for CertManagerIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertManagerIssuer")
            .field("field_manager", &self.field_manager)
            .field("not_ready_requeue", &self.not_ready_requeue)
            .finish_non_exhaustive()
    }
}

impl CertManagerIssuer {
    #[must_use]
    pub fn new(client: Client, field_manager: impl Into<String>, not_ready_requeue: Duration) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            not_ready_requeue,
        }
    }

    fn apply_params(&self) -> PatchParams {
        PatchParams::apply(&self.field_manager).force()
    }

    fn pending(&self, waiting_for: String) -> Readiness {
        Readiness::Pending {
            retry_after: self.not_ready_requeue,
            waiting_for,
        }
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string())])
}

/// Add `ours` to `existing`, replacing any entry with the same uid.
///
/// Issuers can be shared by several Certificates, so every user is recorded as a
/// plain (non-controller) owner and garbage collection waits for the last one.
#[must_use]
pub fn merge_owner_references(
    existing: Vec<OwnerReference>,
    ours: &OwnerReference,
) -> Vec<OwnerReference> {
    let ours = OwnerReference {
        controller: None,
        ..ours.clone()
    };
    let mut merged: Vec<OwnerReference> = existing
        .into_iter()
        .filter(|o| o.uid != ours.uid)
        .collect();
    merged.push(ours);
    merged
}

/// Desired Issuer object for `spec`, keeping owners already recorded on the live object
#[must_use]
pub fn build_issuer(spec: &IssuerSpec, existing_owners: Vec<OwnerReference>) -> Issuer {
    let mut issuer = Issuer::new(
        &spec.name,
        crate::crd::cert_manager::IssuerSpec {
            acme: Some(AcmeIssuer {
                email: spec.email.clone(),
                server: spec.server.clone(),
                private_key_secret_ref: SecretKeySelector {
                    name: format!("{}{ACCOUNT_KEY_SUFFIX}", spec.name),
                },
                solvers: vec![AcmeSolver {
                    http01: Some(Http01Solver {
                        ingress: Some(Http01Ingress {
                            class: Some(spec.ingress_class.clone()),
                        }),
                    }),
                }],
            }),
        },
    );
    issuer.metadata = ObjectMeta {
        name: Some(spec.name.clone()),
        namespace: Some(spec.namespace.clone()),
        labels: Some(managed_labels()),
        owner_references: Some(merge_owner_references(existing_owners, &spec.owner)),
        ..Default::default()
    };
    issuer
}

/// Write needed to bring the live Issuer in line with one Certificate
#[derive(Debug, Clone)]
pub enum IssuerWrite {
    /// Server-side apply the full desired object
    Apply(Box<Issuer>),
    /// Record the caller as one more owner, leaving the spec alone
    AddOwner {
        owners: Vec<OwnerReference>,
        resource_version: Option<String>,
    },
    Nothing,
}

/// Result of [`plan_issuer`]
#[derive(Debug, Clone)]
pub struct IssuerPlan {
    pub write: IssuerWrite,
    pub conflict: Option<String>,
}

fn describe_acme(acme: Option<&AcmeIssuer>) -> String {
    let Some(acme) = acme else {
        return "a non-ACME configuration".to_string();
    };
    let class = acme
        .solvers
        .iter()
        .find_map(|s| s.http01.as_ref()?.ingress.as_ref()?.class.as_deref())
        .unwrap_or("none");
    format!("email {} and ingress class {class} at {}", acme.email, acme.server)
}

/// Decide how to reconcile `spec` against the live Issuer.
///
/// Absent, or owned only by the caller: apply the desired object. Shared and
/// matching: add the caller as an owner if needed. Shared with different ACME
/// settings: keep the live settings and report a conflict.
#[must_use]
pub fn plan_issuer(spec: &IssuerSpec, live: Option<&Issuer>) -> IssuerPlan {
    let Some(live) = live else {
        return IssuerPlan {
            write: IssuerWrite::Apply(Box::new(build_issuer(spec, Vec::new()))),
            conflict: None,
        };
    };

    let owners = live.metadata.owner_references.clone().unwrap_or_default();
    let is_owner = owners.iter().any(|o| o.uid == spec.owner.uid);
    let sole_owner = is_owner && owners.iter().all(|o| o.uid == spec.owner.uid);
    let desired = build_issuer(spec, owners.clone());

    let matches = live.spec.acme == desired.spec.acme;
    if !matches && sole_owner {
        return IssuerPlan {
            write: IssuerWrite::Apply(Box::new(desired)),
            conflict: None,
        };
    }

    let write = if is_owner {
        IssuerWrite::Nothing
    } else {
        IssuerWrite::AddOwner {
            owners: merge_owner_references(owners, &spec.owner),
            resource_version: live.metadata.resource_version.clone(),
        }
    };
    let conflict = (!matches).then(|| {
        format!(
            "issuer {}/{} is shared and uses {}, this certificate asks for {}",
            spec.namespace,
            spec.name,
            describe_acme(live.spec.acme.as_ref()),
            describe_acme(desired.spec.acme.as_ref()),
        )
    });
    IssuerPlan { write, conflict }
}

/// Desired cert-manager Certificate for `spec`
#[must_use]
pub fn build_certificate_request(spec: &CertRequestSpec) -> CertManagerCertificate {
    let mut request = CertManagerCertificate::new(
        &spec.name,
        CertManagerCertificateSpec {
            secret_name: spec.secret_name.clone(),
            dns_names: vec![spec.domain.clone()],
            issuer_ref: IssuerReference {
                name: spec.issuer_name.clone(),
                kind: Some("Issuer".to_string()),
                group: Some("cert-manager.io".to_string()),
            },
        },
    );
    request.metadata = ObjectMeta {
        name: Some(spec.name.clone()),
        namespace: Some(spec.namespace.clone()),
        labels: Some(managed_labels()),
        owner_references: Some(vec![spec.owner.clone()]),
        ..Default::default()
    };
    request
}

/// Extract the key pair from a TLS secret; `None` while either half is empty
#[must_use]
pub fn parse_tls_secret(secret: &Secret) -> Option<TlsSecret> {
    let data = secret.data.as_ref()?;
    let read = |key: &str| {
        data.get(key)
            .filter(|v| !v.0.is_empty())
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
    };
    let certificate = read(TLS_CERT_KEY)?;
    let private_key = Zeroizing::new(read(TLS_KEY_KEY)?);
    Some(TlsSecret {
        name: secret.metadata.name.clone().unwrap_or_default(),
        certificate,
        private_key,
    })
}

#[async_trait]
impl CertIssuer for CertManagerIssuer {
    async fn ensure_issuer(&self, spec: &IssuerSpec) -> Result<IssuerResult, Error> {
        let api: Api<Issuer> = Api::namespaced(self.client.clone(), &spec.namespace);
        let update_failed =
            |e: kube::Error| Error::update(format!("issuer {}/{}: {e}", spec.namespace, spec.name));

        let live = api
            .get_opt(&spec.name)
            .await
            .map_err(|e| Error::lookup(format!("issuer {}/{}: {e}", spec.namespace, spec.name)))?;

        let plan = plan_issuer(spec, live.as_ref());
        match plan.write {
            IssuerWrite::Apply(issuer) => {
                api.patch(&spec.name, &self.apply_params(), &Patch::Apply(&*issuer))
                    .await
                    .map_err(update_failed)?;
                debug!(issuer = %spec.name, namespace = %spec.namespace, "Issuer applied");
            }
            IssuerWrite::AddOwner {
                owners,
                resource_version,
            } => {
                let mut metadata = serde_json::json!({ "ownerReferences": owners });
                // a concurrent owner change fails with 409 and is retried
                if let Some(version) = resource_version {
                    metadata["resourceVersion"] = version.into();
                }
                let patch = serde_json::json!({ "metadata": metadata });
                api.patch(&spec.name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(update_failed)?;
                debug!(issuer = %spec.name, namespace = %spec.namespace, "Joined shared issuer");
            }
            IssuerWrite::Nothing => {}
        }

        if let Some(conflict) = &plan.conflict {
            warn!(issuer = %spec.name, namespace = %spec.namespace, "{}", conflict);
        }
        Ok(IssuerResult {
            name: spec.name.clone(),
            conflict: plan.conflict,
        })
    }

    async fn ensure_certificate(
        &self,
        spec: &CertRequestSpec,
    ) -> Result<CertRequestResult, Error> {
        let api: Api<CertManagerCertificate> =
            Api::namespaced(self.client.clone(), &spec.namespace);

        let request = build_certificate_request(spec);
        api.patch(&spec.name, &self.apply_params(), &Patch::Apply(&request))
            .await
            .map_err(|e| {
                Error::update(format!(
                    "certificate request {}/{}: {e}",
                    spec.namespace, spec.name
                ))
            })?;

        debug!(request = %spec.name, namespace = %spec.namespace, "Certificate request applied");
        Ok(CertRequestResult {
            name: spec.name.clone(),
            secret_name: spec.secret_name.clone(),
        })
    }

    async fn get_tls_secret(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Option<TlsSecret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get_opt(secret_name)
            .await
            .map_err(|e| Error::lookup(format!("secret {namespace}/{secret_name}: {e}")))?
            .ok_or_else(|| {
                Error::lookup(format!("secret {namespace}/{secret_name} does not exist"))
            })?;

        let material = parse_tls_secret(&secret);
        if material.is_none() {
            info!(secret = %secret_name, "TLS secret exists but is not populated yet");
        }
        Ok(material)
    }

    async fn check_readiness(
        &self,
        namespace: &str,
        issuer_name: &str,
        request_name: &str,
    ) -> Result<Readiness, Error> {
        let issuers: Api<Issuer> = Api::namespaced(self.client.clone(), namespace);
        let issuer = issuers
            .get_opt(issuer_name)
            .await
            .map_err(|e| Error::lookup(format!("issuer {namespace}/{issuer_name}: {e}")))?;
        let issuer_status = issuer.and_then(|i| i.status).unwrap_or_default();
        if !issuer_status.is_ready() {
            info!(
                issuer = %issuer_name,
                message = issuer_status.ready_message().unwrap_or("no status yet"),
                "Issuer not ready"
            );
            return Ok(self.pending(format!("Issuer {issuer_name}")));
        }

        let requests: Api<CertManagerCertificate> = Api::namespaced(self.client.clone(), namespace);
        let request = requests.get_opt(request_name).await.map_err(|e| {
            Error::lookup(format!("certificate request {namespace}/{request_name}: {e}"))
        })?;
        let request_status = request.and_then(|r| r.status).unwrap_or_default();
        if !request_status.is_ready() {
            info!(
                request = %request_name,
                message = request_status.ready_message().unwrap_or("no status yet"),
                "Certificate request not ready"
            );
            return Ok(self.pending(format!("Certificate {request_name}")));
        }

        Ok(Readiness::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "certificate.println.kr/v1alpha1".into(),
            kind: "Certificate".into(),
            name: format!("cert-{uid}"),
            uid: uid.into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn issuer_spec(uid: &str) -> IssuerSpec {
        IssuerSpec {
            name: "letsencrypt-prod".into(),
            namespace: "default".into(),
            email: "admin@example.com".into(),
            server: "https://acme.test/directory".into(),
            ingress_class: "nginx".into(),
            owner: owner(uid),
        }
    }

    #[test]
    fn test_issuer_owners_are_merged_not_replaced() {
        let first = build_issuer(&issuer_spec("a"), vec![]);
        let existing = first.metadata.owner_references.clone().unwrap();
        let second = build_issuer(&issuer_spec("b"), existing);
        let owners = second.metadata.owner_references.unwrap();
        let uids: Vec<&str> = owners.iter().map(|o| o.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "b"]);
        assert!(owners.iter().all(|o| o.controller.is_none()));
    }

    #[test]
    fn test_reapplying_same_owner_does_not_duplicate() {
        let first = build_issuer(&issuer_spec("a"), vec![]);
        let again = build_issuer(&issuer_spec("a"), first.metadata.owner_references.unwrap());
        assert_eq!(again.metadata.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn test_issuer_carries_acme_solver() {
        let issuer = build_issuer(&issuer_spec("a"), vec![]);
        let json = serde_json::to_value(&issuer).unwrap();
        assert_eq!(json["spec"]["acme"]["privateKeySecretRef"]["name"], "letsencrypt-prod-account-key");
        assert_eq!(json["spec"]["acme"]["solvers"][0]["http01"]["ingress"]["class"], "nginx");
        assert_eq!(json["spec"]["acme"]["email"], "admin@example.com");
        assert_eq!(
            json["metadata"]["labels"]["app.kubernetes.io/managed-by"],
            "certificate-operator"
        );
    }

    fn shared_spec(uid: &str, email: &str, class: &str) -> IssuerSpec {
        IssuerSpec {
            email: email.into(),
            ingress_class: class.into(),
            ..issuer_spec(uid)
        }
    }

    fn live_with_owners(spec: &IssuerSpec, owners: &[&IssuerSpec]) -> Issuer {
        let mut issuer = build_issuer(spec, Vec::new());
        issuer.metadata.owner_references = Some(
            owners
                .iter()
                .fold(Vec::new(), |acc, s| merge_owner_references(acc, &s.owner)),
        );
        issuer.metadata.resource_version = Some("42".into());
        issuer
    }

    #[test]
    fn test_missing_issuer_is_created() {
        let plan = plan_issuer(&issuer_spec("a"), None);
        assert!(matches!(plan.write, IssuerWrite::Apply(_)));
        assert!(plan.conflict.is_none());
    }

    #[test]
    fn test_shared_issuer_keeps_first_writers_settings() {
        let a = shared_spec("a", "a@x.com", "nginx");
        let b = shared_spec("b", "b@y.com", "traefik");

        // b joins a's issuer: owner added, spec untouched, conflict reported
        let live = live_with_owners(&a, &[&a]);
        let plan = plan_issuer(&b, Some(&live));
        match &plan.write {
            IssuerWrite::AddOwner {
                owners,
                resource_version,
            } => {
                let uids: Vec<&str> = owners.iter().map(|o| o.uid.as_str()).collect();
                assert_eq!(uids, vec!["a", "b"]);
                assert_eq!(resource_version.as_deref(), Some("42"));
            }
            other => panic!("unexpected write: {other:?}"),
        }
        let conflict = plan.conflict.unwrap();
        assert!(conflict.contains("a@x.com"));
        assert!(conflict.contains("b@y.com"));

        // Later passes by either owner never rewrite the issuer
        let live = live_with_owners(&a, &[&a, &b]);
        let again_a = plan_issuer(&a, Some(&live));
        assert!(matches!(again_a.write, IssuerWrite::Nothing));
        assert!(again_a.conflict.is_none());
        let again_b = plan_issuer(&b, Some(&live));
        assert!(matches!(again_b.write, IssuerWrite::Nothing));
        assert!(again_b.conflict.is_some());
    }

    #[test]
    fn test_sole_owner_can_change_settings() {
        let old = shared_spec("a", "old@x.com", "nginx");
        let new = shared_spec("a", "new@x.com", "nginx");
        let live = live_with_owners(&old, &[&old]);
        let plan = plan_issuer(&new, Some(&live));
        match plan.write {
            IssuerWrite::Apply(issuer) => {
                assert_eq!(issuer.spec.acme.unwrap().email, "new@x.com");
            }
            other => panic!("unexpected write: {other:?}"),
        }
        assert!(plan.conflict.is_none());
    }

    #[test]
    fn test_matching_shared_issuer_only_gains_owner() {
        let a = issuer_spec("a");
        let b = issuer_spec("b");
        let live = live_with_owners(&a, &[&a]);
        let plan = plan_issuer(&b, Some(&live));
        assert!(matches!(plan.write, IssuerWrite::AddOwner { .. }));
        assert!(plan.conflict.is_none());
    }

    #[test]
    fn test_request_is_controlled_by_certificate() {
        let request = build_certificate_request(&CertRequestSpec {
            name: "web-cert".into(),
            namespace: "default".into(),
            domain: "example.com".into(),
            issuer_name: "letsencrypt-prod".into(),
            secret_name: "web-tls".into(),
            owner: owner("a"),
        });
        assert_eq!(request.spec.secret_name, "web-tls");
        assert_eq!(request.spec.dns_names, vec!["example.com"]);
        let owners = request.metadata.owner_references.unwrap();
        assert_eq!(owners[0].controller, Some(true));
    }

    fn tls_secret(cert: &str, key: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("web-tls".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                ("tls.crt".to_string(), ByteString(cert.as_bytes().to_vec())),
                ("tls.key".to_string(), ByteString(key.as_bytes().to_vec())),
            ])),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_populated_secret() {
        let material = parse_tls_secret(&tls_secret("CERT", "KEY")).unwrap();
        assert_eq!(material.name, "web-tls");
        assert_eq!(material.certificate, "CERT");
        assert_eq!(material.private_key.as_str(), "KEY");
    }

    #[test]
    fn test_empty_halves_mean_not_ready() {
        assert!(parse_tls_secret(&tls_secret("", "KEY")).is_none());
        assert!(parse_tls_secret(&tls_secret("CERT", "")).is_none());
        assert!(parse_tls_secret(&Secret::default()).is_none());
    }
}
