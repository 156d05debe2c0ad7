//! # cert-manager types
//!
//! Minimal typed views of cert-manager's `Issuer` and `Certificate` (cert-manager.io/v1).
//! Only the fields the operator writes or reads back are modelled; server-side
//! apply leaves everything else to cert-manager.

use serde::{Deserialize, Serialize};

/// cert-manager `Issuer` with an ACME configuration
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Issuer",
    group = "cert-manager.io",
    version = "v1",
    namespaced,
    status = "IssuanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acme: Option<AcmeIssuer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcmeIssuer {
    pub email: String,
    pub server: String,
    pub private_key_secret_ref: SecretKeySelector,
    #[serde(default)]
    pub solvers: Vec<AcmeSolver>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SecretKeySelector {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct AcmeSolver {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http01: Option<Http01Solver>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct Http01Solver {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Http01Ingress>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct Http01Ingress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

/// cert-manager `Certificate`, named `CertManagerCertificate` here to keep it apart
/// from the operator's own resource
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Certificate",
    root = "CertManagerCertificate",
    group = "cert-manager.io",
    version = "v1",
    namespaced,
    status = "IssuanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CertManagerCertificateSpec {
    pub secret_name: String,
    pub dns_names: Vec<String>,
    pub issuer_ref: IssuerReference,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct IssuerReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Status shared by cert-manager issuers and certificates
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceStatus {
    #[serde(default)]
    pub conditions: Vec<IssuanceCondition>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceCondition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl IssuanceStatus {
    /// `Ready=True` present in the condition set
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.r#type == "Ready" && c.status == "True")
    }

    /// Message of the `Ready` condition, for logging while pending
    #[must_use]
    pub fn ready_message(&self) -> Option<&str> {
        self.conditions
            .iter()
            .find(|c| c.r#type == "Ready")
            .and_then(|c| c.message.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_requires_true_ready_condition() {
        let mut status = IssuanceStatus::default();
        assert!(!status.is_ready());
        status.conditions.push(IssuanceCondition {
            r#type: "Ready".into(),
            status: "False".into(),
            message: Some("Issuing certificate".into()),
            ..Default::default()
        });
        assert!(!status.is_ready());
        assert_eq!(status.ready_message(), Some("Issuing certificate"));
        status.conditions[0].status = "True".into();
        assert!(status.is_ready());
    }

    #[test]
    fn test_request_serializes_like_cert_manager() {
        let cert = CertManagerCertificate::new(
            "web-cert",
            CertManagerCertificateSpec {
                secret_name: "web-tls".into(),
                dns_names: vec!["example.com".into()],
                issuer_ref: IssuerReference {
                    name: "letsencrypt-prod".into(),
                    kind: Some("Issuer".into()),
                    group: Some("cert-manager.io".into()),
                },
            },
        );
        let json = serde_json::to_value(&cert).unwrap();
        assert_eq!(json["apiVersion"], "cert-manager.io/v1");
        assert_eq!(json["kind"], "Certificate");
        assert_eq!(json["spec"]["secretName"], "web-tls");
        assert_eq!(json["spec"]["dnsNames"][0], "example.com");
        assert_eq!(json["spec"]["issuerRef"]["kind"], "Issuer");
    }

    #[test]
    fn test_renamed_root_keeps_cert_manager_identity() {
        use kube::{CustomResourceExt, Resource};

        assert_eq!(CertManagerCertificate::kind(&()), "Certificate");
        assert_eq!(CertManagerCertificate::group(&()), "cert-manager.io");
        assert_eq!(
            CertManagerCertificate::crd_name(),
            "certificates.cert-manager.io"
        );
        assert_eq!(Issuer::api_version(&()), "cert-manager.io/v1");
    }
}
