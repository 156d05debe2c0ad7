//! # Certificate Status
//!
//! Observed state written by the reconciler. Every mutation goes through the
//! helpers here so that repeated identical passes leave the status untouched.

use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};

/// Certificate status
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    /// Name of the cert-manager Issuer backing this certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_ref: Option<String>,
    /// Name of the cert-manager Certificate request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_ref: Option<String>,
    #[serde(default)]
    pub cloudflare_uploaded: bool,
    #[serde(
        default,
        rename = "cloudflareCertificateID",
        skip_serializing_if = "Option::is_none"
    )]
    pub cloudflare_certificate_id: Option<String>,
    #[serde(default)]
    pub aws_uploaded: bool,
    #[serde(
        default,
        rename = "awsCertificateARN",
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_certificate_arn: Option<String>,
    /// Lower-case hex SHA-256 of the last distributed `tls.crt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_uploaded_cert_hash: Option<String>,
    /// RFC 3339 timestamp of the last distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_uploaded_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Condition type reported for overall issuance readiness
pub const READY_CONDITION: &str = "Ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
        }
    }
}

/// Status condition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl CertificateStatus {
    #[must_use]
    pub fn uploaded(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Cloudflare => self.cloudflare_uploaded,
            ProviderKind::Aws => self.aws_uploaded,
        }
    }

    /// External identifier recorded for a target, if any
    #[must_use]
    pub fn identifier(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Cloudflare => self.cloudflare_certificate_id.as_deref(),
            ProviderKind::Aws => self.aws_certificate_arn.as_deref(),
        }
        .filter(|id| !id.is_empty())
    }

    /// Record a successful upload to one target
    pub fn record_upload(&mut self, kind: ProviderKind, identifier: String) {
        match kind {
            ProviderKind::Cloudflare => {
                self.cloudflare_uploaded = true;
                self.cloudflare_certificate_id = Some(identifier);
            }
            ProviderKind::Aws => {
                self.aws_uploaded = true;
                self.aws_certificate_arn = Some(identifier);
            }
        }
        self.set_condition(
            kind.condition_type(),
            ConditionStatus::True,
            "Uploaded",
            format!("certificate uploaded to {kind}"),
        );
    }

    /// Record a failed upload. Uploaded flag and identifier stay as they were.
    pub fn record_failure(&mut self, kind: ProviderKind, reason: &str, message: String) {
        self.set_condition(kind.condition_type(), ConditionStatus::False, reason, message);
    }

    /// Upsert a condition by type. The transition time only moves when the status flips.
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: String,
    ) {
        let status = status.as_str();
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition_type)
        {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
            }
            existing.reason = Some(reason.to_string());
            existing.message = Some(message);
            return;
        }
        self.conditions.push(Condition {
            r#type: condition_type.to_string(),
            status: status.to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message),
        });
    }

    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }
}
