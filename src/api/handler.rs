//! # Certificate Handlers
//!
//! Request and response bodies plus the axum handlers for Certificate CRUD.
//! Handlers only touch `spec`; `status` is read back but never written.

use crate::api::error::ApiError;
use crate::api::ApiState;
use crate::crd::{Certificate, CertificateSpec, CertificateStatus};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body of `POST /api/v1/certificates`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateRequest {
    pub name: String,
    pub namespace: String,
    #[serde(flatten)]
    pub spec: CertificateSpec,
}

impl CreateCertificateRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let missing: Vec<&str> = [
            ("name", self.name.as_str()),
            ("namespace", self.namespace.as_str()),
            ("domain", self.spec.domain.as_str()),
            ("email", self.spec.email.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ApiError::BadRequest(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }

    fn into_certificate(self) -> Certificate {
        let mut certificate = Certificate::new(&self.name, self.spec);
        certificate.metadata.namespace = Some(self.namespace);
        certificate
    }
}

/// Body of `PUT /api/v1/namespaces/{namespace}/certificates/{name}`
///
/// Only provided fields change. Empty strings count as not provided.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCertificateRequest {
    pub domain: Option<String>,
    pub email: Option<String>,
    pub issuer_name: Option<String>,
    pub ingress_class_name: Option<String>,
    pub cloudflare_secret_ref: Option<String>,
    #[serde(rename = "cloudflareZoneID")]
    pub cloudflare_zone_id: Option<String>,
    pub cloudflare_enabled: Option<bool>,
    pub aws_secret_ref: Option<String>,
    pub aws_region: Option<String>,
    pub aws_enabled: Option<bool>,
}

fn provided(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl UpdateCertificateRequest {
    /// Merge the provided fields into `spec`
    pub fn apply_to(self, spec: &mut CertificateSpec) {
        if let Some(domain) = provided(self.domain) {
            spec.domain = domain;
        }
        if let Some(email) = provided(self.email) {
            spec.email = email;
        }
        if let Some(v) = provided(self.issuer_name) {
            spec.issuer_name = Some(v);
        }
        if let Some(v) = provided(self.ingress_class_name) {
            spec.ingress_class_name = Some(v);
        }
        if let Some(v) = provided(self.cloudflare_secret_ref) {
            spec.cloudflare_secret_ref = Some(v);
        }
        if let Some(v) = provided(self.cloudflare_zone_id) {
            spec.cloudflare_zone_id = Some(v);
        }
        if let Some(v) = self.cloudflare_enabled {
            spec.cloudflare_enabled = Some(v);
        }
        if let Some(v) = provided(self.aws_secret_ref) {
            spec.aws_secret_ref = Some(v);
        }
        if let Some(v) = provided(self.aws_region) {
            spec.aws_region = Some(v);
        }
        if let Some(v) = self.aws_enabled {
            spec.aws_enabled = Some(v);
        }
    }
}

/// Certificate as returned by every read and write endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CertificateResponse {
    pub name: String,
    pub namespace: String,
    pub spec: CertificateSpec,
    pub status: CertificateStatus,
}

impl From<Certificate> for CertificateResponse {
    fn from(certificate: Certificate) -> Self {
        Self {
            name: certificate.name_any(),
            namespace: certificate.namespace().unwrap_or_default(),
            status: certificate.status.unwrap_or_default(),
            spec: certificate.spec,
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

pub async fn create_certificate(
    State(state): State<ApiState>,
    body: Result<Json<CreateCertificateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CertificateResponse>), ApiError> {
    let Json(request) = body?;
    request.validate()?;

    let created = state.store.create(&request.into_certificate()).await?;
    info!(
        name = %created.name_any(),
        namespace = ?created.namespace(),
        "Certificate created via API"
    );
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn list_certificates(
    State(state): State<ApiState>,
) -> Result<Json<Vec<CertificateResponse>>, ApiError> {
    let items = state.store.list(None).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

pub async fn list_certificates_in_namespace(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
) -> Result<Json<Vec<CertificateResponse>>, ApiError> {
    let items = state.store.list(Some(&namespace)).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

pub async fn get_certificate(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<CertificateResponse>, ApiError> {
    let certificate = state
        .store
        .get(&namespace, &name)
        .await?
        .ok_or_else(|| ApiError::not_found(&namespace, &name))?;
    Ok(Json(certificate.into()))
}

pub async fn update_certificate(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    body: Result<Json<UpdateCertificateRequest>, JsonRejection>,
) -> Result<Json<CertificateResponse>, ApiError> {
    let Json(request) = body?;

    let mut certificate = state
        .store
        .get(&namespace, &name)
        .await?
        .ok_or_else(|| ApiError::not_found(&namespace, &name))?;
    request.apply_to(&mut certificate.spec);

    let updated = state.store.replace(&certificate).await?;
    info!(%name, %namespace, "Certificate updated via API");
    Ok(Json(updated.into()))
}

pub async fn delete_certificate(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if state.store.get(&namespace, &name).await?.is_none() {
        return Err(ApiError::not_found(&namespace, &name));
    }
    state.store.delete(&namespace, &name).await?;
    info!(%name, %namespace, "Certificate deleted via API");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_only_changes_provided_fields() {
        let mut spec = CertificateSpec {
            domain: "example.com".to_string(),
            email: "ops@example.com".to_string(),
            aws_secret_ref: Some("aws-credentials".to_string()),
            ..Default::default()
        };
        let request: UpdateCertificateRequest = serde_json::from_value(serde_json::json!({
            "domain": "",
            "cloudflareZoneID": "zone-1",
            "awsEnabled": false
        }))
        .unwrap();

        request.apply_to(&mut spec);

        assert_eq!(spec.domain, "example.com");
        assert_eq!(spec.cloudflare_zone_id.as_deref(), Some("zone-1"));
        assert_eq!(spec.aws_enabled, Some(false));
        assert_eq!(spec.aws_secret_ref.as_deref(), Some("aws-credentials"));
    }

    #[test]
    fn test_create_request_reads_flat_body() {
        let request: CreateCertificateRequest = serde_json::from_value(serde_json::json!({
            "name": "web",
            "namespace": "prod",
            "domain": "example.com",
            "email": "ops@example.com",
            "cloudflareSecretRef": "cf"
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let certificate = request.into_certificate();
        assert_eq!(certificate.name_any(), "web");
        assert_eq!(certificate.namespace().as_deref(), Some("prod"));
        assert_eq!(certificate.spec.cloudflare_secret_ref.as_deref(), Some("cf"));
    }

    #[test]
    fn test_create_request_reports_missing_fields() {
        let request = CreateCertificateRequest {
            name: "web".to_string(),
            ..Default::default()
        };
        let err = request.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required field(s): namespace, domain, email"
        );
    }
}
