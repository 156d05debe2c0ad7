//! # CRUD API
//!
//! HTTP façade over Certificate resources.
//!
//! Routes:
//! - `GET /health`
//! - `POST /api/v1/certificates`
//! - `GET /api/v1/certificates`
//! - `GET /api/v1/namespaces/{namespace}/certificates`
//! - `GET|PUT|DELETE /api/v1/namespaces/{namespace}/certificates/{name}`
//!
//! The server runs on port 8080 by default (configurable via `API_PORT`,
//! disabled with `API_ENABLED=false`).

pub mod error;
pub mod handler;
pub mod store;

pub use error::{ApiError, ErrorResponse};
pub use handler::{CertificateResponse, CreateCertificateRequest, UpdateCertificateRequest};
pub use store::{CertificateStore, KubeCertificateStore};

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn CertificateStore>,
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState").finish_non_exhaustive()
    }
}

pub fn router(store: Arc<dyn CertificateStore>) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route(
            "/api/v1/certificates",
            get(handler::list_certificates).post(handler::create_certificate),
        )
        .route(
            "/api/v1/namespaces/{namespace}/certificates",
            get(handler::list_certificates_in_namespace),
        )
        .route(
            "/api/v1/namespaces/{namespace}/certificates/{name}",
            get(handler::get_certificate)
                .put(handler::update_certificate)
                .delete(handler::delete_certificate),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(ApiState { store })
}

pub async fn start_api_server(
    port: u16,
    store: Arc<dyn CertificateStore>,
) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("API server listening on {}", addr);
    axum::serve(listener, router(store)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Certificate, CertificateSpec, CertificateStatus};
    use async_trait::async_trait;
    use kube::ResourceExt;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        items: Mutex<BTreeMap<(String, String), Certificate>>,
    }

    fn key(certificate: &Certificate) -> (String, String) {
        (
            certificate.namespace().unwrap_or_default(),
            certificate.name_any(),
        )
    }

    #[async_trait]
    impl CertificateStore for MemoryStore {
        async fn list(&self, namespace: Option<&str>) -> Result<Vec<Certificate>, ApiError> {
            let items = self.items.lock().unwrap();
            Ok(items
                .iter()
                .filter(|((ns, _), _)| namespace.map_or(true, |wanted| ns.as_str() == wanted))
                .map(|(_, c)| c.clone())
                .collect())
        }

        async fn get(&self, namespace: &str, name: &str) -> Result<Option<Certificate>, ApiError> {
            let items = self.items.lock().unwrap();
            Ok(items
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        }

        async fn create(&self, certificate: &Certificate) -> Result<Certificate, ApiError> {
            let mut items = self.items.lock().unwrap();
            let k = key(certificate);
            if items.contains_key(&k) {
                return Err(ApiError::Internal(format!(
                    "certificates \"{}\" already exists",
                    k.1
                )));
            }
            items.insert(k, certificate.clone());
            Ok(certificate.clone())
        }

        async fn replace(&self, certificate: &Certificate) -> Result<Certificate, ApiError> {
            let mut items = self.items.lock().unwrap();
            let stored = items
                .get_mut(&key(certificate))
                .ok_or_else(|| ApiError::Internal("gone".to_string()))?;
            // Status subresource: a replace only carries the spec
            stored.spec = certificate.spec.clone();
            Ok(stored.clone())
        }

        async fn delete(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
            self.items
                .lock()
                .unwrap()
                .remove(&(namespace.to_string(), name.to_string()));
            Ok(())
        }
    }

    async fn serve(store: Arc<MemoryStore>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(store)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn stored(namespace: &str, name: &str, status: Option<CertificateStatus>) -> Certificate {
        let mut certificate = Certificate::new(
            name,
            CertificateSpec {
                domain: format!("{name}.example.com"),
                email: "ops@example.com".to_string(),
                ..Default::default()
            },
        );
        certificate.metadata.namespace = Some(namespace.to_string());
        certificate.status = status;
        certificate
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = Arc::new(MemoryStore::default());
        let base = serve(store.clone()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/v1/certificates"))
            .json(&json!({
                "name": "web",
                "namespace": "prod",
                "domain": "example.com",
                "email": "ops@example.com",
                "awsSecretRef": "aws-credentials"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
        let created: CertificateResponse = resp.json().await.unwrap();
        assert_eq!(created.name, "web");
        assert_eq!(created.spec.aws_secret_ref.as_deref(), Some("aws-credentials"));

        let resp = client
            .get(format!("{base}/api/v1/namespaces/prod/certificates/web"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let fetched: CertificateResponse = resp.json().await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_rejects_incomplete_body() {
        let base = serve(Arc::new(MemoryStore::default())).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/v1/certificates"))
            .json(&json!({ "name": "web", "namespace": "prod", "domain": "example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert!(!body.error.is_empty());

        let resp = client
            .post(format!("{base}/api/v1/certificates"))
            .json(&json!({ "name": "", "namespace": "prod", "domain": "example.com", "email": "a@b.c" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_list_all_and_by_namespace() {
        let store = Arc::new(MemoryStore::default());
        for (ns, name) in [("prod", "web"), ("prod", "api"), ("staging", "web")] {
            store.create(&stored(ns, name, None)).await.unwrap();
        }
        let base = serve(store).await;
        let client = reqwest::Client::new();

        let all: Vec<CertificateResponse> = client
            .get(format!("{base}/api/v1/certificates"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let prod: Vec<CertificateResponse> = client
            .get(format!("{base}/api/v1/namespaces/prod/certificates"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(prod.len(), 2);
        assert!(prod.iter().all(|c| c.namespace == "prod"));
    }

    #[tokio::test]
    async fn test_update_merges_spec_and_keeps_status() {
        let store = Arc::new(MemoryStore::default());
        let status = CertificateStatus {
            aws_uploaded: true,
            aws_certificate_arn: Some("arn:aws:acm:eu-west-1:1:certificate/x".to_string()),
            ..Default::default()
        };
        store
            .create(&stored("prod", "web", Some(status.clone())))
            .await
            .unwrap();
        let base = serve(store.clone()).await;

        let resp = reqwest::Client::new()
            .put(format!("{base}/api/v1/namespaces/prod/certificates/web"))
            .json(&json!({ "cloudflareEnabled": false, "issuerName": "staging" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let updated: CertificateResponse = resp.json().await.unwrap();
        assert_eq!(updated.spec.domain, "web.example.com");
        assert_eq!(updated.spec.cloudflare_enabled, Some(false));
        assert_eq!(updated.spec.issuer_name.as_deref(), Some("staging"));
        assert_eq!(updated.status, status);
    }

    #[tokio::test]
    async fn test_missing_certificate_is_404() {
        let base = serve(Arc::new(MemoryStore::default())).await;
        let client = reqwest::Client::new();
        let url = format!("{base}/api/v1/namespaces/prod/certificates/ghost");

        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error, "certificate prod/ghost not found");

        let resp = client.put(&url).json(&json!({})).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);

        let resp = client.delete(&url).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_delete_returns_no_content() {
        let store = Arc::new(MemoryStore::default());
        store.create(&stored("prod", "web", None)).await.unwrap();
        let base = serve(store.clone()).await;

        let resp = reqwest::Client::new()
            .delete(format!("{base}/api/v1/namespaces/prod/certificates/web"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);
        assert!(store.get("prod", "web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_500() {
        let store = Arc::new(MemoryStore::default());
        store.create(&stored("prod", "web", None)).await.unwrap();
        let base = serve(store).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/v1/certificates"))
            .json(&json!({
                "name": "web",
                "namespace": "prod",
                "domain": "example.com",
                "email": "ops@example.com"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_health() {
        let base = serve(Arc::new(MemoryStore::default())).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({ "status": "healthy" }));
    }
}
