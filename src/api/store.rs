//! # Certificate Store
//!
//! Storage seam behind the CRUD handlers. The Kubernetes implementation goes
//! through `Api<Certificate>`; tests substitute an in-memory store.

use crate::api::error::ApiError;
use crate::crd::Certificate;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};

#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// List in one namespace, or across all namespaces when `None`
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<Certificate>, ApiError>;

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Certificate>, ApiError>;

    async fn create(&self, certificate: &Certificate) -> Result<Certificate, ApiError>;

    /// Replace the spec of an existing object; status is left to the operator
    async fn replace(&self, certificate: &Certificate) -> Result<Certificate, ApiError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ApiError>;
}

/// `CertificateStore` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCertificateStore {
    client: Client,
}

impl std::fmt::Debug for KubeCertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCertificateStore").finish_non_exhaustive()
    }
}

impl KubeCertificateStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced(&self, namespace: &str) -> Api<Certificate> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl CertificateStore for KubeCertificateStore {
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<Certificate>, ApiError> {
        let api: Api<Certificate> = match namespace {
            Some(ns) => self.namespaced(ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Certificate>, ApiError> {
        Ok(self.namespaced(namespace).get_opt(name).await?)
    }

    async fn create(&self, certificate: &Certificate) -> Result<Certificate, ApiError> {
        let namespace = certificate
            .namespace()
            .ok_or_else(|| ApiError::BadRequest("namespace is required".to_string()))?;
        Ok(self
            .namespaced(&namespace)
            .create(&PostParams::default(), certificate)
            .await?)
    }

    async fn replace(&self, certificate: &Certificate) -> Result<Certificate, ApiError> {
        let namespace = certificate
            .namespace()
            .ok_or_else(|| ApiError::BadRequest("namespace is required".to_string()))?;
        Ok(self
            .namespaced(&namespace)
            .replace(&certificate.name_any(), &PostParams::default(), certificate)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.namespaced(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
