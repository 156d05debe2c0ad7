//! # Kubernetes client seam
//!
//! The reconciler and the cloud drivers reach the cluster through this trait so
//! that tests can drive them without an API server.

use crate::crd::{Certificate, CertificateStatus};
use crate::error::Error;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;

/// Trait for Kubernetes client operations used by the operator
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a Secret by namespace and name; `None` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Add a finalizer to a Certificate (no-op when already present)
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer from a Certificate (no-op when absent or the object is gone)
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Replace the status subresource of a Certificate
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CertificateStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeClientImpl {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeClientImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClientImpl")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeClientImpl {
    #[must_use]
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn certificates(&self, namespace: &str) -> Api<Certificate> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::lookup(format!("secret {namespace}/{name}: {e}")))
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.certificates(namespace);

        let cert = api
            .get(name)
            .await
            .map_err(|e| Error::lookup(format!("certificate {namespace}/{name}: {e}")))?;
        let mut finalizers = cert.metadata.finalizers.unwrap_or_default();

        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| Error::update(format!("add finalizer to {namespace}/{name}: {e}")))?;

        Ok(())
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.certificates(namespace);

        let Some(cert) = api
            .get_opt(name)
            .await
            .map_err(|e| Error::lookup(format!("certificate {namespace}/{name}: {e}")))?
        else {
            return Ok(());
        };

        let finalizers: Vec<String> = cert
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        match api
            .patch(
                name,
                &PatchParams::apply(&self.field_manager),
                &Patch::Merge(&patch),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::update(format!(
                "remove finalizer from {namespace}/{name}: {e}"
            ))),
        }
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CertificateStatus,
    ) -> Result<(), Error> {
        let api = self.certificates(namespace);

        let status_patch = serde_json::json!({
            "status": status
        });
        api.patch_status(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&status_patch),
        )
        .await
        .map_err(|e| Error::update(format!("status of {namespace}/{name}: {e}")))?;

        Ok(())
    }
}
