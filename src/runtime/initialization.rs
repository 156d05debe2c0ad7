//! # Initialization
//!
//! Operator start-up: rustls setup, tracing, metrics, probe server, Kubernetes
//! client, and construction of the drivers, the manager and the reconciler.

use crate::config::ControllerConfig;
use crate::controller::manager::CertificateManager;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::Certificate;
use crate::issuance::CertManagerIssuer;
use crate::kube_client::{KubeClient, KubeClientImpl};
use crate::observability;
use crate::provider::{AwsAcmProvider, CloudProvider, CloudflareProvider};
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SERVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything the watch loop and the API server need
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` controls filtering (default `certificate_operator=info`);
/// `log_format` selects `json` (default) or `text` output.
pub fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "certificate_operator=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if log_format.eq_ignore_ascii_case("text") {
        builder.try_init()
    } else {
        builder.json().try_init()
    };
    if let Err(e) = result {
        warn!("Tracing subscriber already initialized: {}", e);
    }
}

/// Initialize the operator runtime
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    init_tracing(&config.log_format);

    info!("Starting certificate operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = server_state.clone();
    let metrics_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(metrics_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let kube: Arc<dyn KubeClient> = Arc::new(KubeClientImpl::new(
        client.clone(),
        config.field_manager.clone(),
    ));
    let issuer = Arc::new(CertManagerIssuer::new(
        client.clone(),
        config.field_manager.clone(),
        config.not_ready_requeue(),
    ));
    let providers: Vec<Arc<dyn CloudProvider>> = vec![
        Arc::new(
            AwsAcmProvider::new(kube.clone(), config.provider_timeout())
                .with_endpoint_url(config.acm_endpoint_url.clone()),
        ),
        Arc::new(
            CloudflareProvider::new(
                kube.clone(),
                config.cloudflare_api_base_url.clone(),
                config.provider_timeout(),
            )
            .context("Failed to build Cloudflare HTTP client")?,
        ),
    ];
    let manager = Arc::new(CertificateManager::new(issuer, providers, config.clone()));
    let reconciler = Arc::new(Reconciler::new(kube, manager, config.clone()));

    let certificates: Api<Certificate> = Api::all(client.clone());
    log_existing_resources(&certificates).await?;

    info!("Operator initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        config,
    })
}

/// Wait for the probe server to bind
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > SERVER_STARTUP_TIMEOUT {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                SERVER_STARTUP_TIMEOUT.as_secs()
            ));
        }
        tokio::time::sleep(SERVER_POLL_INTERVAL).await;
    }
}

/// Check the CRD is queryable and log a per-namespace summary
///
/// The controller's initial list reconciles every existing Certificate, so
/// nothing is reconciled here.
async fn log_existing_resources(certificates: &Api<Certificate>) -> Result<()> {
    let list = certificates
        .list(&ListParams::default())
        .await
        .context("Certificate CRD is not queryable; is it installed?")?;

    if list.items.is_empty() {
        info!("No existing Certificate resources found, watch will pick up new resources");
        return Ok(());
    }

    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in &list.items {
        by_namespace
            .entry(item.namespace().unwrap_or_else(|| "default".to_string()))
            .or_default()
            .push(item.name_any());
    }

    info!("Certificate operator - Startup Resource Summary");
    info!("Total Resources: {}", list.items.len());
    info!("Namespaces: {}", by_namespace.len());
    for (namespace, names) in &mut by_namespace {
        names.sort();
        info!("Namespace: {}", namespace);
        info!("  Resources ({}): {}", names.len(), summarize(names));
    }
    Ok(())
}

fn summarize(names: &[String]) -> String {
    if names.len() <= 3 {
        names.join(", ")
    } else {
        format!("{}, ... ({} total)", names[..3].join(", "), names.len())
    }
}
