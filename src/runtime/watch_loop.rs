//! # Watch Loop
//!
//! Controller watch loop that monitors Certificate resources, the cert-manager
//! objects they own, and the TLS secrets cert-manager writes for them.

use crate::constants::TLS_SECRET_SUFFIX;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::cert_manager::{CertManagerCertificate, Issuer};
use crate::crd::Certificate;
use crate::runtime::error_policy::{handle_controller_error, handle_reconciliation_error};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Map a key-material Secret back to the Certificate that owns its slot
///
/// cert-manager writes `{name}-tls` next to the Certificate, so stripping the
/// suffix gives the owner key. Secrets without the suffix map to nothing.
#[must_use]
pub fn map_tls_secret_to_certificate(secret: Secret) -> Option<ObjectRef<Certificate>> {
    let name = secret.name_any();
    let owner = name.strip_suffix(TLS_SECRET_SUFFIX)?;
    if owner.is_empty() {
        return None;
    }
    let namespace = secret.namespace()?;
    Some(ObjectRef::new(owner).within(&namespace))
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Run the controller watch loop
///
/// Restarts the controller after the configured delay whenever its stream
/// ends, until a shutdown signal marks the server as not ready.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let restart_delay = reconciler.config.watch_restart_delay();

    let shutdown_state = server_state.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!("Starting controller watch loop...");
        let certificates: Api<Certificate> = Api::all(client.clone());
        let issuers: Api<Issuer> = Api::all(client.clone());
        let requests: Api<CertManagerCertificate> = Api::all(client.clone());
        let secrets: Api<Secret> = Api::all(client.clone());

        Controller::new(certificates, watcher::Config::default().any_semantic())
            .owns(issuers, watcher::Config::default())
            .owns(requests, watcher::Config::default())
            .watches(secrets, watcher::Config::default(), map_tls_secret_to_certificate)
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, reconciler.clone())
            .filter_map(|result| async move {
                match result {
                    Ok((object, _)) => {
                        debug!(resource = %object, "watch.event.success");
                        Some(())
                    }
                    Err(e) => handle_controller_error(&e, restart_delay)
                        .await
                        .then_some(()),
                }
            })
            .for_each(|()| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
