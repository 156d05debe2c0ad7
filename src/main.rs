//! # Certificate Operator
//!
//! Kubernetes operator that keeps `Certificate` resources in sync with
//! cert-manager issuance and distributes the issued key material to AWS ACM
//! and Cloudflare.
//!
//! ## Configuration
//!
//! Settings come from environment variables (see [`ControllerConfig::from_env`]);
//! the ports can also be overridden on the command line.

use anyhow::{Context, Result};
use certificate_operator::api::{start_api_server, KubeCertificateStore};
use certificate_operator::config::ControllerConfig;
use certificate_operator::runtime::{initialization, watch_loop};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

/// Certificate lifecycle operator
#[derive(Debug, Parser)]
#[command(name = "certificate-operator", version, about, long_about = None)]
struct Args {
    /// Port for /metrics, /healthz and /readyz (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Port for the CRUD API (overrides API_PORT)
    #[arg(long)]
    api_port: Option<u16>,

    /// Do not start the CRUD API
    #[arg(long)]
    disable_api: bool,
}

impl Args {
    fn apply(&self, config: &mut ControllerConfig) {
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        if self.disable_api {
            config.api_enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = ControllerConfig::from_env();
    args.apply(&mut config);

    let init = initialization::initialize(config)
        .await
        .context("Failed to initialize operator")?;

    if init.config.api_enabled {
        let store = Arc::new(KubeCertificateStore::new(init.client.clone()));
        let api_port = init.config.api_port;
        tokio::spawn(async move {
            if let Err(e) = start_api_server(api_port, store).await {
                error!("API server error: {}", e);
            }
        });
    } else {
        info!("CRUD API disabled");
    }

    watch_loop::run_watch_loop(init.client, init.reconciler, init.server_state)
        .await
        .context("Watch loop failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_ports() {
        let args = Args::parse_from([
            "certificate-operator",
            "--metrics-port",
            "9100",
            "--disable-api",
        ]);
        let mut config = ControllerConfig::default();
        args.apply(&mut config);

        assert_eq!(config.metrics_port, 9100);
        assert_eq!(config.api_port, 8080);
        assert!(!config.api_enabled);
    }
}
