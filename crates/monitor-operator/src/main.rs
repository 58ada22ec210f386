//! Kubernetes operator for MonitorStack resources.

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{error, info};

use monitor_operator::config::OperatorConfig;
use monitor_operator::{controller, crds, metrics, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::parse();
    telemetry::init(&config.log_level);

    info!("Starting monitor operator");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let metrics_addr = config.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(metrics_addr.clone()).await {
            error!("Metrics server on {metrics_addr} stopped: {e}");
        }
    });

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    if config.install_crd {
        crds::install_crd(client.clone())
            .await
            .context("failed to install MonitorStack CRD")?;
    }

    controller::run(client, &config).await;

    Ok(())
}
