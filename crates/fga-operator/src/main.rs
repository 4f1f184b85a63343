//! FGA Operator - reconciles authorization model requests against OpenFGA
//! and binds the resulting store/model ids into labelled deployments.

use clap::Parser;
use kube::{Client, CustomResourceExt};

use fga_common::crd::{AuthorizationModel, AuthorizationModelRequest, Store};
use fga_common::telemetry::{init_telemetry, TelemetryConfig};

mod controller_runner;
mod crds;

/// FGA operator - OpenFGA store and authorization model lifecycle management
#[derive(Parser, Debug)]
#[command(name = "fga-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        // Print all CRDs as a multi-document YAML stream
        for crd in [
            AuthorizationModelRequest::crd(),
            AuthorizationModel::crd(),
            Store::crd(),
        ] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {e}"))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    // Fail fast on missing engine credentials
    let openfga_config = fga_openfga::Config::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    let reconciliation_interval = fga_common::config::reconciliation_interval();

    let client = Client::try_default().await?;

    crds::ensure_crds_installed(&client).await?;

    controller_runner::run_controllers(client, openfga_config, reconciliation_interval).await;

    tracing::info!("Shutting down");
    Ok(())
}
