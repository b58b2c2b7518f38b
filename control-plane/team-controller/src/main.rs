use clap::Parser;
use envconfig::Envconfig;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use team_controller::config::{ControllerArgs, ControllerConfig};
use team_controller::{init_tracing, runtime, signals};
use tracing::{debug, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        debug!(?e, "CryptoProvider already installed; proceeding");
    }

    let args = ControllerArgs::parse();
    let cfg = ControllerConfig::init_from_env()?;
    info!(kubeconfig = %args.kubeconfig, "starting team controller");

    let client = Client::try_from(load_config(&args.kubeconfig).await?)?;
    let token = signals::shutdown_token();
    runtime::run_all(client, cfg, token).await
}

/// An explicit kubeconfig path wins. Otherwise use in-cluster credentials,
/// falling back to the usual kubeconfig discovery outside a cluster.
async fn load_config(path: &str) -> anyhow::Result<Config> {
    if !path.is_empty() {
        let kubeconfig = Kubeconfig::read_from(path)?;
        let options = KubeConfigOptions::default();
        return Ok(Config::from_custom_kubeconfig(kubeconfig, &options).await?);
    }
    match Config::incluster() {
        Ok(cfg) => Ok(cfg),
        Err(e) => {
            debug!(error = %e, "not running in a cluster; inferring config");
            Ok(Config::infer().await?)
        }
    }
}
