//! k8s-service-provider - REST API for Kubernetes and KubeVirt deployments
//!
//! Exposes a simplified deployment schema and translates it into Kubernetes
//! Deployments/Services or KubeVirt VirtualMachines.
//!
//! ## Listeners
//!
//! - Deployment API (`SERVER_PORT`, default 8080): CRUD on `/api/v1/deployments`
//! - Namespace API (`NAMESPACE_SERVER_PORT`, default 8081): namespace lookup
//!   by labels on `/api/v1/namespaces`
//!
//! ## Usage
//!
//! ```bash
//! # Run against the current kubeconfig
//! k8s-service-provider
//!
//! # Run inside a cluster with a config file
//! k8s-service-provider --in-cluster --config /etc/k8s-service-provider/config.yaml
//!
//! # Dump the effective configuration
//! k8s-service-provider --write-config config.yaml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod api;
mod cli;
mod config;
mod deployment;
mod k8s;
mod kubevirt;
mod models;
mod namespace;
mod server;
mod utils;

use cli::Args;
use config::{AppConfig, EnvConfig};
use k8s::K8sClient;
use server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    if let Some(path) = &args.write_config {
        config.save(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    // Flushes file logs on exit
    let _log_guard = utils::init_logger(&config.log)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        deployment_port = config.server.port,
        namespace_port = config.namespace_server.port,
        "Starting k8s-service-provider"
    );

    let client = K8sClient::new(&config.kubernetes)
        .await
        .context("Failed to initialize Kubernetes client")?;

    Server::new(config, client).run().await
}

/// Defaults, then config file, then environment, then flags
fn load_config(args: &Args) -> Result<AppConfig> {
    let config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };

    let env = EnvConfig::load();
    let config = if env.has_any() {
        config.with_env(&env)
    } else {
        config
    };

    let config = args.apply(config);
    config.validate()?;
    Ok(config)
}
