//! HTTP servers
//!
//! Runs the deployment and namespace listeners side by side and stops both
//! on SIGINT or SIGTERM.

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api;
use crate::config::AppConfig;
use crate::deployment::DeploymentService;
use crate::k8s::K8sClient;
use crate::namespace::NamespaceService;

/// Both HTTP listeners and the client they share
pub struct Server {
    config: AppConfig,
    client: K8sClient,
}

impl Server {
    pub fn new(config: AppConfig, client: K8sClient) -> Self {
        Self { config, client }
    }

    fn deployment_router(&self) -> Router {
        let service = Arc::new(DeploymentService::new(self.client.clone()));
        api::with_common_layers(api::deployment_router(service), &self.config.server)
    }

    fn namespace_router(&self) -> Router {
        let service = Arc::new(NamespaceService::new(self.client.clone()));
        api::with_common_layers(api::namespace_router(service), &self.config.server)
    }

    /// Serve until a shutdown signal arrives or a listener fails
    pub async fn run(self) -> Result<()> {
        let deployment_listener = bind(self.config.deployment_addr()).await?;
        let namespace_listener = bind(self.config.namespace_addr()).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            // Receivers are gone when the servers already stopped
            let _ = shutdown_tx.send(true);
        });

        tokio::try_join!(
            serve(
                "deployment",
                deployment_listener,
                self.deployment_router(),
                shutdown_rx.clone(),
            ),
            serve(
                "namespace",
                namespace_listener,
                self.namespace_router(),
                shutdown_rx,
            ),
        )?;

        info!("All servers stopped");
        Ok(())
    }
}

async fn bind((host, port): (&str, u16)) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind to {host}:{port}"))
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(server = name, %addr, "Starting HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!(server = name, "Shutting down HTTP server");
        })
        .await
        .with_context(|| format!("{name} server failed"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received SIGINT"),
        _ = terminate => warn!("Received SIGTERM"),
    }
}
