//! Kubernetes client wrapper
//!
//! Provides a high-level interface to the Kubernetes API.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, ListParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::config::KubernetesConfig;
use crate::models::{is_kube_conflict, is_kube_not_found, labels, NamespaceInfo};

/// Kubernetes client wrapper
///
/// Cheap to clone; both HTTP listeners share one instance.
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a client from configuration
    pub async fn new(config: &KubernetesConfig) -> Result<Self> {
        let kube_config = if config.in_cluster {
            info!("Using in-cluster Kubernetes configuration");
            Config::incluster().context("Failed to load in-cluster configuration")?
        } else {
            let path = config.kubeconfig_path()?;
            info!(path = %path.display(), "Using kubeconfig file");
            let kubeconfig = Kubeconfig::read_from(&path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to build Kubernetes config from kubeconfig")?
        };

        let client = Self::with_config(kube_config)?;
        info!("Successfully initialized Kubernetes client");
        Ok(client)
    }

    /// Create client with custom config
    pub fn with_config(config: Config) -> Result<Self> {
        let client =
            Client::try_from(config).context("Failed to create Kubernetes client from config")?;
        Ok(Self { client })
    }

    #[cfg(test)]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Typed API for a namespaced resource, or all namespaces when `namespace` is `None`
    pub fn namespaced_or_all<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Verify that the API server is reachable
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing Kubernetes health check");

        match self.client.apiserver_version().await {
            Ok(version) => {
                debug!(version = %version.git_version, "Kubernetes health check successful");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Kubernetes health check failed");
                Err(e).context("kubernetes health check failed")
            }
        }
    }

    /// List namespaces matching every given label
    pub async fn namespaces_by_labels(
        &self,
        selectors: &BTreeMap<String, String>,
    ) -> Result<Vec<NamespaceInfo>> {
        let selector = labels::selector_from_map(selectors);
        info!(selector = %selector, "Fetching namespaces by labels");

        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default().labels(&selector))
            .await
            .context("failed to list namespaces")?;

        let infos: Vec<_> = list
            .items
            .into_iter()
            .filter_map(|ns| {
                let name = ns.metadata.name?;
                Some(NamespaceInfo {
                    name,
                    labels: ns.metadata.labels.unwrap_or_default(),
                })
            })
            .collect();

        info!(count = infos.len(), "Successfully retrieved namespaces");
        Ok(infos)
    }

    /// Create the namespace unless it already exists
    pub async fn ensure_namespace(&self, name: &str) -> Result<(), kube::Error> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());

        match namespaces.get(name).await {
            Ok(_) => return Ok(()),
            Err(e) if is_kube_not_found(&e) => {}
            Err(e) => return Err(e),
        }

        let namespace = Namespace {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match namespaces.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                info!(namespace = name, "Created namespace");
                Ok(())
            }
            // Lost a race with a concurrent request
            Err(e) if is_kube_conflict(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
