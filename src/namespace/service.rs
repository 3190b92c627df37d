//! Namespace lookup by labels

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::k8s::K8sClient;
use crate::models::NamespaceResponse;

/// Namespace operations exposed over HTTP
#[async_trait]
pub trait NamespaceOps: Send + Sync {
    /// Namespaces carrying every given label
    async fn namespaces_by_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<NamespaceResponse>;

    async fn health_check(&self) -> Result<()>;
}

/// Cluster-backed namespace service
#[derive(Clone)]
pub struct NamespaceService {
    client: K8sClient,
}

impl NamespaceService {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NamespaceOps for NamespaceService {
    async fn namespaces_by_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<NamespaceResponse> {
        info!(labels = ?labels, "Processing label selectors");

        let namespaces = self
            .client
            .namespaces_by_labels(labels)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to get namespaces from Kubernetes"))?;

        let response = NamespaceResponse::from(namespaces);
        info!(count = response.count, "Successfully returned namespaces");
        Ok(response)
    }

    async fn health_check(&self) -> Result<()> {
        debug!("Performing namespace service health check");
        self.client.health_check().await
    }
}
