//! Kind dispatch across container and VM deployments
//!
//! Deployment IDs are unique across both kinds and all namespaces; every
//! lookup searches everywhere and refuses to act on ambiguous matches.

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use tracing::{error, info, warn};

use super::{ContainerService, VmService};
use crate::k8s::K8sClient;
use crate::models::{
    DeploymentError, DeploymentKind, DeploymentRequest, DeploymentResponse, DeploymentSpec,
    ListDeploymentsQuery, ListDeploymentsResponse,
};

/// Deployment operations exposed over HTTP
#[async_trait]
pub trait DeploymentOps: Send + Sync {
    /// Create a deployment under a fresh ID
    async fn create(
        &self,
        request: &DeploymentRequest,
        id: &str,
    ) -> Result<DeploymentResponse, DeploymentError>;

    /// Find the single deployment carrying an ID
    async fn get_by_id(&self, id: &str) -> Result<DeploymentResponse, DeploymentError>;

    /// Replace a deployment, keeping its ID
    async fn update(
        &self,
        request: &DeploymentRequest,
        id: &str,
    ) -> Result<DeploymentResponse, DeploymentError>;

    async fn delete(&self, id: &str) -> Result<(), DeploymentError>;

    async fn list(
        &self,
        query: &ListDeploymentsQuery,
    ) -> Result<ListDeploymentsResponse, DeploymentError>;
}

/// Cluster-backed deployment service
#[derive(Clone)]
pub struct DeploymentService {
    containers: ContainerService,
    vms: VmService,
}

impl DeploymentService {
    pub fn new(client: K8sClient) -> Self {
        Self {
            containers: ContainerService::new(client.clone()),
            vms: VmService::new(client),
        }
    }

    async fn create_workload(
        &self,
        id: &str,
        request: &DeploymentRequest,
        spec: &DeploymentSpec,
    ) -> Result<(), DeploymentError> {
        match spec {
            DeploymentSpec::Container(s) => {
                self.containers
                    .create(id, &request.metadata, &s.container)
                    .await
            }
            DeploymentSpec::Vm(s) => self.vms.create(id, &request.metadata, &s.vm).await,
        }
    }

    async fn delete_workload(
        &self,
        id: &str,
        kind: DeploymentKind,
        namespace: &str,
    ) -> Result<(), DeploymentError> {
        match kind {
            DeploymentKind::Container => self.containers.delete(id, namespace).await,
            DeploymentKind::Vm => self.vms.delete(id, namespace).await,
        }
    }
}

/// Parse and validate a request, filling in defaults
fn prepare(request: &DeploymentRequest) -> Result<(DeploymentRequest, DeploymentSpec), DeploymentError> {
    let mut request = request.clone();
    request.apply_defaults();
    request.validate_metadata()?;
    let spec = request.parse_spec()?;
    Ok((request, spec))
}

/// Reduce the matches of an ID lookup to a single deployment
pub fn resolve_single(
    id: &str,
    mut matches: Vec<DeploymentResponse>,
) -> Result<DeploymentResponse, DeploymentError> {
    match matches.len() {
        0 => Err(DeploymentError::not_found(id)),
        1 => Ok(matches.remove(0)),
        count => Err(DeploymentError::MultipleFound {
            id: id.to_string(),
            count,
            namespaces: matches.into_iter().map(|d| d.metadata.namespace).collect(),
        }),
    }
}

/// Outcome of looking up an ID before creating it
pub fn ensure_id_available(
    id: &str,
    lookup: Result<DeploymentResponse, DeploymentError>,
) -> Result<(), DeploymentError> {
    match lookup {
        Ok(existing) => Err(DeploymentError::AlreadyExists {
            id: id.to_string(),
            namespace: existing.metadata.namespace,
            kind: existing.kind,
        }),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl DeploymentOps for DeploymentService {
    async fn create(
        &self,
        request: &DeploymentRequest,
        id: &str,
    ) -> Result<DeploymentResponse, DeploymentError> {
        let (request, spec) = prepare(request)?;

        ensure_id_available(id, self.get_by_id(id).await)?;

        self.create_workload(id, &request, &spec).await?;
        info!(deployment_id = id, kind = %spec.kind(), "Deployment created");

        Ok(DeploymentResponse::accepted(id, request.metadata, spec))
    }

    async fn get_by_id(&self, id: &str) -> Result<DeploymentResponse, DeploymentError> {
        let (containers, vms) =
            future::try_join(self.containers.find(id), self.vms.find(id)).await?;

        let matches: Vec<_> = containers.into_iter().chain(vms).collect();
        if matches.len() > 1 {
            error!(deployment_id = id, count = matches.len(), "Deployment ID is not unique");
        }
        resolve_single(id, matches)
    }

    async fn update(
        &self,
        request: &DeploymentRequest,
        id: &str,
    ) -> Result<DeploymentResponse, DeploymentError> {
        let (request, spec) = prepare(request)?;
        let existing = self.get_by_id(id).await?;

        if let Err(e) = self
            .delete_workload(id, existing.kind, &existing.metadata.namespace)
            .await
        {
            warn!(deployment_id = id, error = %e, "Failed to delete existing deployment during update");
        }

        self.create_workload(id, &request, &spec).await?;
        info!(deployment_id = id, kind = %spec.kind(), "Deployment updated");

        Ok(DeploymentResponse {
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..DeploymentResponse::accepted(id, request.metadata, spec)
        })
    }

    async fn delete(&self, id: &str) -> Result<(), DeploymentError> {
        let existing = self.get_by_id(id).await?;
        self.delete_workload(id, existing.kind, &existing.metadata.namespace)
            .await?;
        info!(deployment_id = id, "Deployment deleted");
        Ok(())
    }

    async fn list(
        &self,
        query: &ListDeploymentsQuery,
    ) -> Result<ListDeploymentsResponse, DeploymentError> {
        let namespace = query.namespace_filter();
        let mut all = Vec::new();

        if query.includes(DeploymentKind::Container) {
            all.extend(self.containers.list(namespace).await?);
        }
        if query.includes(DeploymentKind::Vm) {
            all.extend(self.vms.list(namespace).await?);
        }

        Ok(ListDeploymentsResponse::paginate(
            all,
            query.limit,
            query.offset,
        ))
    }
}
