//! Data models
//!
//! Request/response types, errors and label conventions.

mod deployment;
mod error;
pub mod labels;
mod namespace;

pub use deployment::{
    ContainerConfig, DeploymentKind, DeploymentPhase, DeploymentRequest, DeploymentResponse,
    DeploymentSpec, DeploymentStatus, ErrorResponse, HealthResponse, ListDeploymentsQuery,
    ListDeploymentsResponse, Metadata, ResourceConfig, VmConfig,
};
#[cfg(test)]
pub use deployment::{EnvironmentVariable, PortConfig};
pub use error::{is_kube_conflict, is_kube_not_found, DeploymentError};
pub use namespace::{LabelSelectors, NamespaceErrorResponse, NamespaceInfo, NamespaceResponse};
