//! Deployment errors

use thiserror::Error;

use super::DeploymentKind;

/// Errors surfaced by deployment operations
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("deployment with ID {id} not found{}", in_namespace(.namespace))]
    NotFound { id: String, namespace: Option<String> },

    #[error("{}", multiple_found_message(.id, .count, .namespaces))]
    MultipleFound {
        id: String,
        count: usize,
        namespaces: Vec<String>,
    },

    #[error("deployment with ID {id} already exists in namespace {namespace} (kind: {kind})")]
    AlreadyExists {
        id: String,
        namespace: String,
        kind: DeploymentKind,
    },

    #[error("invalid deployment spec: {0}")]
    InvalidSpec(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn in_namespace(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!(" in namespace {ns}"),
        _ => String::new(),
    }
}

fn multiple_found_message(id: &str, count: &usize, namespaces: &[String]) -> String {
    if namespaces.is_empty() {
        format!("multiple deployments found with ID {id} ({count} conflicts)")
    } else {
        format!(
            "multiple deployments found with ID {id} across namespaces: [{}]",
            namespaces.join(" ")
        )
    }
}

impl DeploymentError {
    pub fn not_found(id: impl Into<String>) -> Self {
        DeploymentError::NotFound {
            id: id.into(),
            namespace: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DeploymentError::NotFound { .. })
    }

    pub fn is_multiple_found(&self) -> bool {
        matches!(self, DeploymentError::MultipleFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, DeploymentError::AlreadyExists { .. })
    }

    /// Already-exists and multiple-found both mean the ID is taken
    pub fn is_conflict(&self) -> bool {
        self.is_already_exists() || self.is_multiple_found()
    }

    pub fn is_invalid_spec(&self) -> bool {
        matches!(self, DeploymentError::InvalidSpec(_))
    }
}

/// Whether a kube error is an API 404
pub fn is_kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

/// Whether a kube error is an API 409
pub fn is_kube_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409)
}
