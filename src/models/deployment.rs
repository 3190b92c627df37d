//! Deployment request and response models
//!
//! Defines the simplified deployment schema exposed over REST and its
//! validation rules.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::DeploymentError;

/// Namespace used when a request does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Maximum length of a deployment name (DNS-1123 label)
pub const MAX_NAME_LENGTH: usize = 63;

/// Longest container name whose `{name}-service-{short id}` still fits a label
pub const MAX_CONTAINER_NAME_LENGTH: usize = MAX_NAME_LENGTH - "-service-".len() - 8;

/// Kind of workload backing a deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentKind {
    Container,
    Vm,
}

impl DeploymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentKind::Container => "container",
            DeploymentKind::Vm => "vm",
        }
    }
}

impl fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Common metadata for deployments
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Metadata {
    /// Namespace, falling back to the default one
    pub fn namespace_or_default(&self) -> &str {
        if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        }
    }
}

/// Payload for creating or updating a deployment
///
/// `spec` is kept as raw JSON until the kind is known, see [`parse_spec`].
///
/// [`parse_spec`]: DeploymentRequest::parse_spec
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub kind: DeploymentKind,
    pub metadata: Metadata,
    pub spec: serde_json::Value,
}

impl DeploymentRequest {
    /// Fill in defaults that the handlers apply before dispatching
    pub fn apply_defaults(&mut self) {
        if self.metadata.namespace.is_empty() {
            self.metadata.namespace = DEFAULT_NAMESPACE.to_string();
        }
    }

    /// Validate metadata that applies to every kind
    pub fn validate_metadata(&self) -> Result<(), DeploymentError> {
        let name = &self.metadata.name;
        if name.is_empty() {
            return Err(DeploymentError::InvalidSpec(
                "metadata.name is required".to_string(),
            ));
        }
        let max = match self.kind {
            DeploymentKind::Container => MAX_CONTAINER_NAME_LENGTH,
            DeploymentKind::Vm => MAX_NAME_LENGTH,
        };
        if name.len() > max {
            return Err(DeploymentError::InvalidSpec(format!(
                "metadata.name must be at most {max} characters"
            )));
        }
        Ok(())
    }

    /// Parse the raw spec according to the deployment kind and validate it
    pub fn parse_spec(&self) -> Result<DeploymentSpec, DeploymentError> {
        let spec = match self.kind {
            DeploymentKind::Container => {
                let spec: ContainerSpec = serde_json::from_value(self.spec.clone())
                    .map_err(|e| DeploymentError::InvalidSpec(e.to_string()))?;
                spec.validate()?;
                DeploymentSpec::Container(spec)
            }
            DeploymentKind::Vm => {
                let spec: VmSpec = serde_json::from_value(self.spec.clone())
                    .map_err(|e| DeploymentError::InvalidSpec(e.to_string()))?;
                spec.validate()?;
                DeploymentSpec::Vm(spec)
            }
        };
        Ok(spec)
    }
}

/// Kind-specific deployment spec
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeploymentSpec {
    Container(ContainerSpec),
    Vm(VmSpec),
}

impl DeploymentSpec {
    pub fn kind(&self) -> DeploymentKind {
        match self {
            DeploymentSpec::Container(_) => DeploymentKind::Container,
            DeploymentSpec::Vm(_) => DeploymentKind::Vm,
        }
    }
}

/// Container deployment spec
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub container: ContainerConfig,
}

impl ContainerSpec {
    pub fn validate(&self) -> Result<(), DeploymentError> {
        self.container.validate()
    }
}

/// Container configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub image: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvironmentVariable>,
}

impl ContainerConfig {
    /// Replica count, defaulting to one
    pub fn replicas_or_default(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }

    pub fn validate(&self) -> Result<(), DeploymentError> {
        if self.image.trim().is_empty() {
            return Err(DeploymentError::InvalidSpec(
                "container.image is required".to_string(),
            ));
        }
        if let Some(replicas) = self.replicas {
            if replicas < 0 {
                return Err(DeploymentError::InvalidSpec(
                    "container.replicas must not be negative".to_string(),
                ));
            }
        }
        for port in &self.ports {
            port.validate()?;
        }
        for env in &self.environment {
            if env.name.is_empty() {
                return Err(DeploymentError::InvalidSpec(
                    "environment variable name is required".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Port exposed by a container
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    pub container_port: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_port: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl PortConfig {
    /// Port exposed on the Service
    pub fn service_port_or_default(&self) -> i32 {
        self.service_port
            .filter(|p| *p > 0)
            .unwrap_or(self.container_port)
    }

    /// Protocol in Kubernetes spelling, TCP when unset
    pub fn protocol_or_default(&self) -> String {
        self.protocol
            .as_deref()
            .map(str::to_uppercase)
            .unwrap_or_else(|| "TCP".to_string())
    }

    fn validate(&self) -> Result<(), DeploymentError> {
        if !(1..=65535).contains(&self.container_port) {
            return Err(DeploymentError::InvalidSpec(format!(
                "containerPort {} is out of range 1-65535",
                self.container_port
            )));
        }
        if let Some(port) = self.service_port {
            if !(1..=65535).contains(&port) {
                return Err(DeploymentError::InvalidSpec(format!(
                    "servicePort {port} is out of range 1-65535"
                )));
            }
        }
        if let Some(protocol) = &self.protocol {
            if !matches!(protocol.to_uppercase().as_str(), "TCP" | "UDP" | "SCTP") {
                return Err(DeploymentError::InvalidSpec(format!(
                    "unsupported protocol: {protocol}"
                )));
            }
        }
        Ok(())
    }
}

/// Resource requests for a container
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,
}

/// Environment variable passed to a container
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// Virtual machine deployment spec
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VmSpec {
    pub vm: VmConfig,
}

impl VmSpec {
    pub fn validate(&self) -> Result<(), DeploymentError> {
        self.vm.validate()
    }
}

/// Virtual machine sizing and access
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Memory in GiB
    pub ram: u32,

    /// CPU cores
    pub cpu: u32,

    /// Guest operating system
    pub os: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_name: Option<String>,
}

impl VmConfig {
    pub const MAX_RAM_GIB: u32 = 32;
    pub const MAX_CPU_CORES: u32 = 32;

    pub fn validate(&self) -> Result<(), DeploymentError> {
        if !(1..=Self::MAX_RAM_GIB).contains(&self.ram) {
            return Err(DeploymentError::InvalidSpec(format!(
                "vm.ram must be between 1 and {}",
                Self::MAX_RAM_GIB
            )));
        }
        if !(1..=Self::MAX_CPU_CORES).contains(&self.cpu) {
            return Err(DeploymentError::InvalidSpec(format!(
                "vm.cpu must be between 1 and {}",
                Self::MAX_CPU_CORES
            )));
        }
        if self.os.trim().is_empty() {
            return Err(DeploymentError::InvalidSpec("vm.os is required".to_string()));
        }
        // Written verbatim into cloud-init user data
        if !self.os.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DeploymentError::InvalidSpec(
                "vm.os may only contain letters, digits and '-'".to_string(),
            ));
        }
        if let Some(key) = &self.ssh_public_key {
            crate::kubevirt::validate_ssh_public_key(key)
                .map_err(|e| DeploymentError::InvalidSpec(format!("invalid SSH public key: {e}")))?;
        }
        if let Some(name) = &self.ssh_key_name {
            crate::kubevirt::validate_secret_name(name)
                .map_err(|e| DeploymentError::InvalidSpec(format!("invalid secret name: {e}")))?;
        }
        Ok(())
    }
}

/// Lifecycle phase of a deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// Observed status of a deployment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub phase: DeploymentPhase,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl DeploymentStatus {
    pub fn pending() -> Self {
        Self::with_phase(DeploymentPhase::Pending)
    }

    pub fn with_phase(phase: DeploymentPhase) -> Self {
        Self {
            phase,
            message: None,
            ready_replicas: None,
            conditions: Vec::new(),
        }
    }
}

/// Condition reported for a deployment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Deployment as returned by the API
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResponse {
    pub id: String,
    pub kind: DeploymentKind,
    pub metadata: Metadata,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<DeploymentSpec>,

    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentResponse {
    /// Response for a deployment that was just submitted to the cluster
    pub fn accepted(id: impl Into<String>, metadata: Metadata, spec: DeploymentSpec) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: spec.kind(),
            metadata,
            spec: Some(spec),
            status: DeploymentStatus::pending(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Query parameters for listing deployments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListDeploymentsQuery {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default, deserialize_with = "kind_or_all")]
    pub kind: Option<DeploymentKind>,

    #[serde(default = "ListDeploymentsQuery::default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

/// An empty `kind` parameter selects every kind
fn kind_or_all<'de, D>(deserializer: D) -> Result<Option<DeploymentKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let kind = Option::<String>::deserialize(deserializer)?;
    match kind.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some("container") => Ok(Some(DeploymentKind::Container)),
        Some("vm") => Ok(Some(DeploymentKind::Vm)),
        Some(other) => Err(de::Error::unknown_variant(other, &["container", "vm"])),
    }
}

impl Default for ListDeploymentsQuery {
    fn default() -> Self {
        Self {
            namespace: None,
            kind: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl ListDeploymentsQuery {
    pub const DEFAULT_LIMIT: usize = 20;
    pub const MAX_LIMIT: usize = 100;

    fn default_limit() -> usize {
        Self::DEFAULT_LIMIT
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=Self::MAX_LIMIT).contains(&self.limit) {
            return Err(format!("limit must be between 1 and {}", Self::MAX_LIMIT));
        }
        Ok(())
    }

    /// Namespace filter, `None` meaning all namespaces
    pub fn namespace_filter(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    pub fn includes(&self, kind: DeploymentKind) -> bool {
        self.kind.map_or(true, |k| k == kind)
    }
}

/// Pagination details of a list response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
    pub has_more: bool,
}

/// Response of a list request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListDeploymentsResponse {
    pub deployments: Vec<DeploymentResponse>,
    pub pagination: Pagination,
}

impl ListDeploymentsResponse {
    /// Slice `[offset, offset + limit)` out of the merged result set
    pub fn paginate(all: Vec<DeploymentResponse>, limit: usize, offset: usize) -> Self {
        let total = all.len();
        let deployments = all.into_iter().skip(offset).take(limit).collect();

        Self {
            deployments,
            pagination: Pagination {
                limit,
                offset,
                total,
                has_more: offset.saturating_add(limit) < total,
            },
        }
    }
}

/// Health check response of the deployment API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }
}

/// Error body of the deployment API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    pub timestamp: DateTime<Utc>,
}
