//! Virtual machine deployments
//!
//! Maps a VM spec onto a KubeVirt VirtualMachine and manages the secret
//! holding its SSH public key.

use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::k8s::K8sClient;
use crate::kubevirt::{self, VirtualMachine, VmBuilder};
use crate::models::labels::{self, LABEL_APP_ID, LABEL_SSH_SECRET_CREATED};
use crate::models::{
    is_kube_not_found, DeploymentError, DeploymentKind, DeploymentPhase, DeploymentResponse,
    DeploymentStatus, Metadata, VmConfig,
};

const PASSWORD_LENGTH: usize = 16;

/// Secret whose public key is injected into the guest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshCredentials {
    pub secret_name: String,

    /// Whether the secret was generated for this VM and is removed with it
    pub generated: bool,
}

/// VM deployment operations
#[derive(Clone)]
pub struct VmService {
    client: K8sClient,
}

impl VmService {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    fn vms(&self, namespace: Option<&str>) -> Api<VirtualMachine> {
        self.client.namespaced_or_all(namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    /// Create the VirtualMachine, preparing its SSH secret first
    pub async fn create(
        &self,
        id: &str,
        metadata: &Metadata,
        config: &VmConfig,
    ) -> Result<(), DeploymentError> {
        let namespace = metadata.namespace_or_default();
        info!(deployment_id = id, namespace, name = %metadata.name, "Creating VM deployment");

        self.client.ensure_namespace(namespace).await?;

        let credentials = self.ensure_ssh_secret(id, namespace, config).await?;
        let vm = build_vm(id, metadata, config, credentials.as_ref(), &random_password());

        self.vms(Some(namespace))
            .create(&PostParams::default(), &vm)
            .await?;

        info!(deployment_id = id, "Successfully created VM deployment");
        Ok(())
    }

    /// Resolve or create the SSH key secret for a VM
    async fn ensure_ssh_secret(
        &self,
        id: &str,
        namespace: &str,
        config: &VmConfig,
    ) -> Result<Option<SshCredentials>, DeploymentError> {
        let public_key = config.ssh_public_key.as_deref();

        if let Some(key) = public_key {
            kubevirt::validate_ssh_public_key(key)
                .map_err(|e| DeploymentError::InvalidSpec(format!("invalid SSH public key: {e}")))?;
        }

        let (secret_name, generated) = match (config.ssh_key_name.as_deref(), public_key) {
            (None, None) => return Ok(None),
            (Some(name), _) => {
                kubevirt::validate_secret_name(name)
                    .map_err(|e| DeploymentError::InvalidSpec(format!("invalid secret name: {e}")))?;

                match self.secrets(namespace).get(name).await {
                    Ok(_) => {
                        debug!(deployment_id = id, secret = name, "Using existing SSH key secret");
                        return Ok(Some(SshCredentials {
                            secret_name: name.to_string(),
                            generated: false,
                        }));
                    }
                    Err(e) if is_kube_not_found(&e) => {}
                    Err(e) => return Err(e.into()),
                }

                if public_key.is_none() {
                    return Err(DeploymentError::InvalidSpec(format!(
                        "secret {name} not found and no ssh_public_key provided"
                    )));
                }
                (name.to_string(), false)
            }
            (None, Some(_)) => (kubevirt::generate_secret_name(id), true),
        };

        if let Some(key) = public_key {
            let secret = kubevirt::ssh_key_secret(
                &secret_name,
                namespace,
                key,
                labels::deployment_labels(id, &secret_name),
            );
            self.secrets(namespace)
                .create(&PostParams::default(), &secret)
                .await?;
            info!(deployment_id = id, secret = %secret_name, generated, "Created SSH key secret");
        }

        Ok(Some(SshCredentials {
            secret_name,
            generated,
        }))
    }

    /// All VMs carrying this ID, across namespaces
    pub async fn find(&self, id: &str) -> Result<Vec<DeploymentResponse>, DeploymentError> {
        self.list_by_selector(None, &labels::id_selector(id)).await
    }

    /// Delete the VM of a deployment and any SSH secret generated for it
    pub async fn delete(&self, id: &str, namespace: &str) -> Result<(), DeploymentError> {
        info!(deployment_id = id, namespace, "Deleting VM deployment");
        let selector = labels::id_selector(id);
        let params = ListParams::default().labels(&selector);
        let vms = self.vms(Some(namespace));

        let owns_secret = match vms.list(&params).await {
            Ok(list) => list.items.first().is_some_and(secret_was_generated),
            Err(e) => {
                debug!(deployment_id = id, error = %e, "Could not inspect VM before deletion");
                false
            }
        };

        if owns_secret {
            match self
                .secrets(namespace)
                .delete_collection(&DeleteParams::default(), &params)
                .await
            {
                Ok(_) => info!(deployment_id = id, "Deleted generated SSH key secrets"),
                Err(e) => warn!(deployment_id = id, error = %e, "Failed to delete SSH key secrets"),
            }
        }

        vms.delete_collection(&DeleteParams::default(), &params)
            .await?;

        info!(deployment_id = id, "Successfully deleted VM deployment");
        Ok(())
    }

    /// Managed VMs, in one namespace or all of them
    pub async fn list(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<DeploymentResponse>, DeploymentError> {
        let responses = self
            .list_by_selector(namespace, &labels::managed_selector())
            .await?;
        info!(count = responses.len(), "Listed VM deployments");
        Ok(responses)
    }

    /// A 404 means the KubeVirt CRDs are not installed, which is the same as no VMs
    async fn list_by_selector(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<DeploymentResponse>, DeploymentError> {
        match self
            .vms(namespace)
            .list(&ListParams::default().labels(selector))
            .await
        {
            Ok(list) => Ok(list.items.iter().map(to_response).collect()),
            Err(e) if is_kube_not_found(&e) => {
                debug!("VirtualMachine resource not available, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// VirtualMachine object for a VM spec
pub fn build_vm(
    id: &str,
    metadata: &Metadata,
    config: &VmConfig,
    credentials: Option<&SshCredentials>,
    password: &str,
) -> VirtualMachine {
    let name = &metadata.name;
    let user_data = kubevirt::cloud_init_user_data(&config.os, name, password);

    let mut builder = VmBuilder::new(name, metadata.namespace_or_default())
        .cpu(config.cpu)
        .memory_gib(config.ram)
        .image(kubevirt::os_image(&config.os))
        .cloud_init(user_data)
        .labels(labels::merged_labels(&metadata.labels, id, name));

    if let Some(creds) = credentials {
        builder = builder.ssh_secret(&creds.secret_name);
        if creds.generated {
            builder = builder.label(LABEL_SSH_SECRET_CREATED, "true");
        }
    }

    builder.build()
}

fn random_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

fn secret_was_generated(vm: &VirtualMachine) -> bool {
    vm.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_SSH_SECRET_CREATED))
        .is_some_and(|v| v == "true")
}

/// Phase derived from the VM readiness and conditions
pub fn vm_phase(vm: &VirtualMachine) -> DeploymentPhase {
    let Some(status) = &vm.status else {
        return DeploymentPhase::Pending;
    };
    if status.ready {
        return DeploymentPhase::Running;
    }

    for condition in &status.conditions {
        let is_true = condition.status == "True";
        match condition.condition_type.as_str() {
            "Ready" if is_true => return DeploymentPhase::Running,
            "Failure" if is_true => return DeploymentPhase::Failed,
            _ => {}
        }
    }

    DeploymentPhase::Pending
}

fn to_response(vm: &VirtualMachine) -> DeploymentResponse {
    let meta = &vm.metadata;
    let labels = meta.labels.clone().unwrap_or_default();
    let created_at = meta
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or_else(Utc::now);

    DeploymentResponse {
        id: labels.get(LABEL_APP_ID).cloned().unwrap_or_default(),
        kind: DeploymentKind::Vm,
        metadata: Metadata {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            labels,
        },
        spec: None,
        status: DeploymentStatus::with_phase(vm_phase(vm)),
        created_at,
        updated_at: created_at,
    }
}
