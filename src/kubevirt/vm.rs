//! VirtualMachine resource definition
//!
//! Typed subset of the KubeVirt `VirtualMachine` CRD and a builder that
//! renders the VM layout used for every deployment.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// VirtualMachine custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachine",
    plural = "virtualmachines",
    shortname = "vm",
    namespaced,
    status = "VirtualMachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Deprecated on/off switch, mutually exclusive with `run_strategy`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,

    /// Run strategy for the VM
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_strategy: Option<String>,

    /// Template for the VMI
    pub template: VmiTemplate,
}

/// VMI Template specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmiTemplate {
    /// Metadata for the VMI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VmiTemplateMetadata>,

    /// Spec for the VMI
    pub spec: VmiTemplateSpec,
}

/// VMI Template metadata
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmiTemplateMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// VMI Template spec
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmiTemplateSpec {
    /// CPU architecture of the guest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,

    /// Domain specification
    pub domain: DomainSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Network>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    /// Credentials injected into the guest
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_credentials: Vec<AccessCredential>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

/// Domain specification for the VM
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySpec>,

    pub devices: DevicesSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FeaturesSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine: Option<MachineSpec>,
}

/// CPU specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CpuSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sockets: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
}

/// Memory specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemorySpec {
    /// Guest memory (e.g., "4Gi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest: Option<String>,
}

/// Devices specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevicesSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng: Option<RngDevice>,
}

/// RNG device
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct RngDevice {}

/// Disk device
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    /// Disk name (must match volume name)
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskTarget>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_order: Option<u32>,
}

impl Disk {
    fn virtio(name: impl Into<String>, boot_order: u32) -> Self {
        Self {
            name: name.into(),
            disk: Some(DiskTarget {
                bus: Some("virtio".to_string()),
            }),
            boot_order: Some(boot_order),
        }
    }
}

/// Disk target configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskTarget {
    /// Bus type (virtio, sata, scsi)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
}

/// Network interface
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    /// Interface name (must match network name)
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeMode>,
}

/// Bridge network mode
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct BridgeMode {}

/// Hypervisor features
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acpi: Option<FeatureState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub smm: Option<FeatureState>,
}

/// Toggle for a hypervisor feature
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct FeatureState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Machine type specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct MachineSpec {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
}

/// Network configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodNetwork>,
}

/// Pod network configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodNetwork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_network_cidr: Option<String>,
}

/// Volume configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_disk: Option<ContainerDiskSource>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_init_no_cloud: Option<CloudInitNoCloud>,
}

/// Container disk source
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDiskSource {
    pub image: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

/// Cloud-init no cloud
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitNoCloud {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Credential injected into the guest
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessCredential {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<SshPublicKeyAccessCredential>,
}

/// SSH public key taken from a secret
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SshPublicKeyAccessCredential {
    pub source: SshPublicKeySource,
    pub propagation_method: PropagationMethod,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct SshPublicKeySource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretSource>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    pub secret_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropagationMethod {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_cloud: Option<NoCloudPropagation>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct NoCloudPropagation {}

/// VirtualMachine status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    #[serde(default)]
    pub created: bool,

    #[serde(default)]
    pub ready: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub printable_status: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<VmCondition>,
}

/// VM condition
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmCondition {
    #[serde(rename = "type")]
    pub condition_type: String,

    /// True, False or Unknown
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Name of the cloud-init disk and volume
pub const CLOUD_INIT_DISK: &str = "cloudinitdisk";

/// Name of the NIC and its pod network
pub const NIC_NAME: &str = "myvmnic";

/// Machine type of every VM
pub const MACHINE_TYPE: &str = "pc-q35-rhel9.4.0";

const RUN_STRATEGY: &str = "RerunOnFailure";
const ARCHITECTURE: &str = "amd64";
const TERMINATION_GRACE_PERIOD_SECS: i64 = 180;

/// Container disk image for a guest OS, fedora when unknown
pub fn os_image(os: &str) -> &'static str {
    match os.to_lowercase().as_str() {
        "ubuntu" => "quay.io/containerdisks/ubuntu:latest",
        "centos" => "quay.io/containerdisks/centos:latest",
        "rhel" => "quay.io/containerdisks/rhel:latest",
        _ => "quay.io/containerdisks/fedora:latest",
    }
}

/// Cloud-init user data for a VM
pub fn cloud_init_user_data(user: &str, hostname: &str, password: &str) -> String {
    format!(
        r#"#cloud-config
user: {user}
password: {password}
chpasswd: {{ expire: False }}
hostname: {hostname}
"#
    )
}

/// Builder for the VirtualMachine of a deployment
#[derive(Clone, Debug)]
pub struct VmBuilder {
    name: String,
    namespace: String,
    cpu_cores: u32,
    memory: String,
    image: String,
    user_data: Option<String>,
    ssh_secret: Option<String>,
    labels: BTreeMap<String, String>,
}

impl VmBuilder {
    /// Create a new builder; the VM name is generated from `name`
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cpu_cores: 1,
            memory: "1Gi".to_string(),
            image: os_image("fedora").to_string(),
            user_data: None,
            ssh_secret: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn cpu(mut self, cores: u32) -> Self {
        self.cpu_cores = cores;
        self
    }

    /// Set memory in GiB
    pub fn memory_gib(mut self, gib: u32) -> Self {
        self.memory = format!("{gib}Gi");
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn cloud_init(mut self, user_data: impl Into<String>) -> Self {
        self.user_data = Some(user_data.into());
        self
    }

    /// Inject the SSH public key stored in this secret
    pub fn ssh_secret(mut self, secret_name: impl Into<String>) -> Self {
        self.ssh_secret = Some(secret_name.into());
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Build the VirtualMachine resource
    pub fn build(self) -> VirtualMachine {
        let root_disk = format!("{}-disk", self.name);

        let disks = vec![
            Disk::virtio(&root_disk, 1),
            Disk::virtio(CLOUD_INIT_DISK, 2),
        ];

        let volumes = vec![
            Volume {
                name: root_disk,
                container_disk: Some(ContainerDiskSource {
                    image: self.image,
                    image_pull_policy: None,
                }),
                ..Default::default()
            },
            Volume {
                name: CLOUD_INIT_DISK.to_string(),
                cloud_init_no_cloud: Some(CloudInitNoCloud {
                    user_data: self.user_data,
                }),
                ..Default::default()
            },
        ];

        let access_credentials = self
            .ssh_secret
            .map(|secret_name| AccessCredential {
                ssh_public_key: Some(SshPublicKeyAccessCredential {
                    source: SshPublicKeySource {
                        secret: Some(SecretSource { secret_name }),
                    },
                    propagation_method: PropagationMethod {
                        no_cloud: Some(NoCloudPropagation {}),
                    },
                }),
            })
            .into_iter()
            .collect();

        VirtualMachine {
            metadata: kube::api::ObjectMeta {
                generate_name: Some(format!("{}-", self.name)),
                namespace: Some(self.namespace),
                labels: if self.labels.is_empty() {
                    None
                } else {
                    Some(self.labels)
                },
                ..Default::default()
            },
            spec: VirtualMachineSpec {
                running: None,
                run_strategy: Some(RUN_STRATEGY.to_string()),
                template: VmiTemplate {
                    metadata: None,
                    spec: VmiTemplateSpec {
                        architecture: Some(ARCHITECTURE.to_string()),
                        domain: DomainSpec {
                            cpu: Some(CpuSpec {
                                cores: Some(self.cpu_cores),
                                ..Default::default()
                            }),
                            memory: Some(MemorySpec {
                                guest: Some(self.memory),
                            }),
                            devices: DevicesSpec {
                                disks,
                                interfaces: vec![Interface {
                                    name: NIC_NAME.to_string(),
                                    bridge: Some(BridgeMode {}),
                                }],
                                rng: Some(RngDevice {}),
                            },
                            features: Some(FeaturesSpec {
                                acpi: Some(FeatureState::default()),
                                smm: Some(FeatureState {
                                    enabled: Some(true),
                                }),
                            }),
                            machine: Some(MachineSpec {
                                machine_type: Some(MACHINE_TYPE.to_string()),
                            }),
                        },
                        networks: vec![Network {
                            name: NIC_NAME.to_string(),
                            pod: Some(PodNetwork::default()),
                        }],
                        volumes,
                        access_credentials,
                        termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECS),
                    },
                },
            },
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_builder() {
        let vm = VmBuilder::new("test-vm", "default")
            .cpu(2)
            .memory_gib(4)
            .image(os_image("ubuntu"))
            .label("app", "test-vm")
            .build();

        assert_eq!(vm.metadata.name, None);
        assert_eq!(vm.metadata.generate_name.as_deref(), Some("test-vm-"));
        assert_eq!(vm.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(vm.spec.run_strategy.as_deref(), Some("RerunOnFailure"));
        assert!(vm.spec.running.is_none());

        let spec = &vm.spec.template.spec;
        assert_eq!(spec.architecture.as_deref(), Some("amd64"));
        assert_eq!(spec.domain.cpu.as_ref().and_then(|c| c.cores), Some(2));
        assert_eq!(
            spec.domain.memory.as_ref().and_then(|m| m.guest.as_deref()),
            Some("4Gi")
        );
        assert_eq!(spec.termination_grace_period_seconds, Some(180));
        assert_eq!(
            spec.volumes[0].container_disk.as_ref().map(|d| d.image.as_str()),
            Some("quay.io/containerdisks/ubuntu:latest")
        );
        assert!(spec.access_credentials.is_empty());
    }

    #[test]
    fn test_disks_match_volumes() {
        let vm = VmBuilder::new("web", "apps").build();
        let spec = &vm.spec.template.spec;

        let disks: Vec<_> = spec.domain.devices.disks.iter().map(|d| &d.name).collect();
        let volumes: Vec<_> = spec.volumes.iter().map(|v| &v.name).collect();
        assert_eq!(disks, volumes);
        assert_eq!(spec.domain.devices.disks[0].name, "web-disk");
        assert_eq!(spec.domain.devices.disks[0].boot_order, Some(1));
        assert_eq!(spec.domain.devices.disks[1].boot_order, Some(2));
        assert_eq!(spec.networks[0].name, spec.domain.devices.interfaces[0].name);
    }

    #[test]
    fn test_vm_with_ssh_secret() {
        let vm = VmBuilder::new("ssh-vm", "default")
            .ssh_secret("my-key")
            .build();

        let creds = &vm.spec.template.spec.access_credentials;
        assert_eq!(creds.len(), 1);
        let secret = creds[0]
            .ssh_public_key
            .as_ref()
            .and_then(|k| k.source.secret.as_ref())
            .map(|s| s.secret_name.as_str());
        assert_eq!(secret, Some("my-key"));
    }

    #[test]
    fn test_vm_serialization() {
        let vm = VmBuilder::new("json-vm", "default")
            .cloud_init(cloud_init_user_data("fedora", "json-vm", "secret"))
            .build();
        let value = serde_json::to_value(&vm).unwrap();

        assert_eq!(value["apiVersion"], "kubevirt.io/v1");
        assert_eq!(value["kind"], "VirtualMachine");
        assert_eq!(value["spec"]["runStrategy"], "RerunOnFailure");
        assert!(value["spec"].get("running").is_none());
        assert_eq!(
            value["spec"]["template"]["spec"]["domain"]["machine"]["type"],
            "pc-q35-rhel9.4.0"
        );
        assert_eq!(
            value["spec"]["template"]["spec"]["domain"]["features"]["smm"]["enabled"],
            true
        );
        let user_data = value["spec"]["template"]["spec"]["volumes"][1]["cloudInitNoCloud"]
            ["userData"]
            .as_str()
            .unwrap();
        assert!(user_data.starts_with("#cloud-config"));
        assert!(user_data.contains("hostname: json-vm"));

        let nic = &value["spec"]["template"]["spec"]["domain"]["devices"]["interfaces"][0];
        assert_eq!(nic, &serde_json::json!({"name": "myvmnic", "bridge": {}}));
    }

    #[test]
    fn test_os_image() {
        assert_eq!(os_image("fedora"), "quay.io/containerdisks/fedora:latest");
        assert_eq!(os_image("RHEL"), "quay.io/containerdisks/rhel:latest");
        assert_eq!(os_image("windows"), "quay.io/containerdisks/fedora:latest");
    }
}
