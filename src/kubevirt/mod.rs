//! KubeVirt integration module
//!
//! VirtualMachine resource types, the VM layout builder and SSH credential
//! helpers.

mod ssh;
mod vm;

pub use ssh::{generate_secret_name, ssh_key_secret, validate_secret_name, validate_ssh_public_key};
pub use vm::{cloud_init_user_data, os_image, VirtualMachine, VmBuilder};
#[cfg(test)]
pub use vm::{VirtualMachineStatus, VmCondition};
