//! Deployment services
//!
//! Container and VM backends plus the kind-dispatching service in front of them.

mod container;
mod service;
mod vm;

pub use container::ContainerService;
pub use service::{DeploymentOps, DeploymentService};
#[cfg(test)]
pub use service::resolve_single;
pub use vm::VmService;
