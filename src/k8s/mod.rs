//! Kubernetes API client module
//!
//! Shared client handle used by both HTTP listeners.

mod client;
#[cfg(test)]
pub mod mock;

pub use client::K8sClient;
