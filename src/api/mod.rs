//! HTTP API
//!
//! Routers for the deployment and namespace listeners.

mod deployments;
mod error;
mod middleware;
mod namespaces;

pub use deployments::deployment_router;
pub use middleware::with_common_layers;
pub use namespaces::namespace_router;
