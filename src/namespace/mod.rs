//! Namespace lookup service

mod service;

pub use service::{NamespaceOps, NamespaceService};
