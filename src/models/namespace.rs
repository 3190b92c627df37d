//! Namespace lookup models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request body for filtering namespaces by labels
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LabelSelectors {
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

impl LabelSelectors {
    /// Labels if present and non-empty
    pub fn non_empty(&self) -> Option<&BTreeMap<String, String>> {
        self.labels.as_ref().filter(|labels| !labels.is_empty())
    }
}

/// Namespace with its labels
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Namespaces matching a label query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamespaceResponse {
    pub namespaces: Vec<NamespaceInfo>,
    pub count: usize,
}

impl From<Vec<NamespaceInfo>> for NamespaceResponse {
    fn from(namespaces: Vec<NamespaceInfo>) -> Self {
        Self {
            count: namespaces.len(),
            namespaces,
        }
    }
}

/// Error body of the namespace API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamespaceErrorResponse {
    pub error: String,
    pub message: String,
}
