//! Label conventions shared by every managed resource

use std::collections::BTreeMap;

/// Deployment ID label
pub const LABEL_APP_ID: &str = "app-id";

/// Deployment name label, also used as pod selector
pub const LABEL_APP_NAME: &str = "app";

/// Ownership label
pub const LABEL_MANAGED_BY: &str = "managed-by";

/// Set on VMs whose SSH secret was generated by this service
pub const LABEL_SSH_SECRET_CREATED: &str = "ssh-secret-created";

/// Value of [`LABEL_MANAGED_BY`]
pub const MANAGED_BY_VALUE: &str = "k8s-service-provider";

/// Labels identifying a managed deployment
pub fn deployment_labels(id: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP_NAME.to_string(), name.to_string()),
        (LABEL_APP_ID.to_string(), id.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
    ])
}

/// User labels overlaid with the deployment labels
pub fn merged_labels(
    user: &BTreeMap<String, String>,
    id: &str,
    name: &str,
) -> BTreeMap<String, String> {
    let mut labels = user.clone();
    labels.extend(deployment_labels(id, name));
    labels
}

/// Selector matching every resource of one deployment
pub fn id_selector(id: &str) -> String {
    format!("{LABEL_APP_ID}={id},{LABEL_MANAGED_BY}={MANAGED_BY_VALUE}")
}

/// Selector matching every resource managed by this service
pub fn managed_selector() -> String {
    format!("{LABEL_MANAGED_BY}={MANAGED_BY_VALUE}")
}

/// First eight characters of a deployment ID, used in resource names
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Equality selector built from a label map
pub fn selector_from_map(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
