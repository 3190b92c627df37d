//! SSH access for KubeVirt VMs
//!
//! Validation of user-supplied keys and secret names, and construction of
//! the secrets whose public key KubeVirt injects into the guest.

use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::labels::short_id;

/// Data key holding the public key inside the secret
pub const SSH_KEY_DATA_KEY: &str = "key";

/// Maximum length of a secret name (DNS-1123 subdomain)
pub const MAX_SECRET_NAME_LENGTH: usize = 253;

const SSH_KEY_PREFIXES: &[&str] = &[
    "ssh-rsa ",
    "ssh-ed25519 ",
    "ecdsa-sha2-nistp256 ",
    "ecdsa-sha2-nistp384 ",
    "ecdsa-sha2-nistp521 ",
    "ssh-dss ",
];

/// Validation errors for SSH inputs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SshValidationError {
    #[error("SSH public key cannot be empty")]
    EmptyKey,

    #[error("SSH public key must start with one of: ssh-rsa, ssh-ed25519, ecdsa-sha2-nistp256/384/521, ssh-dss")]
    UnsupportedKeyType,

    #[error("secret name cannot be empty")]
    EmptySecretName,

    #[error("secret name must be at most {MAX_SECRET_NAME_LENGTH} characters")]
    SecretNameTooLong,

    #[error("secret name must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric")]
    InvalidSecretName,
}

/// Check that a public key is in authorized_keys format with a known type
pub fn validate_ssh_public_key(key: &str) -> Result<(), SshValidationError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(SshValidationError::EmptyKey);
    }
    if !SSH_KEY_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(SshValidationError::UnsupportedKeyType);
    }
    Ok(())
}

/// Check a secret name against `[a-z0-9]([-a-z0-9]*[a-z0-9])?`
pub fn validate_secret_name(name: &str) -> Result<(), SshValidationError> {
    if name.is_empty() {
        return Err(SshValidationError::EmptySecretName);
    }
    if name.len() > MAX_SECRET_NAME_LENGTH {
        return Err(SshValidationError::SecretNameTooLong);
    }

    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let valid = name.chars().all(|c| alnum(c) || c == '-')
        && name.starts_with(alnum)
        && name.ends_with(alnum);

    if valid {
        Ok(())
    } else {
        Err(SshValidationError::InvalidSecretName)
    }
}

/// Name of a generated secret: `vm-<id prefix>-ssh-key-<8 hex>`
pub fn generate_secret_name(deployment_id: &str) -> String {
    format!(
        "vm-{}-ssh-key-{:08x}",
        short_id(deployment_id),
        rand::random::<u32>()
    )
}

/// Opaque secret carrying a public key
pub fn ssh_key_secret(
    name: &str,
    namespace: &str,
    public_key: &str,
    labels: BTreeMap<String, String>,
) -> Secret {
    let mut string_data = BTreeMap::new();
    string_data.insert(SSH_KEY_DATA_KEY.to_string(), public_key.trim().to_string());

    Secret {
        metadata: kube::api::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(string_data),
        ..Default::default()
    }
}
