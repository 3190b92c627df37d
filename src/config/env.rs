//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Listen host from SERVER_HOST
    pub host: Option<String>,
    /// Deployment API port from SERVER_PORT
    pub port: Option<u16>,
    /// Body read timeout from SERVER_READ_TIMEOUT
    pub read_timeout: Option<u64>,
    /// Request timeout from SERVER_WRITE_TIMEOUT
    pub write_timeout: Option<u64>,
    /// Namespace API port from NAMESPACE_SERVER_PORT
    pub namespace_port: Option<u16>,
    /// Kubeconfig from KUBECONFIG
    pub kubeconfig: Option<String>,
    /// In-cluster mode from IN_CLUSTER
    pub in_cluster: Option<bool>,
    /// Log level from LOG_LEVEL
    pub log_level: Option<String>,
    /// Log format from LOG_FORMAT
    pub log_format: Option<String>,
    /// Log destination from LOG_OUTPUT_PATH
    pub log_output_path: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            host: get_env("SERVER_HOST"),
            port: get_env_parse("SERVER_PORT"),
            read_timeout: get_env_parse("SERVER_READ_TIMEOUT"),
            write_timeout: get_env_parse("SERVER_WRITE_TIMEOUT"),
            namespace_port: get_env_parse("NAMESPACE_SERVER_PORT"),
            kubeconfig: get_env("KUBECONFIG"),
            in_cluster: get_env_bool("IN_CLUSTER"),
            log_level: get_env("LOG_LEVEL"),
            log_format: get_env("LOG_FORMAT"),
            log_output_path: get_env("LOG_OUTPUT_PATH"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.read_timeout.is_some()
            || self.write_timeout.is_some()
            || self.namespace_port.is_some()
            || self.kubeconfig.is_some()
            || self.in_cluster.is_some()
            || self.log_level.is_some()
            || self.log_format.is_some()
            || self.log_output_path.is_some()
    }
}

/// Get a non-empty environment variable
fn get_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type, ignoring unparseable values
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).and_then(|v| match v.to_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

/// Builder for setting environment variables (useful for testing)
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set an arbitrary variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((key.into(), value.into()));
        self
    }

    pub fn port(self, port: u16) -> Self {
        self.var("SERVER_PORT", port.to_string())
    }

    pub fn namespace_port(self, port: u16) -> Self {
        self.var("NAMESPACE_SERVER_PORT", port.to_string())
    }

    pub fn in_cluster(self, in_cluster: bool) -> Self {
        self.var("IN_CLUSTER", in_cluster.to_string())
    }

    pub fn log_level(self, level: impl Into<String>) -> Self {
        self.var("LOG_LEVEL", level)
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

#[cfg(test)]
impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Serializes tests that mutate the process environment
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.port.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_builder() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = EnvBuilder::new()
            .port(9090)
            .namespace_port(9091)
            .log_level("debug")
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.port, Some(9090));
        assert_eq!(config.namespace_port, Some(9091));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.has_any());
    }

    #[test]
    fn test_invalid_values_ignored() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = EnvBuilder::new()
            .var("SERVER_PORT", "not-a-number")
            .var("SERVER_READ_TIMEOUT", "-5")
            .var("IN_CLUSTER", "maybe")
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.port, None);
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.in_cluster, None);
    }

    #[test]
    fn test_env_bool_parsing() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = EnvBuilder::new().in_cluster(true).apply_scoped();
        assert_eq!(EnvConfig::load().in_cluster, Some(true));
    }
}
