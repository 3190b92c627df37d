//! Configuration module
//!
//! Defaults, optional YAML/JSON file, environment overrides.

mod env;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use env::EnvConfig;
#[cfg(test)]
pub(crate) use env::{EnvBuilder, ENV_LOCK};

/// Application configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Deployment API listener
    pub server: ServerConfig,

    /// Namespace API listener
    pub namespace_server: NamespaceServerConfig,

    /// Kubernetes client configuration
    pub kubernetes: KubernetesConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Overlay values taken from the environment
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(host) = &env.host {
            self.server.host = host.clone();
        }
        if let Some(port) = env.port {
            self.server.port = port;
        }
        if let Some(secs) = env.read_timeout {
            self.server.read_timeout = secs;
        }
        if let Some(secs) = env.write_timeout {
            self.server.write_timeout = secs;
        }
        if let Some(port) = env.namespace_port {
            self.namespace_server.port = port;
        }
        if let Some(path) = &env.kubeconfig {
            self.kubernetes.config_path = Some(path.clone());
        }
        if let Some(in_cluster) = env.in_cluster {
            self.kubernetes.in_cluster = in_cluster;
        }
        if let Some(level) = &env.log_level {
            self.log.level = level.clone();
        }
        if let Some(format) = &env.log_format {
            self.log.format = format.clone();
        }
        if let Some(path) = &env.log_output_path {
            self.log.output_path = path.clone();
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("invalid server port: {}", self.server.port);
        }
        if self.namespace_server.port == 0 {
            bail!("invalid namespace server port: {}", self.namespace_server.port);
        }
        if self.server.port == self.namespace_server.port {
            bail!(
                "server port and namespace server port must differ (both {})",
                self.server.port
            );
        }
        if self.server.host.trim().is_empty() {
            bail!("server host cannot be empty");
        }
        if self.server.read_timeout == 0 || self.server.write_timeout == 0 {
            bail!("server timeouts must be greater than zero");
        }
        Ok(())
    }

    /// Address of the deployment API, resolved when bound
    pub fn deployment_addr(&self) -> (&str, u16) {
        (self.server.host.trim(), self.server.port)
    }

    /// Address of the namespace API, resolved when bound
    pub fn namespace_addr(&self) -> (&str, u16) {
        (self.server.host.trim(), self.namespace_server.port)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen host shared by both listeners
    pub host: String,

    /// Deployment API port
    pub port: u16,

    /// Seconds allowed for reading a request body
    pub read_timeout: u64,

    /// Seconds allowed for producing a response
    pub write_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout: 30,
            write_timeout: 30,
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }
}

/// Namespace API listener configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceServerConfig {
    pub port: u16,
}

impl Default for NamespaceServerConfig {
    fn default() -> Self {
        Self { port: 8081 }
    }
}

/// Kubernetes client configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KubernetesConfig {
    /// Kubeconfig path, `~/.kube/config` when unset
    pub config_path: Option<String>,

    /// Use the service account of the pod
    pub in_cluster: bool,
}

impl KubernetesConfig {
    /// Kubeconfig file to read when not running in-cluster
    pub fn kubeconfig_path(&self) -> Result<PathBuf> {
        match self.config_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => Ok(PathBuf::from(path)),
            None => dirs::home_dir()
                .map(|home| home.join(".kube").join("config"))
                .context("Failed to get user home directory"),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,

    /// json or console
    pub format: String,

    /// `stdout` or a file path
    pub output_path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output_path: "stdout".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.read_timeout, 30);
        assert_eq!(config.namespace_server.port, 8081);
        assert!(!config.kubernetes.in_cluster);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.log.output_path, "stdout");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.host = String::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.namespace_server.port = config.server.port;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.write_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some(9000),
            in_cluster: Some(true),
            log_format: Some("console".to_string()),
            ..Default::default()
        };

        let config = AppConfig::default().with_env(&env);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.write_timeout, 30);
        assert!(config.kubernetes.in_cluster);
        assert_eq!(config.log.format, "console");
        assert_eq!(config.deployment_addr(), ("127.0.0.1", 9000));
    }

    #[test]
    fn test_hostname_listen_address() {
        let mut config = AppConfig::default();
        config.server.host = "localhost".to_string();

        assert!(config.validate().is_ok());
        assert_eq!(config.deployment_addr(), ("localhost", 8080));
        assert_eq!(config.namespace_addr(), ("localhost", 8081));
    }

    #[test]
    fn test_load_from_process_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = EnvBuilder::new()
            .port(9100)
            .var("KUBECONFIG", "/tmp/kubeconfig")
            .apply_scoped();

        let config = AppConfig::default().with_env(&EnvConfig::load());
        assert_eq!(config.server.port, 9100);
        assert_eq!(
            config.kubernetes.kubeconfig_path().unwrap(),
            PathBuf::from("/tmp/kubeconfig")
        );
    }

    #[test]
    fn test_partial_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  port: 7070\nlog:\n  level: debug\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.namespace_server.port, 8081);
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.kubernetes.config_path = Some("/etc/kube/config".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(
            loaded.kubernetes.config_path.as_deref(),
            Some("/etc/kube/config")
        );
    }
}
