//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::Parser;
use std::path::PathBuf;

use crate::config::AppConfig;

/// REST API for container and virtual machine deployments on Kubernetes
#[derive(Parser, Debug, Default)]
#[command(name = "k8s-service-provider")]
#[command(version)]
#[command(about = "REST API for container and VM deployments on Kubernetes and KubeVirt")]
#[command(long_about = None)]
pub struct Args {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen host for both APIs
    #[arg(long)]
    pub host: Option<String>,

    /// Deployment API port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Namespace API port
    #[arg(long)]
    pub namespace_port: Option<u16>,

    /// Kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Use the in-cluster service account
    #[arg(long)]
    pub in_cluster: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Write the effective configuration to a file and exit
    #[arg(long, value_name = "PATH")]
    pub write_config: Option<PathBuf>,
}

impl Args {
    /// Overlay command-line flags, which take precedence over everything else
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(port) = self.namespace_port {
            config.namespace_server.port = port;
        }
        if let Some(path) = &self.kubeconfig {
            config.kubernetes.config_path = Some(path.clone());
        }
        if self.in_cluster {
            config.kubernetes.in_cluster = true;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::parse_from([
            "k8s-service-provider",
            "--port",
            "9090",
            "--namespace-port",
            "9091",
            "--in-cluster",
            "-l",
            "debug",
        ]);
        assert_eq!(args.port, Some(9090));
        assert_eq!(args.namespace_port, Some(9091));
        assert!(args.in_cluster);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args {
            port: Some(9000),
            log_level: Some("warn".to_string()),
            ..Default::default()
        };

        let config = args.apply(AppConfig::default());
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.namespace_server.port, 8081);
        assert_eq!(config.log.level, "warn");
        assert!(!config.kubernetes.in_cluster);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut base = AppConfig::default();
        base.server.host = "127.0.0.1".to_string();

        let config = Args::default().apply(base);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
    }
}
