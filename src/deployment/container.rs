//! Container deployments
//!
//! Maps a container spec onto a Kubernetes Deployment plus an optional
//! NodePort Service, and reads them back by label.

use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec as K8sDeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::k8s::K8sClient;
use crate::models::labels::{self, LABEL_APP_ID};
use crate::models::{
    ContainerConfig, DeploymentError, DeploymentKind, DeploymentPhase, DeploymentResponse,
    DeploymentStatus, Metadata, ResourceConfig,
};

/// Container deployment operations
#[derive(Clone)]
pub struct ContainerService {
    client: K8sClient,
}

impl ContainerService {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: Option<&str>) -> Api<Deployment> {
        self.client.namespaced_or_all(namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    /// Create the Deployment and, when ports are exposed, its Service
    pub async fn create(
        &self,
        id: &str,
        metadata: &Metadata,
        config: &ContainerConfig,
    ) -> Result<(), DeploymentError> {
        let namespace = metadata.namespace_or_default();
        info!(deployment_id = id, namespace, name = %metadata.name, "Creating container deployment");

        self.client.ensure_namespace(namespace).await?;

        let deployment = build_deployment(id, metadata, config);
        self.deployments(Some(namespace))
            .create(&PostParams::default(), &deployment)
            .await?;

        if let Some(service) = build_service(id, metadata, config) {
            if let Err(e) = self
                .services(namespace)
                .create(&PostParams::default(), &service)
                .await
            {
                let name = deployment.metadata.name.as_deref().unwrap_or_default();
                if let Err(cleanup) = self
                    .deployments(Some(namespace))
                    .delete(name, &DeleteParams::default())
                    .await
                {
                    warn!(deployment_id = id, error = %cleanup, "Failed to roll back deployment after service error");
                }
                return Err(e.into());
            }
        }

        info!(deployment_id = id, "Successfully created container deployment");
        Ok(())
    }

    /// All container deployments carrying this ID, across namespaces
    pub async fn find(&self, id: &str) -> Result<Vec<DeploymentResponse>, DeploymentError> {
        let list = self
            .deployments(None)
            .list(&ListParams::default().labels(&labels::id_selector(id)))
            .await?;

        Ok(list.items.iter().map(to_response).collect())
    }

    /// Delete the Deployment and every Service of a deployment
    pub async fn delete(&self, id: &str, namespace: &str) -> Result<(), DeploymentError> {
        info!(deployment_id = id, namespace, "Deleting container deployment");
        let selector = labels::id_selector(id);

        self.deployments(Some(namespace))
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels(&selector),
            )
            .await?;

        let services = self.services(namespace);
        match services
            .list(&ListParams::default().labels(&selector))
            .await
        {
            Ok(list) => {
                for service in list.items {
                    let Some(name) = service.metadata.name else {
                        continue;
                    };
                    if let Err(e) = services.delete(&name, &DeleteParams::default()).await {
                        warn!(deployment_id = id, service = %name, error = %e, "Failed to delete service");
                    }
                }
            }
            Err(e) => warn!(deployment_id = id, error = %e, "Failed to list services for deletion"),
        }

        info!(deployment_id = id, "Successfully deleted container deployment");
        Ok(())
    }

    /// Managed container deployments, in one namespace or all of them
    pub async fn list(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<DeploymentResponse>, DeploymentError> {
        let list = self
            .deployments(namespace)
            .list(&ListParams::default().labels(&labels::managed_selector()))
            .await?;

        let responses: Vec<_> = list.items.iter().map(to_response).collect();
        info!(count = responses.len(), "Listed container deployments");
        Ok(responses)
    }
}

/// Deployment object for a container spec
pub fn build_deployment(id: &str, metadata: &Metadata, config: &ContainerConfig) -> Deployment {
    let name = &metadata.name;
    let selector_labels = labels::deployment_labels(id, name);

    let ports: Vec<ContainerPort> = config
        .ports
        .iter()
        .map(|port| ContainerPort {
            container_port: port.container_port,
            protocol: Some(port.protocol_or_default()),
            ..Default::default()
        })
        .collect();

    let env: Vec<EnvVar> = config
        .environment
        .iter()
        .map(|var| EnvVar {
            name: var.name.clone(),
            value: Some(var.value.clone()),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: name.clone(),
        image: Some(config.image.clone()),
        ports: (!ports.is_empty()).then_some(ports),
        env: (!env.is_empty()).then_some(env),
        resources: config.resources.as_ref().map(resource_requests),
        ..Default::default()
    };

    Deployment {
        metadata: kube::api::ObjectMeta {
            name: Some(format!("{name}-{}", labels::short_id(id))),
            namespace: Some(metadata.namespace_or_default().to_string()),
            labels: Some(labels::merged_labels(&metadata.labels, id, name)),
            ..Default::default()
        },
        spec: Some(K8sDeploymentSpec {
            replicas: Some(config.replicas_or_default()),
            selector: LabelSelector {
                match_labels: Some(selector_labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(kube::api::ObjectMeta {
                    labels: Some(selector_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// NodePort Service for the exposed ports, `None` when there are none
pub fn build_service(id: &str, metadata: &Metadata, config: &ContainerConfig) -> Option<Service> {
    if config.ports.is_empty() {
        return None;
    }

    let name = &metadata.name;
    let ports = config
        .ports
        .iter()
        .enumerate()
        .map(|(i, port)| ServicePort {
            name: Some(format!("port-{i}")),
            port: port.service_port_or_default(),
            target_port: Some(IntOrString::Int(port.container_port)),
            protocol: Some(port.protocol_or_default()),
            ..Default::default()
        })
        .collect();

    Some(Service {
        metadata: kube::api::ObjectMeta {
            name: Some(format!("{name}-service-{}", labels::short_id(id))),
            namespace: Some(metadata.namespace_or_default().to_string()),
            labels: Some(labels::merged_labels(&metadata.labels, id, name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels::deployment_labels(id, name)),
            ports: Some(ports),
            type_: Some("NodePort".to_string()),
            ..Default::default()
        }),
        status: None,
    })
}

/// Resource requests, skipping quantities Kubernetes would reject
fn resource_requests(resources: &ResourceConfig) -> ResourceRequirements {
    let mut requests = BTreeMap::new();
    for (key, value) in [("cpu", &resources.cpu), ("memory", &resources.memory)] {
        if is_valid_quantity(value) {
            requests.insert(key.to_string(), Quantity(value.clone()));
        } else if !value.is_empty() {
            warn!(resource = key, value = %value, "Ignoring invalid resource quantity");
        }
    }

    ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        ..Default::default()
    }
}

/// Whether a string parses as a Kubernetes quantity (e.g. `500m`, `1.5`, `128Mi`, `1e3`)
pub fn is_valid_quantity(value: &str) -> bool {
    const SUFFIXES: &[&str] = &[
        "", "m", "k", "M", "G", "T", "P", "E", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei",
    ];

    let unsigned = value
        .strip_prefix('+')
        .or_else(|| value.strip_prefix('-'))
        .unwrap_or(value);
    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    let number_ok = match fraction {
        Some(f) => !(whole.is_empty() && f.is_empty()) && !f.contains('.'),
        None => !whole.is_empty(),
    };
    if !number_ok {
        return false;
    }

    if SUFFIXES.contains(&suffix) {
        return true;
    }

    // Decimal exponent, e.g. "1e3" or "2E-2"
    let exponent = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'));
    match exponent {
        Some(exp) => {
            let digits = exp
                .strip_prefix('+')
                .or_else(|| exp.strip_prefix('-'))
                .unwrap_or(exp);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Phase derived from replica readiness
pub fn deployment_phase(deployment: &Deployment) -> DeploymentPhase {
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);

    if ready > 0 && ready == desired {
        DeploymentPhase::Running
    } else {
        DeploymentPhase::Pending
    }
}

fn to_response(deployment: &Deployment) -> DeploymentResponse {
    let meta = &deployment.metadata;
    let labels = meta.labels.clone().unwrap_or_default();
    let created_at = meta
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or_else(Utc::now);

    let ready_replicas = deployment
        .status
        .as_ref()
        .map(|s| s.ready_replicas.unwrap_or(0));

    DeploymentResponse {
        id: labels.get(LABEL_APP_ID).cloned().unwrap_or_default(),
        kind: DeploymentKind::Container,
        metadata: Metadata {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            labels,
        },
        spec: None,
        status: DeploymentStatus {
            ready_replicas,
            ..DeploymentStatus::with_phase(deployment_phase(deployment))
        },
        created_at,
        updated_at: created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::mock::{self, Exchange, Recorded};
    use crate::models::{EnvironmentVariable, PortConfig};
    use k8s_openapi::api::apps::v1::DeploymentStatus as K8sDeploymentStatus;
    use serde_json::json;
    use tokio::task::JoinHandle;

    const ID: &str = "0123abcd-4567-89ef-0123-456789abcdef";

    fn metadata() -> Metadata {
        Metadata {
            name: "web".to_string(),
            namespace: "apps".to_string(),
            labels: BTreeMap::from([("team".to_string(), "blue".to_string())]),
        }
    }

    fn config() -> ContainerConfig {
        ContainerConfig {
            image: "nginx:1.25".to_string(),
            replicas: Some(3),
            ports: vec![
                PortConfig {
                    container_port: 80,
                    service_port: Some(8080),
                    protocol: None,
                },
                PortConfig {
                    container_port: 53,
                    service_port: None,
                    protocol: Some("udp".to_string()),
                },
            ],
            resources: Some(ResourceConfig {
                cpu: "500m".to_string(),
                memory: "lots".to_string(),
            }),
            environment: vec![EnvironmentVariable {
                name: "MODE".to_string(),
                value: "prod".to_string(),
            }],
        }
    }

    #[test]
    fn test_build_deployment() {
        let deployment = build_deployment(ID, &metadata(), &config());

        assert_eq!(deployment.metadata.name.as_deref(), Some("web-0123abcd"));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("apps"));

        let object_labels = deployment.metadata.labels.as_ref().unwrap();
        assert_eq!(object_labels["team"], "blue");
        assert_eq!(object_labels["app-id"], ID);
        assert_eq!(object_labels["managed-by"], "k8s-service-provider");

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        let selector = spec.selector.match_labels.as_ref().unwrap();
        assert_eq!(selector, &labels::deployment_labels(ID, "web"));
        assert!(!selector.contains_key("team"));

        let pod = spec.template.spec.as_ref().unwrap();
        let container = &pod.containers[0];
        assert_eq!(container.name, "web");
        assert_eq!(container.image.as_deref(), Some("nginx:1.25"));

        let ports = container.ports.as_ref().unwrap();
        assert_eq!(ports[0].container_port, 80);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(ports[1].protocol.as_deref(), Some("UDP"));

        let requests = container
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .unwrap();
        assert_eq!(requests.get("cpu"), Some(&Quantity("500m".to_string())));
        assert!(!requests.contains_key("memory"));

        let env = container.env.as_ref().unwrap();
        assert_eq!(env[0].name, "MODE");
        assert_eq!(env[0].value.as_deref(), Some("prod"));
    }

    #[test]
    fn test_build_deployment_minimal() {
        let config = ContainerConfig {
            image: "busybox".to_string(),
            ..Default::default()
        };
        let mut metadata = metadata();
        metadata.namespace.clear();

        let deployment = build_deployment(ID, &metadata, &config);
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("default"));

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        let container = &spec.template.spec.unwrap().containers[0];
        assert!(container.ports.is_none());
        assert!(container.env.is_none());
        assert!(container.resources.is_none());
        assert!(build_service(ID, &metadata, &config).is_none());
    }

    #[test]
    fn test_build_service() {
        let service = build_service(ID, &metadata(), &config()).unwrap();

        assert_eq!(service.metadata.name.as_deref(), Some("web-service-0123abcd"));

        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        assert_eq!(spec.selector, Some(labels::deployment_labels(ID, "web")));

        let ports = spec.ports.unwrap();
        assert_eq!(ports[0].port, 8080);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(80)));
        assert_eq!(ports[1].port, 53);
        assert_eq!(ports[1].protocol.as_deref(), Some("UDP"));
        assert_ne!(ports[0].name, ports[1].name);
    }

    #[test]
    fn test_valid_quantities() {
        for q in ["1", "500m", "1.5", ".5", "128Mi", "2Gi", "1e3", "2E-2", "+1k"] {
            assert!(is_valid_quantity(q), "{q}");
        }
        for q in ["", "lots", "1.2.3", "12XB", "Mi", "1e", "."] {
            assert!(!is_valid_quantity(q), "{q}");
        }
    }

    fn with_replicas(desired: Option<i32>, ready: Option<i32>) -> Deployment {
        Deployment {
            spec: Some(K8sDeploymentSpec {
                replicas: desired,
                ..Default::default()
            }),
            status: Some(K8sDeploymentStatus {
                ready_replicas: ready,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_deployment_phase() {
        assert_eq!(
            deployment_phase(&with_replicas(Some(3), None)),
            DeploymentPhase::Pending
        );
        assert_eq!(
            deployment_phase(&with_replicas(Some(3), Some(1))),
            DeploymentPhase::Pending
        );
        assert_eq!(
            deployment_phase(&with_replicas(Some(3), Some(3))),
            DeploymentPhase::Running
        );
        assert_eq!(
            deployment_phase(&with_replicas(None, Some(1))),
            DeploymentPhase::Running
        );
        assert_eq!(
            deployment_phase(&with_replicas(Some(0), Some(0))),
            DeploymentPhase::Pending
        );
    }

    #[test]
    fn test_to_response() {
        let mut deployment = build_deployment(ID, &metadata(), &config());
        deployment.status = Some(K8sDeploymentStatus {
            ready_replicas: Some(3),
            ..Default::default()
        });

        let response = to_response(&deployment);
        assert_eq!(response.id, ID);
        assert_eq!(response.kind, DeploymentKind::Container);
        assert_eq!(response.metadata.name, "web-0123abcd");
        assert_eq!(response.metadata.namespace, "apps");
        assert_eq!(response.status.phase, DeploymentPhase::Running);
        assert_eq!(response.status.ready_replicas, Some(3));
        assert!(response.spec.is_none());
    }

    const DEPLOYMENTS_PATH: &str = "/apis/apps/v1/namespaces/apps/deployments";
    const SERVICES_PATH: &str = "/api/v1/namespaces/apps/services";

    fn scripted(exchanges: Vec<Exchange>) -> (ContainerService, JoinHandle<Vec<Recorded>>) {
        let (client, server) = mock::scripted(exchanges);
        (ContainerService::new(client), server)
    }

    fn apps_namespace() -> Exchange {
        Exchange::get("/api/v1/namespaces/apps").json(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "apps"},
        }))
    }

    #[tokio::test]
    async fn test_create_with_service() {
        let (service, server) = scripted(vec![
            apps_namespace(),
            Exchange::post(DEPLOYMENTS_PATH),
            Exchange::post(SERVICES_PATH),
        ]);

        service.create(ID, &metadata(), &config()).await.unwrap();

        let calls = server.await.unwrap();
        assert_eq!(calls[1].body["metadata"]["name"], "web-0123abcd");
        assert_eq!(calls[2].body["metadata"]["name"], "web-service-0123abcd");
        assert_eq!(calls[2].body["spec"]["type"], "NodePort");
    }

    #[tokio::test]
    async fn test_create_without_ports_skips_service() {
        let (service, server) = scripted(vec![apps_namespace(), Exchange::post(DEPLOYMENTS_PATH)]);
        let config = ContainerConfig {
            image: "busybox".to_string(),
            ..Default::default()
        };

        service.create(ID, &metadata(), &config).await.unwrap();
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_service_failure_removes_deployment() {
        let (service, server) = scripted(vec![
            apps_namespace(),
            Exchange::post(DEPLOYMENTS_PATH),
            Exchange::post(SERVICES_PATH).fail(422),
            Exchange::delete(format!("{DEPLOYMENTS_PATH}/web-0123abcd")),
        ]);

        let err = service.create(ID, &metadata(), &config()).await.unwrap_err();
        assert!(matches!(err, DeploymentError::Kube(kube::Error::Api(ref e)) if e.code == 422));

        let calls = server.await.unwrap();
        assert_eq!(calls[3].method, "DELETE");
        assert_eq!(calls[3].path, format!("{DEPLOYMENTS_PATH}/web-0123abcd"));
    }

    #[tokio::test]
    async fn test_delete_continues_past_service_errors() {
        let mut extra = build_service(ID, &metadata(), &config()).unwrap();
        extra.metadata.name = Some("web-extra".to_string());
        let services = mock::list(vec![
            serde_json::to_value(build_service(ID, &metadata(), &config())).unwrap(),
            serde_json::to_value(extra).unwrap(),
        ]);

        let (service, server) = scripted(vec![
            Exchange::delete(DEPLOYMENTS_PATH),
            Exchange::get(SERVICES_PATH).json(services),
            Exchange::delete(format!("{SERVICES_PATH}/web-service-0123abcd")),
            Exchange::delete(format!("{SERVICES_PATH}/web-extra")).fail(500),
        ]);

        service.delete(ID, "apps").await.unwrap();

        let calls = server.await.unwrap();
        assert_eq!(calls[0].label_selector(), Some(labels::id_selector(ID)));
        assert_eq!(calls.len(), 4);
    }

    #[tokio::test]
    async fn test_find_searches_all_namespaces() {
        let stored = serde_json::to_value(build_deployment(ID, &metadata(), &config())).unwrap();
        let (service, server) = scripted(vec![
            Exchange::get("/apis/apps/v1/deployments").json(mock::list(vec![stored])),
        ]);

        let found = service.find(ID).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ID);
        assert_eq!(found[0].metadata.namespace, "apps");

        let calls = server.await.unwrap();
        assert_eq!(calls[0].label_selector(), Some(labels::id_selector(ID)));
    }
}
