//! In-memory cluster backend
//!
//! Behaves like a minimal API server: objects live in per-kind maps keyed by
//! namespace and name, namespaced creates require the namespace to exist,
//! duplicates are rejected and deleting a namespace removes its contents.
//! Pods are synthesised from deployment replicas. Failures can be injected
//! per operation so the pipelines' partial-failure paths can be driven.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Pod, PodCondition, PodSpec, PodStatus, Secret, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::DynamicObject;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::api::{ClusterApi, ClusterConnector, ClusterError};
use super::connection::{ClusterAuth, ConnectionConfig};

/// Server URL the ambient (default) connection resolves to
pub const AMBIENT_SERVER: &str = "https://kubernetes.default.svc";

/// Version string reported by simulated control planes
pub const SIMULATED_VERSION: &str = "v1.30.0-sim";

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ServerVersion,
    /// Gets and lists without a dedicated variant
    Read,
    CreateNamespace,
    DeleteNamespace,
    CreateSecret,
    CreateConfigMap,
    CreateDeployment,
    PatchDeployment,
    DeleteDeployment,
    ListDeployments,
    CreateService,
    DeleteService,
    CreateMiddleware,
    CreateIngress,
    DeleteIngress,
    ListPods,
}

type Key = (String, String);

#[derive(Default)]
struct Store {
    namespaces: BTreeMap<String, Namespace>,
    secrets: BTreeMap<Key, Secret>,
    config_maps: BTreeMap<Key, ConfigMap>,
    deployments: BTreeMap<Key, Deployment>,
    services: BTreeMap<Key, Service>,
    middlewares: BTreeMap<Key, DynamicObject>,
    ingresses: BTreeMap<Key, Ingress>,
}

impl Store {
    fn require_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        if self.namespaces.contains_key(namespace) {
            Ok(())
        } else {
            Err(ClusterError::not_found("namespace", namespace))
        }
    }

    fn purge_namespace(&mut self, namespace: &str) {
        self.secrets.retain(|(ns, _), _| ns != namespace);
        self.config_maps.retain(|(ns, _), _| ns != namespace);
        self.deployments.retain(|(ns, _), _| ns != namespace);
        self.services.retain(|(ns, _), _| ns != namespace);
        self.middlewares.retain(|(ns, _), _| ns != namespace);
        self.ingresses.retain(|(ns, _), _| ns != namespace);
    }
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn stamp(meta: &mut ObjectMeta, namespace: Option<&str>, name: &str) {
    meta.name = Some(name.to_string());
    if let Some(ns) = namespace {
        meta.namespace = Some(ns.to_string());
    }
    meta.creation_timestamp = Some(Time(Utc::now()));
    meta.resource_version = Some("1".to_string());
}

fn object_name(meta: &ObjectMeta, kind: &'static str) -> Result<String, ClusterError> {
    meta.name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ClusterError::Api {
            code: 422,
            message: format!("{} metadata.name is required", kind),
        })
}

fn refresh_status(deployment: &mut Deployment) {
    let replicas = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    deployment.status = Some(DeploymentStatus {
        replicas: Some(replicas),
        ready_replicas: Some(replicas),
        available_replicas: Some(replicas),
        updated_replicas: Some(replicas),
        ..Default::default()
    });
}

/// Apply an RFC 7386 JSON merge patch to `target`
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(object) = target {
        for (name, value) in fields {
            if value.is_null() {
                object.remove(name);
            } else {
                merge_patch(object.entry(name.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// A simulated control plane
pub struct InMemoryCluster {
    server: String,
    store: RwLock<Store>,
    failures: RwLock<HashMap<Operation, ClusterError>>,
    reachable: AtomicBool,
}

impl InMemoryCluster {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            store: RwLock::new(Store::default()),
            failures: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Every subsequent call fails with `Unreachable` while false
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `operation` fail with `error` until cleared
    pub async fn fail_on(&self, operation: Operation, error: ClusterError) {
        self.failures.write().await.insert(operation, error);
    }

    pub async fn clear_failure(&self, operation: Operation) {
        self.failures.write().await.remove(&operation);
    }

    async fn check(&self, operation: Operation) -> Result<(), ClusterError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ClusterError::Unreachable(format!(
                "dial {}: connection refused",
                self.server
            )));
        }
        match self.failures.read().await.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn has_namespace(&self, name: &str) -> bool {
        self.store.read().await.namespaces.contains_key(name)
    }

    pub async fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.store.read().await.secrets.get(&key(namespace, name)).cloned()
    }

    pub async fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.store
            .read()
            .await
            .deployments
            .get(&key(namespace, name))
            .cloned()
    }

    pub async fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.store.read().await.services.get(&key(namespace, name)).cloned()
    }

    pub async fn middleware(&self, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.store
            .read()
            .await
            .middlewares
            .get(&key(namespace, name))
            .cloned()
    }

    pub async fn ingress(&self, namespace: &str, name: &str) -> Option<Ingress> {
        self.store
            .read()
            .await
            .ingresses
            .get(&key(namespace, name))
            .cloned()
    }

    fn synthesize_pods(namespace: &str, deployment: &Deployment) -> Vec<Pod> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        let spec = deployment.spec.as_ref();
        let replicas = spec.and_then(|s| s.replicas).unwrap_or(1).max(0);
        let template = spec.map(|s| s.template.clone()).unwrap_or_default();
        let started = deployment
            .metadata
            .creation_timestamp
            .clone()
            .unwrap_or_else(|| Time(Utc::now()));

        (0..replicas)
            .map(|i| Pod {
                metadata: ObjectMeta {
                    name: Some(format!("{}-{}", name, i)),
                    namespace: Some(namespace.to_string()),
                    labels: template.metadata.as_ref().and_then(|m| m.labels.clone()),
                    ..Default::default()
                },
                spec: Some(PodSpec {
                    restart_policy: Some("Always".to_string()),
                    ..template.spec.clone().unwrap_or_default()
                }),
                status: Some(PodStatus {
                    phase: Some("Running".to_string()),
                    start_time: Some(started.clone()),
                    conditions: Some(vec![PodCondition {
                        type_: "Ready".to_string(),
                        status: "True".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            })
            .collect()
    }

    async fn pods_in(&self, namespace: &str) -> Vec<Pod> {
        let store = self.store.read().await;
        store
            .deployments
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .flat_map(|(_, d)| Self::synthesize_pods(namespace, d))
            .collect()
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    fn server(&self) -> String {
        self.server.clone()
    }

    async fn server_version(&self) -> Result<String, ClusterError> {
        self.check(Operation::ServerVersion).await?;
        Ok(SIMULATED_VERSION.to_string())
    }

    // =========================================================================
    // Namespaces
    // =========================================================================

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError> {
        self.check(Operation::Read).await?;
        Ok(self.store.read().await.namespaces.get(name).cloned())
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        self.check(Operation::CreateNamespace).await?;
        let mut store = self.store.write().await;
        if store.namespaces.contains_key(name) {
            return Err(ClusterError::already_exists("namespace", name));
        }

        let mut namespace = Namespace::default();
        stamp(&mut namespace.metadata, None, name);
        store.namespaces.insert(name.to_string(), namespace.clone());

        // Every namespace carries the cluster CA bundle, as on a real API server
        let mut root_ca = ConfigMap::default();
        stamp(&mut root_ca.metadata, Some(name), "kube-root-ca.crt");
        store
            .config_maps
            .insert(key(name, "kube-root-ca.crt"), root_ca);

        debug!(server = %self.server, namespace = name, "created namespace");
        Ok(namespace)
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.check(Operation::DeleteNamespace).await?;
        let mut store = self.store.write().await;
        if store.namespaces.remove(name).is_none() {
            return Err(ClusterError::not_found("namespace", name));
        }
        store.purge_namespace(name);
        Ok(())
    }

    // =========================================================================
    // Secrets & ConfigMaps
    // =========================================================================

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ClusterError> {
        self.check(Operation::Read).await?;
        Ok(self.secret(namespace, name).await)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, ClusterError> {
        self.check(Operation::CreateSecret).await?;
        let name = object_name(&secret.metadata, "secret")?;
        let mut store = self.store.write().await;
        store.require_namespace(namespace)?;
        if store.secrets.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::already_exists("secret", name));
        }

        let mut created = secret.clone();
        stamp(&mut created.metadata, Some(namespace), &name);
        store.secrets.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>, ClusterError> {
        self.check(Operation::Read).await?;
        let store = self.store.read().await;
        Ok(store
            .secrets
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, ClusterError> {
        self.check(Operation::CreateConfigMap).await?;
        let name = object_name(&config_map.metadata, "configmap")?;
        let mut store = self.store.write().await;
        store.require_namespace(namespace)?;
        if store.config_maps.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::already_exists("configmap", name));
        }

        let mut created = config_map.clone();
        stamp(&mut created.metadata, Some(namespace), &name);
        store
            .config_maps
            .insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>, ClusterError> {
        self.check(Operation::Read).await?;
        let store = self.store.read().await;
        Ok(store
            .config_maps
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, c)| c.clone())
            .collect())
    }

    // =========================================================================
    // Deployments
    // =========================================================================

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        self.check(Operation::CreateDeployment).await?;
        let name = object_name(&deployment.metadata, "deployment")?;
        let mut store = self.store.write().await;
        store.require_namespace(namespace)?;
        if store.deployments.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::already_exists("deployment", name));
        }

        let mut created = deployment.clone();
        stamp(&mut created.metadata, Some(namespace), &name);
        refresh_status(&mut created);
        store
            .deployments
            .insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        self.check(Operation::Read).await?;
        self.deployment(namespace, name)
            .await
            .ok_or_else(|| ClusterError::not_found("deployment", name))
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        self.check(Operation::ListDeployments).await?;
        let store = self.store.read().await;
        Ok(store
            .deployments
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Deployment, ClusterError> {
        self.check(Operation::PatchDeployment).await?;
        let mut store = self.store.write().await;
        let current = store
            .deployments
            .get_mut(&key(namespace, name))
            .ok_or_else(|| ClusterError::not_found("deployment", name))?;

        let mut document =
            serde_json::to_value(&*current).map_err(|e| ClusterError::Request(e.to_string()))?;
        merge_patch(&mut document, patch);
        let mut patched: Deployment = serde_json::from_value(document).map_err(|e| {
            ClusterError::Api {
                code: 422,
                message: e.to_string(),
            }
        })?;
        refresh_status(&mut patched);
        *current = patched.clone();
        Ok(patched)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.check(Operation::DeleteDeployment).await?;
        let mut store = self.store.write().await;
        store
            .deployments
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found("deployment", name))
    }

    // =========================================================================
    // Services, Middlewares & Ingresses
    // =========================================================================

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, ClusterError> {
        self.check(Operation::CreateService).await?;
        let name = object_name(&service.metadata, "service")?;
        let mut store = self.store.write().await;
        store.require_namespace(namespace)?;
        if store.services.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::already_exists("service", name));
        }

        let mut created = service.clone();
        stamp(&mut created.metadata, Some(namespace), &name);
        store.services.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.check(Operation::DeleteService).await?;
        let mut store = self.store.write().await;
        store
            .services
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found("service", name))
    }

    async fn create_middleware(
        &self,
        namespace: &str,
        middleware: &DynamicObject,
    ) -> Result<(), ClusterError> {
        self.check(Operation::CreateMiddleware).await?;
        let name = object_name(&middleware.metadata, "middleware")?;
        let mut store = self.store.write().await;
        store.require_namespace(namespace)?;
        if store.middlewares.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::already_exists("middleware", name));
        }

        let mut created = middleware.clone();
        stamp(&mut created.metadata, Some(namespace), &name);
        store.middlewares.insert(key(namespace, &name), created);
        Ok(())
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, ClusterError> {
        self.check(Operation::CreateIngress).await?;
        let name = object_name(&ingress.metadata, "ingress")?;
        let mut store = self.store.write().await;
        store.require_namespace(namespace)?;
        if store.ingresses.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::already_exists("ingress", name));
        }

        let mut created = ingress.clone();
        stamp(&mut created.metadata, Some(namespace), &name);
        store.ingresses.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.check(Operation::DeleteIngress).await?;
        let mut store = self.store.write().await;
        store
            .ingresses
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found("ingress", name))
    }

    // =========================================================================
    // Pods
    // =========================================================================

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        self.check(Operation::ListPods).await?;
        Ok(self.pods_in(namespace).await)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        limit_bytes: i64,
    ) -> Result<String, ClusterError> {
        self.check(Operation::ListPods).await?;
        let pods = self.pods_in(namespace).await;
        let pod = pods
            .iter()
            .find(|p| p.metadata.name.as_deref() == Some(name))
            .ok_or_else(|| ClusterError::not_found("pod", name))?;

        let image = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.image.clone())
            .unwrap_or_default();
        let mut logs = String::new();
        for line in 0..64 {
            logs.push_str(&format!(
                "{} {} [{}] simulated log line {}\n",
                Utc::now().to_rfc3339(),
                name,
                image,
                line
            ));
        }

        let limit = usize::try_from(limit_bytes).unwrap_or(0);
        if logs.len() > limit {
            let mut cut = limit;
            while !logs.is_char_boundary(cut) {
                cut -= 1;
            }
            logs.truncate(cut);
        }
        Ok(logs)
    }
}

/// Hands out one [`InMemoryCluster`] per server URL
#[derive(Default, Clone)]
pub struct InMemoryConnector {
    clusters: Arc<DashMap<String, Arc<InMemoryCluster>>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the simulated cluster behind `server`
    pub fn cluster_for(&self, server: &str) -> Arc<InMemoryCluster> {
        self.clusters
            .entry(server.to_string())
            .or_insert_with(|| Arc::new(InMemoryCluster::new(server)))
            .value()
            .clone()
    }
}

#[async_trait]
impl ClusterConnector for InMemoryConnector {
    async fn connect(
        &self,
        connection: &ConnectionConfig,
    ) -> Result<Arc<dyn ClusterApi>, ClusterError> {
        let server = match &connection.auth {
            ClusterAuth::Ambient if connection.server.is_empty() => AMBIENT_SERVER,
            _ => connection.server.as_str(),
        };
        if let ClusterAuth::BearerToken { token, .. } = &connection.auth {
            if token.is_empty() {
                return Err(ClusterError::InvalidConfig("bearer token is empty".to_string()));
            }
        }
        let cluster: Arc<dyn ClusterApi> = self.cluster_for(server);
        Ok(cluster)
    }
}
