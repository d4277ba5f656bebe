//! Control-plane client seam
//!
//! Every call the registry and the pipelines make against a downstream cluster
//! goes through [`ClusterApi`]. The production implementation wraps a
//! `kube::Client` ([`super::kube_api::KubeClusterApi`]); the in-memory one
//! ([`super::memory::InMemoryCluster`]) backs simulation mode and tests.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use thiserror::Error;

use super::connection::ConnectionConfig;

/// Errors returned by control-plane calls
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("control plane returned {code}: {message}")]
    Api { code: u16, message: String },

    #[error("control plane unreachable: {0}")]
    Unreachable(String),

    #[error("request to control plane failed: {0}")]
    Request(String),

    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),
}

impl ClusterError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify a kube error for an operation on `kind`/`name`
    pub fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(ae) if ae.code == 409 => Self::already_exists(kind, name),
            kube::Error::Api(ae) => Self::Api {
                code: ae.code,
                message: ae.message,
            },
            kube::Error::HyperError(e) => Self::Unreachable(e.to_string()),
            kube::Error::Service(e) => Self::Unreachable(e.to_string()),
            other => Self::Request(other.to_string()),
        }
    }
}

/// Operations the orchestrator performs against one cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Base URL of the control plane this handle talks to
    fn server(&self) -> String;

    /// Git version reported by the control plane's version endpoint
    async fn server_version(&self) -> Result<String, ClusterError>;

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError>;
    async fn create_namespace(&self, name: &str) -> Result<Namespace, ClusterError>;
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    async fn get_secret(&self, namespace: &str, name: &str)
        -> Result<Option<Secret>, ClusterError>;
    async fn create_secret(&self, namespace: &str, secret: &Secret)
        -> Result<Secret, ClusterError>;
    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>, ClusterError>;

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, ClusterError>;
    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>, ClusterError>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError>;
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Deployment, ClusterError>;
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError>;
    /// JSON merge patch (RFC 7386)
    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, ClusterError>;
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn create_service(&self, namespace: &str, service: &Service)
        -> Result<Service, ClusterError>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// Create a Traefik `Middleware` custom resource
    async fn create_middleware(
        &self,
        namespace: &str,
        middleware: &DynamicObject,
    ) -> Result<(), ClusterError>;

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress)
        -> Result<Ingress, ClusterError>;
    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError>;
    /// Log output of a pod, truncated to `limit_bytes`
    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        limit_bytes: i64,
    ) -> Result<String, ClusterError>;
}

/// Builds [`ClusterApi`] handles from connection settings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(
        &self,
        connection: &ConnectionConfig,
    ) -> Result<Arc<dyn ClusterApi>, ClusterError>;
}
