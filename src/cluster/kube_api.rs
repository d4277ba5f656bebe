//! `ClusterApi` over a live Kubernetes API server

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::AsyncReadExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, LogParams, Patch,
    PatchParams, PostParams,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use tracing::debug;

use super::api::{ClusterApi, ClusterConnector, ClusterError};
use super::connection::{ClusterAuth, ConnectionConfig};

/// Context name used for kubeconfigs synthesised from onboarding input
const CONTEXT_NAME: &str = "clusterdeck";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Traefik `Middleware` CRD
pub fn middleware_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("traefik.io", "v1alpha1", "Middleware"),
        "middlewares",
    )
}

/// Build a single-context kubeconfig for bearer-token access
pub fn bearer_kubeconfig(
    server: &str,
    ca_bundle: &[u8],
    token: &str,
) -> Result<Kubeconfig, ClusterError> {
    let document = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": CONTEXT_NAME,
            "cluster": {
                "server": server,
                "certificate-authority-data": STANDARD.encode(ca_bundle),
            }
        }],
        "users": [{
            "name": CONTEXT_NAME,
            "user": { "token": token }
        }],
        "contexts": [{
            "name": CONTEXT_NAME,
            "context": { "cluster": CONTEXT_NAME, "user": CONTEXT_NAME }
        }],
        "current-context": CONTEXT_NAME,
    });
    serde_json::from_value(document).map_err(|e| ClusterError::InvalidConfig(e.to_string()))
}

/// Connects to real clusters through kube-rs
#[derive(Debug, Default, Clone)]
pub struct KubeConnector;

impl KubeConnector {
    async fn client_config(connection: &ConnectionConfig) -> Result<Config, ClusterError> {
        let mut config = match &connection.auth {
            ClusterAuth::Ambient => Config::infer()
                .await
                .map_err(|e| ClusterError::InvalidConfig(e.to_string()))?,
            ClusterAuth::BearerToken { ca_bundle, token } => {
                let kubeconfig = bearer_kubeconfig(&connection.server, ca_bundle, token)?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ClusterError::InvalidConfig(e.to_string()))?
            }
        };
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);
        Ok(config)
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(
        &self,
        connection: &ConnectionConfig,
    ) -> Result<Arc<dyn ClusterApi>, ClusterError> {
        let config = Self::client_config(connection).await?;
        let server = config.cluster_url.to_string();
        let client =
            Client::try_from(config).map_err(|e| ClusterError::InvalidConfig(e.to_string()))?;
        debug!(server = %server, "built kubernetes client");
        Ok(Arc::new(KubeClusterApi::new(client, server)))
    }
}

/// One kube-rs client bound to one API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    server: String,
}

impl KubeClusterApi {
    pub fn new(client: Client, server: impl Into<String>) -> Self {
        Self {
            client,
            server: server.into(),
        }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    fn server(&self) -> String {
        self.server.clone()
    }

    async fn server_version(&self) -> Result<String, ClusterError> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| ClusterError::from_kube(e, "version", "/version"))?;
        Ok(info.git_version)
    }

    // =========================================================================
    // Namespaces
    // =========================================================================

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, "namespace", name))
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &namespace)
            .await
            .map_err(|e| ClusterError::from_kube(e, "namespace", name))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "namespace", name))
    }

    // =========================================================================
    // Secrets & ConfigMaps
    // =========================================================================

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ClusterError> {
        self.namespaced::<Secret>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, "secret", name))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, ClusterError> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.namespaced::<Secret>(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| ClusterError::from_kube(e, "secret", &name))
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>, ClusterError> {
        self.namespaced::<Secret>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::from_kube(e, "namespace", namespace))
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, ClusterError> {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.namespaced::<ConfigMap>(namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|e| ClusterError::from_kube(e, "configmap", &name))
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>, ClusterError> {
        self.namespaced::<ConfigMap>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::from_kube(e, "namespace", namespace))
    }

    // =========================================================================
    // Deployments
    // =========================================================================

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.namespaced::<Deployment>(namespace)
            .create(&PostParams::default(), deployment)
            .await
            .map_err(|e| ClusterError::from_kube(e, "deployment", &name))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        self.namespaced::<Deployment>(namespace)
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, "deployment", name))
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        self.namespaced::<Deployment>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::from_kube(e, "namespace", namespace))
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, ClusterError> {
        self.namespaced::<Deployment>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, "deployment", name))
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.namespaced::<Deployment>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "deployment", name))
    }

    // =========================================================================
    // Services, Middlewares & Ingresses
    // =========================================================================

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, ClusterError> {
        let name = service.metadata.name.clone().unwrap_or_default();
        self.namespaced::<Service>(namespace)
            .create(&PostParams::default(), service)
            .await
            .map_err(|e| ClusterError::from_kube(e, "service", &name))
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.namespaced::<Service>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "service", name))
    }

    async fn create_middleware(
        &self,
        namespace: &str,
        middleware: &DynamicObject,
    ) -> Result<(), ClusterError> {
        let name = middleware.metadata.name.clone().unwrap_or_default();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &middleware_resource());
        api.create(&PostParams::default(), middleware)
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "middleware", &name))
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, ClusterError> {
        let name = ingress.metadata.name.clone().unwrap_or_default();
        self.namespaced::<Ingress>(namespace)
            .create(&PostParams::default(), ingress)
            .await
            .map_err(|e| ClusterError::from_kube(e, "ingress", &name))
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.namespaced::<Ingress>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "ingress", name))
    }

    // =========================================================================
    // Pods
    // =========================================================================

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        self.namespaced::<Pod>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::from_kube(e, "namespace", namespace))
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        limit_bytes: i64,
    ) -> Result<String, ClusterError> {
        let params = LogParams {
            limit_bytes: Some(limit_bytes),
            ..Default::default()
        };
        let stream = self
            .namespaced::<Pod>(namespace)
            .log_stream(name, &params)
            .await
            .map_err(|e| ClusterError::from_kube(e, "pod", name))?;

        let mut bytes = Vec::new();
        pin!(stream)
            .take(u64::try_from(limit_bytes).unwrap_or(0))
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| ClusterError::Request(format!("reading logs of pod {}: {}", name, e)))?;
        Ok(decode_log_bytes(bytes))
    }
}

/// Decode byte-limited log output. A multi-byte character cut off at the end
/// is dropped and any other invalid sequence becomes U+FFFD.
fn decode_log_bytes(mut bytes: Vec<u8>) -> String {
    let tail = bytes.len().saturating_sub(4);
    if let Some(offset) = bytes[tail..].iter().rposition(|b| b & 0xC0 != 0x80) {
        let start = tail + offset;
        let width = match bytes[start] {
            b if b >= 0xF0 => 4,
            b if b >= 0xE0 => 3,
            b if b >= 0xC0 => 2,
            _ => 1,
        };
        if start + width > bytes.len() {
            bytes.truncate(start);
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::http::{Request, Response};
    use kube::client::Body;

    use super::*;

    #[test]
    fn test_bearer_kubeconfig_single_context() {
        let kubeconfig =
            bearer_kubeconfig("https://10.0.0.1:6443", b"-----BEGIN CERTIFICATE-----", "tok")
                .unwrap();

        assert_eq!(kubeconfig.current_context.as_deref(), Some(CONTEXT_NAME));
        assert_eq!(kubeconfig.clusters.len(), 1);
        assert_eq!(kubeconfig.auth_infos.len(), 1);
        assert_eq!(kubeconfig.contexts.len(), 1);
    }

    fn log_client(body: Vec<u8>) -> KubeClusterApi {
        let service = tower::service_fn(move |request: Request<Body>| {
            let body = body.clone();
            async move {
                assert_eq!(request.uri().path(), "/api/v1/namespaces/ns1/pods/web-0/log");
                Ok::<_, Infallible>(Response::new(Body::from(body)))
            }
        });
        KubeClusterApi::new(Client::new(service, "default"), "https://logs.test:6443")
    }

    #[tokio::test]
    async fn test_pod_logs_cut_inside_character() {
        let mut body = vec![b'a'; 1999];
        body.push("€".as_bytes()[0]);

        let logs = log_client(body).pod_logs("ns1", "web-0", 2000).await.unwrap();
        assert_eq!(logs, "a".repeat(1999));
    }

    #[tokio::test]
    async fn test_pod_logs_capped_and_lossy() {
        let mut body = b"boot \xff ok\n".to_vec();
        body.extend(std::iter::repeat(b'x').take(3000));

        let logs = log_client(body).pod_logs("ns1", "web-0", 2000).await.unwrap();
        assert!(logs.starts_with("boot \u{FFFD} ok\n"));
        assert!(logs.len() <= 2002);
        assert!(logs.ends_with('x'));
    }

    #[test]
    fn test_decode_log_bytes_keeps_complete_characters() {
        assert_eq!(decode_log_bytes("tail €".as_bytes().to_vec()), "tail €");
        assert_eq!(decode_log_bytes(b"\xe2\x82".to_vec()), "");
        assert_eq!(decode_log_bytes(Vec::new()), "");
    }

    #[test]
    fn test_middleware_resource() {
        let resource = middleware_resource();
        assert_eq!(resource.api_version, "traefik.io/v1alpha1");
        assert_eq!(resource.plural, "middlewares");
        assert_eq!(resource.kind, "Middleware");
    }
}
