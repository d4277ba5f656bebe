//! Cluster registry
//!
//! Owns the set of reachable downstream clusters. The default cluster is
//! connected at startup and kept apart from onboarded ones; onboarded clusters
//! are validated and probed before they are stored and are never mutated
//! afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::api::{ClusterApi, ClusterConnector, ClusterError};
use super::certs::normalize_ca_pem;
use super::connection::{ClusterAuth, ConnectionConfig};
use super::domain::DomainConfig;
use crate::encoding::base64_opt;
use crate::error::{Error, Result};

/// Upper bound for a `/version` probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const CLUSTER_NAME_PATTERN: &str = r"^[a-zA-Z0-9._-]{1,80}$";

/// A cluster the orchestrator can talk to
pub struct ClusterEntry {
    pub name: String,
    pub api: Arc<dyn ClusterApi>,
    pub connection: ConnectionConfig,
    pub domain: Option<DomainConfig>,
    pub default_namespace: Option<String>,
}

impl fmt::Debug for ClusterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterEntry")
            .field("name", &self.name)
            .field("server", &self.api.server())
            .field("connection", &self.connection)
            .field("domain", &self.domain)
            .finish()
    }
}

impl ClusterEntry {
    /// The cluster's own domain, or `fallback` when it has none
    pub fn domain_or<'a>(&'a self, fallback: &'a DomainConfig) -> &'a DomainConfig {
        self.domain.as_ref().unwrap_or(fallback)
    }
}

/// Body of `POST /clusters`
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardRequest {
    pub name: String,
    pub server: String,
    /// PEM, or base64 of PEM
    #[serde(rename = "caPEM")]
    pub ca_pem: String,
    pub bearer_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub private_key: Option<Vec<u8>>,
}

impl fmt::Debug for OnboardRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnboardRequest")
            .field("name", &self.name)
            .field("server", &self.server)
            .field("ca_pem", &format_args!("{} bytes", self.ca_pem.len()))
            .field("bearer_token", &"<redacted>")
            .field("default_namespace", &self.default_namespace)
            .field("domain", &self.domain)
            .finish()
    }
}

/// Cluster summary returned by onboarding, listing and inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub name: String,
    pub server: String,
    pub k8s_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_namespace: Option<String>,
}

/// Onboarding input after validation
struct ValidatedOnboarding {
    connection: ConnectionConfig,
    domain: Option<DomainConfig>,
}

impl ValidatedOnboarding {
    fn ca_len(&self) -> usize {
        match &self.connection.auth {
            ClusterAuth::BearerToken { ca_bundle, .. } => ca_bundle.len(),
            ClusterAuth::Ambient => 0,
        }
    }
}

/// `true` when `name` is an acceptable cluster name
pub fn is_valid_cluster_name(name: &str) -> bool {
    Regex::new(CLUSTER_NAME_PATTERN)
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

// ============================================================================
// SBIO: pure validation, no I/O
// ============================================================================

fn validate_onboarding(request: &OnboardRequest) -> Result<ValidatedOnboarding> {
    if !is_valid_cluster_name(&request.name) {
        return Err(Error::Validation("invalid name".to_string()));
    }
    if !request.server.starts_with("https://") {
        return Err(Error::Validation(
            "server must start with https://".to_string(),
        ));
    }
    if request.ca_pem.trim().is_empty() || request.bearer_token.is_empty() {
        return Err(Error::Validation(
            "caPEM and bearerToken are required".to_string(),
        ));
    }

    let ca_bundle = normalize_ca_pem(&request.ca_pem)
        .map_err(|e| Error::Validation(format!("invalid caPEM: {}", e)))?;

    let domain = DomainConfig::from_parts(
        request.domain.as_deref(),
        request.certificate.as_deref(),
        request.private_key.as_deref(),
    )
    .map_err(|e| Error::Validation(e.to_string()))?;

    Ok(ValidatedOnboarding {
        connection: ConnectionConfig::bearer(&request.server, ca_bundle, &request.bearer_token),
        domain,
    })
}

async fn probe(api: &dyn ClusterApi, timeout: Duration) -> std::result::Result<String, String> {
    match tokio::time::timeout(timeout, api.server_version()).await {
        Ok(Ok(version)) => Ok(version),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no response within {}s", timeout.as_secs())),
    }
}

/// Registry of the default cluster plus every onboarded cluster
pub struct ClusterRegistry {
    default: Arc<ClusterEntry>,
    onboarded: RwLock<HashMap<String, Arc<ClusterEntry>>>,
    connector: Arc<dyn ClusterConnector>,
    probe_timeout: Duration,
}

impl ClusterRegistry {
    /// Connect the default cluster through ambient credentials.
    ///
    /// The default cluster is not probed here; readiness reports on it.
    pub async fn bootstrap(
        default_name: impl Into<String>,
        connector: Arc<dyn ClusterConnector>,
    ) -> std::result::Result<Self, ClusterError> {
        let default_name = default_name.into();
        let mut connection = ConnectionConfig::ambient();
        let api = connector.connect(&connection).await?;
        connection.server = api.server();
        info!(cluster = %default_name, server = %connection.server, "default cluster configured");

        let default = Arc::new(ClusterEntry {
            name: default_name,
            api,
            connection,
            domain: None,
            default_namespace: None,
        });
        Ok(Self::with_default(default, connector))
    }

    /// Build around an already connected default cluster
    pub fn with_default(default: Arc<ClusterEntry>, connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            default,
            onboarded: RwLock::new(HashMap::new()),
            connector,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn default_cluster(&self) -> Arc<ClusterEntry> {
        Arc::clone(&self.default)
    }

    pub fn default_name(&self) -> &str {
        &self.default.name
    }

    /// Resolve the `cluster-name` selector; absent or empty means the default
    pub async fn resolve(&self, name: Option<&str>) -> Result<Arc<ClusterEntry>> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(self.default_cluster()),
            Some(n) if n == self.default.name => Ok(self.default_cluster()),
            Some(n) => self
                .onboarded
                .read()
                .await
                .get(n)
                .cloned()
                .ok_or_else(|| Error::UnknownCluster(n.to_string())),
        }
    }

    async fn contains(&self, name: &str) -> bool {
        name == self.default.name || self.onboarded.read().await.contains_key(name)
    }

    /// Validate, connect, probe and store a new cluster
    pub async fn onboard(&self, request: OnboardRequest) -> Result<ClusterInfo> {
        let validated = validate_onboarding(&request)?;
        debug!(
            cluster = %request.name,
            server = %request.server,
            ca_bytes = validated.ca_len(),
            domain = ?validated.domain.as_ref().map(|d| d.domain.as_str()),
            "onboarding request validated"
        );

        if self.contains(&request.name).await {
            return Err(Error::Conflict(
                "cluster with this name already exists".to_string(),
            ));
        }

        let api = self
            .connector
            .connect(&validated.connection)
            .await
            .map_err(|e| Error::Internal(format!("failed to build client: {}", e)))?;

        let version = probe(api.as_ref(), self.probe_timeout)
            .await
            .map_err(Error::UpstreamUnreachable)?;

        let entry = Arc::new(ClusterEntry {
            name: request.name.clone(),
            api,
            connection: validated.connection,
            domain: validated.domain,
            default_namespace: request.default_namespace.clone(),
        });

        {
            let mut onboarded = self.onboarded.write().await;
            if request.name == self.default.name || onboarded.contains_key(&request.name) {
                return Err(Error::Conflict(
                    "cluster with this name already exists".to_string(),
                ));
            }
            onboarded.insert(request.name.clone(), entry);
        }

        info!(cluster = %request.name, server = %request.server, version = %version, "cluster onboarded");
        Ok(ClusterInfo {
            name: request.name,
            server: request.server,
            k8s_version: version,
            default_namespace: request.default_namespace.filter(|ns| !ns.is_empty()),
        })
    }

    /// Reachable onboarded clusters, sorted by name; the default is excluded
    pub async fn list(&self) -> Vec<ClusterInfo> {
        let entries: Vec<Arc<ClusterEntry>> =
            self.onboarded.read().await.values().cloned().collect();

        let probes = entries.iter().map(|entry| async move {
            match probe(entry.api.as_ref(), self.probe_timeout).await {
                Ok(version) => Some(ClusterInfo {
                    name: entry.name.clone(),
                    server: entry.connection.server.clone(),
                    k8s_version: version,
                    default_namespace: None,
                }),
                Err(e) => {
                    warn!(cluster = %entry.name, error = %e, "skipping unreachable cluster");
                    None
                }
            }
        });

        let mut clusters: Vec<ClusterInfo> = join_all(probes).await.into_iter().flatten().collect();
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        clusters
    }

    /// Probe one cluster, the default included
    pub async fn inspect(&self, name: &str) -> Result<ClusterInfo> {
        let entry = if name == self.default.name {
            self.default_cluster()
        } else {
            self.onboarded
                .read()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| Error::NotFound("cluster not found".to_string()))?
        };

        let version = probe(entry.api.as_ref(), self.probe_timeout)
            .await
            .map_err(|e| Error::UpstreamUnreachable(format!("failed to get server version: {}", e)))?;

        Ok(ClusterInfo {
            name: entry.name.clone(),
            server: entry.api.server(),
            k8s_version: version,
            default_namespace: None,
        })
    }

    /// Probe the default cluster for readiness
    pub async fn probe_default(&self) -> std::result::Result<String, String> {
        probe(self.default.api.as_ref(), self.probe_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::api::{MockClusterApi, MockClusterConnector};
    use crate::cluster::memory::{InMemoryConnector, Operation, SIMULATED_VERSION};
    use axum::http::StatusCode;

    fn ca_pem() -> String {
        rcgen::generate_simple_self_signed(vec!["kubernetes".to_string()])
            .unwrap()
            .cert
            .pem()
    }

    fn request(name: &str, server: &str) -> OnboardRequest {
        OnboardRequest {
            name: name.to_string(),
            server: server.to_string(),
            ca_pem: ca_pem(),
            bearer_token: "sa-token".to_string(),
            ..Default::default()
        }
    }

    async fn memory_registry() -> (ClusterRegistry, InMemoryConnector) {
        let connector = InMemoryConnector::new();
        let registry = ClusterRegistry::bootstrap("default", Arc::new(connector.clone()))
            .await
            .unwrap();
        (registry, connector)
    }

    #[tokio::test]
    async fn test_onboard_returns_probed_version() {
        let (registry, _) = memory_registry().await;
        let mut req = request("prod", "https://prod.example:6443");
        req.default_namespace = Some("apps".to_string());

        let info = registry.onboard(req).await.unwrap();
        assert_eq!(info.name, "prod");
        assert_eq!(info.server, "https://prod.example:6443");
        assert_eq!(info.k8s_version, SIMULATED_VERSION);
        assert_eq!(info.default_namespace.as_deref(), Some("apps"));

        let entry = registry.resolve(Some("prod")).await.unwrap();
        assert_eq!(entry.api.server(), "https://prod.example:6443");
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (registry, _) = memory_registry().await;
        registry
            .onboard(request("prod", "https://a:6443"))
            .await
            .unwrap();

        let err = registry
            .onboard(request("prod", "https://b:6443"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = registry
            .onboard(request("default", "https://c:6443"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    /// Holds each `connect` until two onboardings have reached it
    struct LockstepConnector {
        inner: InMemoryConnector,
        barrier: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl ClusterConnector for LockstepConnector {
        async fn connect(
            &self,
            connection: &ConnectionConfig,
        ) -> std::result::Result<Arc<dyn ClusterApi>, ClusterError> {
            self.barrier.wait().await;
            self.inner.connect(connection).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_onboarding_same_name() {
        let (bootstrap, connector) = memory_registry().await;
        let lockstep = LockstepConnector {
            inner: connector,
            barrier: tokio::sync::Barrier::new(2),
        };
        let registry = ClusterRegistry::with_default(bootstrap.default_cluster(), Arc::new(lockstep));

        let (first, second) = tokio::join!(
            registry.onboard(request("prod", "https://a:6443")),
            registry.onboard(request("prod", "https://b:6443")),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(Error::Conflict(_))))
            .count();
        assert_eq!(conflicts, 1);
        assert_eq!(registry.onboarded.read().await.len(), 1);
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_never_connects() {
        let mut connector = MockClusterConnector::new();
        connector.expect_connect().times(0);
        let default = Arc::new(ClusterEntry {
            name: "default".to_string(),
            api: Arc::new(MockClusterApi::new()),
            connection: ConnectionConfig::ambient(),
            domain: None,
            default_namespace: None,
        });
        let registry = ClusterRegistry::with_default(default, Arc::new(connector));

        let cases = [
            request("bad name!", "https://x:6443"),
            request("ok", "http://x"),
            OnboardRequest {
                ca_pem: "not-a-cert".to_string(),
                ..request("ok", "https://x:6443")
            },
            OnboardRequest {
                bearer_token: String::new(),
                ..request("ok", "https://x:6443")
            },
            OnboardRequest {
                domain: Some("apps.example.com".to_string()),
                ..request("ok", "https://x:6443")
            },
        ];

        for case in cases {
            let err = registry.onboard(case).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "got {:?}", err);
        }
        assert!(registry.list().await.is_empty());
        assert!(registry.resolve(Some("ok")).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_cluster_not_stored() {
        let (registry, connector) = memory_registry().await;
        connector
            .cluster_for("https://down:6443")
            .set_reachable(false);

        let err = registry
            .onboard(request("down", "https://down:6443"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(matches!(
            registry.resolve(Some("down")).await,
            Err(Error::UnknownCluster(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_defaults() {
        let (registry, _) = memory_registry().await;
        let default = registry.resolve(None).await.unwrap();
        assert_eq!(default.name, "default");
        assert_eq!(registry.resolve(Some("")).await.unwrap().name, "default");
        assert_eq!(
            registry.resolve(Some("default")).await.unwrap().name,
            "default"
        );
        assert!(matches!(
            registry.resolve(Some("ghost")).await,
            Err(Error::UnknownCluster(n)) if n == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_list_skips_unreachable_and_sorts() {
        let (registry, connector) = memory_registry().await;
        for (name, server) in [
            ("zeta", "https://z:6443"),
            ("alpha", "https://a:6443"),
            ("mid", "https://m:6443"),
        ] {
            registry.onboard(request(name, server)).await.unwrap();
        }
        connector
            .cluster_for("https://m:6443")
            .fail_on(
                Operation::ServerVersion,
                ClusterError::Unreachable("down".into()),
            )
            .await;

        let names: Vec<String> = registry.list().await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_inspect() {
        let (registry, connector) = memory_registry().await;
        registry
            .onboard(request("prod", "https://prod:6443"))
            .await
            .unwrap();

        let info = registry.inspect("default").await.unwrap();
        assert_eq!(info.name, "default");

        assert_eq!(
            registry.inspect("ghost").await.unwrap_err().status_code(),
            StatusCode::NOT_FOUND
        );

        connector.cluster_for("https://prod:6443").set_reachable(false);
        assert_eq!(
            registry.inspect("prod").await.unwrap_err().status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
