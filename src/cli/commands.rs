//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::path::Path;

use k8s_openapi::api::apps::v1::Deployment;
use reqwest::{Method, RequestBuilder, Response, Url};
use thiserror::Error;

use crate::cluster::{ClusterInfo, OnboardRequest, CLUSTER_HEADER};
use crate::context::{self, Config, Context, ContextError};
use crate::server::handlers::pods::PodList;
use crate::workload::WorkloadRequest;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },
}

pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Context Commands (Pure business logic)
// ============================================================================

/// Info about a context for display
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub name: String,
    pub url: String,
    pub cluster: Option<String>,
    pub is_current: bool,
}

pub fn context_list(config: &Config) -> Vec<ContextInfo> {
    let current = config.current_name();
    context::list_contexts(config)
        .into_iter()
        .filter_map(|name| {
            let ctx = match name {
                context::LOCAL_CONTEXT => {
                    let mut local = config.clone();
                    local.current_context = None;
                    local.current().ok()?
                }
                name => config.contexts.get(name)?.clone(),
            };
            Some(ContextInfo {
                is_current: ctx.name == current,
                name: ctx.name,
                url: ctx.url,
                cluster: ctx.cluster,
            })
        })
        .collect()
}

pub fn context_current(config: &Config) -> CommandResult<Context> {
    Ok(config.current()?)
}

pub fn context_use(config: &mut Config, name: &str) -> CommandResult<()> {
    context::set_current_context(config, name)?;
    Ok(())
}

pub fn context_add(
    config: &mut Config,
    name: &str,
    url: &str,
    token: Option<&str>,
    cluster: Option<&str>,
) -> CommandResult<()> {
    let mut ctx = Context::new(name, url.trim_end_matches('/'));
    if let Some(token) = token {
        ctx = ctx.with_token(token);
    }
    if let Some(cluster) = cluster {
        ctx = ctx.with_cluster(cluster);
    }
    context::add_context(config, ctx)?;
    Ok(())
}

pub fn context_delete(config: &mut Config, name: &str) -> CommandResult<Context> {
    Ok(context::remove_context(config, name)?)
}

// ============================================================================
// Manifest loading
// ============================================================================

/// Parse a workload manifest; `.yaml`/`.yml` as YAML, anything else as JSON
pub fn parse_workload_manifest(path: &Path, content: &str) -> CommandResult<WorkloadRequest> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(content).map_err(|e| CommandError::Manifest(e.to_string()))
        }
        _ => Ok(serde_json::from_str(content)?),
    }
}

pub fn load_workload_manifest(path: &Path) -> CommandResult<WorkloadRequest> {
    let content = std::fs::read_to_string(path)?;
    parse_workload_manifest(path, &content)
}

/// Build an onboarding body from PEM files on disk
pub fn load_onboard_request(args: &super::OnboardArgs) -> CommandResult<OnboardRequest> {
    let read_opt = |path: &Option<std::path::PathBuf>| -> CommandResult<Option<Vec<u8>>> {
        path.as_deref().map(std::fs::read).transpose().map_err(Into::into)
    };
    Ok(OnboardRequest {
        name: args.name.clone(),
        server: args.server.clone(),
        ca_pem: std::fs::read_to_string(&args.ca_file)?,
        bearer_token: args.bearer_token.clone(),
        default_namespace: args.default_namespace.clone(),
        domain: args.domain.clone(),
        certificate: read_opt(&args.certificate_file)?,
        private_key: read_opt(&args.private_key_file)?,
    })
}

// ============================================================================
// HTTP Client for the clusterdeck API
// ============================================================================

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cluster: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: None,
            cluster: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Client for the current context; `cluster` overrides the context's own
    pub fn from_context(config: &Config, cluster: Option<&str>) -> CommandResult<Self> {
        let ctx = config.current()?;
        let mut client = Self::new(ctx.url);
        if let Some(token) = ctx.token {
            client = client.with_token(token);
        }
        if let Some(cluster) = cluster.map(str::to_string).or(ctx.cluster) {
            client = client.with_cluster(cluster);
        }
        Ok(client)
    }

    /// Join `segments` onto the base URL, percent-encoding each one
    fn url(&self, segments: &[&str]) -> CommandResult<Url> {
        let invalid = |reason: String| CommandError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn build_request(&self, method: Method, segments: &[&str]) -> CommandResult<RequestBuilder> {
        let mut req = self.client.request(method, self.url(segments)?);
        if let Some(ref token) = self.token {
            req = req.header(reqwest::header::AUTHORIZATION, token);
        }
        if let Some(ref cluster) = self.cluster {
            req = req.header(CLUSTER_HEADER, cluster);
        }
        Ok(req)
    }

    /// Pass 2xx responses through; otherwise surface the plain-text error body
    async fn check(resp: Response) -> CommandResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(CommandError::Server {
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }

    async fn send(&self, req: RequestBuilder) -> CommandResult<Response> {
        Self::check(req.send().await?).await
    }

    pub async fn list_clusters(&self) -> CommandResult<Vec<ClusterInfo>> {
        let resp = self.send(self.build_request(Method::GET, &["clusters"])?).await?;
        Ok(resp.json().await?)
    }

    pub async fn get_cluster(&self, name: &str) -> CommandResult<ClusterInfo> {
        let resp = self
            .send(self.build_request(Method::GET, &["clusters", name])?)
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn onboard_cluster(&self, request: &OnboardRequest) -> CommandResult<ClusterInfo> {
        let req = self.build_request(Method::POST, &["clusters"])?.json(request);
        Ok(self.send(req).await?.json().await?)
    }

    pub async fn deploy(&self, workload: &WorkloadRequest) -> CommandResult<Deployment> {
        let req = self.build_request(Method::POST, &["deployments"])?.json(workload);
        Ok(self.send(req).await?.json().await?)
    }

    pub async fn delete_workload(&self, namespace: &str, name: &str) -> CommandResult<()> {
        self.send(self.build_request(Method::DELETE, &["deployments", namespace, name])?)
            .await?;
        Ok(())
    }

    pub async fn scale(&self, namespace: &str, name: &str, replicas: i32) -> CommandResult<()> {
        let req = self
            .build_request(Method::PUT, &["deployments", namespace, name])?
            .json(&serde_json::json!({ "replicas": replicas }));
        self.send(req).await?;
        Ok(())
    }

    pub async fn restart(&self, namespace: &str, name: &str) -> CommandResult<String> {
        let segments = ["deployments", namespace, name, "restart"];
        let resp = self.send(self.build_request(Method::POST, &segments)?).await?;
        Ok(resp.text().await?)
    }

    pub async fn list_pods(&self, namespace: &str) -> CommandResult<PodList> {
        let resp = self
            .send(self.build_request(Method::GET, &["pods", namespace])?)
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn pod_logs(&self, namespace: &str, pod: &str) -> CommandResult<String> {
        let resp = self
            .send(self.build_request(Method::GET, &["pods", namespace, pod, "logs"])?)
            .await?;
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_context_list() {
        let config = Config::default();
        let contexts = context_list(&config);

        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name, "local");
        assert!(contexts[0].is_current);
    }

    #[test]
    fn test_context_add_and_use() {
        let mut config = Config::default();
        context_add(&mut config, "prod", "https://deck.example.com/", Some("t"), Some("edge"))
            .unwrap();
        context_use(&mut config, "prod").unwrap();

        let current = context_current(&config).unwrap();
        assert_eq!(current.name, "prod");
        assert_eq!(current.url, "https://deck.example.com");

        let contexts = context_list(&config);
        let prod = contexts.iter().find(|c| c.name == "prod").unwrap();
        assert!(prod.is_current);
        assert_eq!(prod.cluster.as_deref(), Some("edge"));
        assert!(!contexts.iter().find(|c| c.name == "local").unwrap().is_current);
    }

    #[test]
    fn test_context_delete() {
        let mut config = Config::default();
        context_add(&mut config, "test", "http://localhost:8080", None, None).unwrap();

        let removed = context_delete(&mut config, "test").unwrap();
        assert_eq!(removed.name, "test");
        assert!(context_delete(&mut config, "test").is_err());
    }

    #[test]
    fn test_parse_yaml_manifest() {
        let yaml = r#"
deploymentName: web
namespace: shop
image: nginx:1.27
replicas: 2
ports:
  - containerPort: 80
"#;
        let workload = parse_workload_manifest(&PathBuf::from("web.yaml"), yaml).unwrap();
        assert_eq!(workload.deployment_name, "web");
        assert_eq!(workload.replicas, 2);
        assert_eq!(workload.namespace, "shop");
        assert_eq!(workload.ports.len(), 1);
    }

    #[test]
    fn test_parse_json_manifest_error() {
        let result = parse_workload_manifest(&PathBuf::from("web.json"), "{not json");
        assert!(matches!(result, Err(CommandError::Json(_))));
    }

    #[test]
    fn test_missing_manifest_file() {
        let result = load_workload_manifest(&PathBuf::from("/nonexistent/web.yaml"));
        assert!(matches!(result, Err(CommandError::Io(_))));
    }

    #[test]
    fn test_client_prefers_flag_cluster() {
        let mut config = Config::default();
        context_add(&mut config, "prod", "https://deck", Some("t"), Some("edge")).unwrap();
        context_use(&mut config, "prod").unwrap();

        let client = ApiClient::from_context(&config, Some("core")).unwrap();
        assert_eq!(client.cluster.as_deref(), Some("core"));
        assert_eq!(client.token.as_deref(), Some("t"));

        let client = ApiClient::from_context(&config, None).unwrap();
        assert_eq!(client.cluster.as_deref(), Some("edge"));
    }

    #[test]
    fn test_url_encodes_each_segment() {
        let client = ApiClient::new("http://127.0.0.1:8080");
        let url = client.url(&["pods", "shop", "web/0 a", "logs"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/pods/shop/web%2F0%20a/logs");
        assert_eq!(url.path_segments().unwrap().count(), 4);

        let prefixed = ApiClient::new("https://deck.example/api/");
        let url = prefixed.url(&["clusters", "edge?x=1"]).unwrap();
        assert_eq!(url.as_str(), "https://deck.example/api/clusters/edge%3Fx=1");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_url_rejects_unusable_base() {
        assert!(matches!(
            ApiClient::new("not a url").url(&["clusters"]),
            Err(CommandError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ApiClient::new("mailto:ops@example.com").url(&["clusters"]),
            Err(CommandError::InvalidUrl { .. })
        ));
    }
}
