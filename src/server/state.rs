use std::sync::Arc;

use crate::cluster::{ClusterEntry, ClusterRegistry, DomainConfig};
use crate::server::auth::AuthToken;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClusterRegistry>,
    /// Used for clusters onboarded without their own domain
    pub default_domain: Arc<DomainConfig>,
    pub auth: Arc<AuthToken>,
}

impl AppState {
    pub fn new(registry: ClusterRegistry, default_domain: DomainConfig, auth: AuthToken) -> Self {
        Self {
            registry: Arc::new(registry),
            default_domain: Arc::new(default_domain),
            auth: Arc::new(auth),
        }
    }

    /// Domain and TLS pair that ingresses on `cluster` are published under
    pub fn domain_for<'a>(&'a self, cluster: &'a ClusterEntry) -> &'a DomainConfig {
        cluster.domain_or(&self.default_domain)
    }
}
