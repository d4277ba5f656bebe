//! Raw connection settings for a downstream cluster

use std::fmt;

/// How requests to a cluster are authenticated
#[derive(Clone, PartialEq, Eq)]
pub enum ClusterAuth {
    /// In-cluster service account or the local kubeconfig
    Ambient,
    /// Service-account bearer token verified against an explicit CA bundle
    BearerToken {
        /// PEM-encoded CA certificates
        ca_bundle: Vec<u8>,
        token: String,
    },
}

impl fmt::Debug for ClusterAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterAuth::Ambient => f.write_str("Ambient"),
            ClusterAuth::BearerToken { ca_bundle, .. } => f
                .debug_struct("BearerToken")
                .field("ca_bundle", &format_args!("{} bytes", ca_bundle.len()))
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Server address plus credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// API server URL; empty for ambient connections until resolved
    pub server: String,
    pub auth: ClusterAuth,
}

impl ConnectionConfig {
    pub fn ambient() -> Self {
        Self {
            server: String::new(),
            auth: ClusterAuth::Ambient,
        }
    }

    pub fn bearer(server: impl Into<String>, ca_bundle: Vec<u8>, token: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            auth: ClusterAuth::BearerToken {
                ca_bundle,
                token: token.into(),
            },
        }
    }
}
