//! Shared response envelopes

use serde::{Deserialize, Serialize};

/// Response for listing resources, shaped like a Kubernetes list object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceList<T> {
    /// API version
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Kind (e.g., "DeploymentList", "SecretList")
    pub kind: String,

    /// List of items
    pub items: Vec<T>,
}

impl<T> ResourceList<T> {
    /// Create a new resource list
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            items,
        }
    }

    /// `apps/v1` list, e.g. deployments
    pub fn apps(kind: impl Into<String>, items: Vec<T>) -> Self {
        Self::new("apps/v1", kind, items)
    }

    /// Core `v1` list, e.g. secrets and config maps
    pub fn core(kind: impl Into<String>, items: Vec<T>) -> Self {
        Self::new("v1", kind, items)
    }
}

/// Plain `{status, reason?}` body for liveness and readiness
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
