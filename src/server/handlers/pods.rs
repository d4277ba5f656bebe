use axum::extract::Path;
use axum::response::IntoResponse;
use axum::Json;
use k8s_openapi::api::core::v1::{Container, Pod, PodCondition};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::server::extract::TargetCluster;

/// Bytes of log output returned per request
pub const LOG_LIMIT_BYTES: i64 = 2000;

#[derive(Debug, Serialize, Deserialize)]
pub struct PodList {
    pub pods: Vec<PodSummary>,
}

/// One pod as reported by `GET /pods/{namespace}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSummary {
    pub name: String,
    pub status: Option<String>,
    pub start_time: Option<Time>,
    pub restart_policy: Option<String>,
    pub status_conditions: Vec<PodCondition>,
    /// Container specs, including their resource requirements
    pub resources: Vec<Container>,
}

impl From<Pod> for PodSummary {
    fn from(pod: Pod) -> Self {
        let status = pod.status.unwrap_or_default();
        let spec = pod.spec.unwrap_or_default();
        Self {
            name: pod.metadata.name.unwrap_or_default(),
            status: status.phase,
            start_time: status.start_time,
            restart_policy: spec.restart_policy,
            status_conditions: status.conditions.unwrap_or_default(),
            resources: spec.containers,
        }
    }
}

pub async fn list_pods(
    TargetCluster(cluster): TargetCluster,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse> {
    let pods = cluster
        .api
        .list_pods(&namespace)
        .await
        .map_err(|e| Error::upstream("failed to list pods", e))?;

    Ok(Json(PodList {
        pods: pods.into_iter().map(PodSummary::from).collect(),
    }))
}

/// First [`LOG_LIMIT_BYTES`] of the pod's log, as plain text
pub async fn pod_logs(
    TargetCluster(cluster): TargetCluster,
    Path((namespace, pod)): Path<(String, String)>,
) -> Result<String> {
    cluster
        .api
        .pod_logs(&namespace, &pod, LOG_LIMIT_BYTES)
        .await
        .map_err(|e| Error::upstream("failed to get pod logs", e))
}
