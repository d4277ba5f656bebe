use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::cluster::ResourceList;
use crate::error::{Error, Result};
use crate::server::extract::{JsonBody, TargetCluster};
use crate::server::state::AppState;
use crate::workload::{provision, teardown, BundleNames, WorkloadRequest};

/// Pod template annotation that triggers a rolling restart
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Body of `PUT /deployments/{namespace}/{name}`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScaleRequest {
    #[serde(default)]
    pub replicas: i32,
}

pub async fn list_deployments(
    TargetCluster(cluster): TargetCluster,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse> {
    let deployments = cluster
        .api
        .list_deployments(&namespace)
        .await
        .map_err(|e| Error::upstream("failed to list deployments", e))?;
    Ok(Json(ResourceList::apps("DeploymentList", deployments)))
}

pub async fn get_deployment(
    TargetCluster(cluster): TargetCluster,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let names = BundleNames::new(&name);
    let deployment = cluster
        .api
        .get_deployment(&namespace, &names.deployment)
        .await
        .map_err(|e| Error::upstream("failed to get deployment", e))?;
    Ok(Json(deployment))
}

/// Provision the full workload bundle
pub async fn create_deployment(
    State(state): State<AppState>,
    TargetCluster(cluster): TargetCluster,
    JsonBody(request): JsonBody<WorkloadRequest>,
) -> Result<impl IntoResponse> {
    let workload = request.validate()?;
    let domain = state.domain_for(&cluster);

    info!(
        cluster = %cluster.name,
        namespace = %workload.namespace,
        workload = %workload.names.workload,
        domain = %domain.domain,
        "provisioning workload"
    );
    let provisioned = provision(cluster.api.as_ref(), &workload, domain).await?;

    Ok((StatusCode::CREATED, Json(provisioned.deployment)))
}

/// Scale to the requested replica count
pub async fn update_deployment(
    TargetCluster(cluster): TargetCluster,
    Path((namespace, name)): Path<(String, String)>,
    JsonBody(request): JsonBody<ScaleRequest>,
) -> Result<impl IntoResponse> {
    if request.replicas <= 0 {
        return Err(Error::Validation(
            "replicas must be greater than 0".to_string(),
        ));
    }

    let names = BundleNames::new(&name);
    let patch = json!({ "spec": { "replicas": request.replicas } });
    let deployment = cluster
        .api
        .patch_deployment(&namespace, &names.deployment, &patch)
        .await
        .map_err(|e| Error::upstream("failed to update deployment", e))?;

    info!(cluster = %cluster.name, namespace = %namespace, deployment = %names.deployment, replicas = request.replicas, "scaled deployment");
    Ok(Json(deployment))
}

/// Tear the workload bundle down
pub async fn delete_deployment(
    TargetCluster(cluster): TargetCluster,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    let report = teardown(cluster.api.as_ref(), &namespace, &name).await?;
    info!(
        cluster = %cluster.name,
        namespace = %namespace,
        workload = %name,
        namespace_removed = report.namespace_removed,
        "deleted workload"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Rolling restart through the pod template annotation
pub async fn restart_deployment(
    TargetCluster(cluster): TargetCluster,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let names = BundleNames::new(&name);
    let restarted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let patch = json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": { (RESTARTED_AT_ANNOTATION): restarted_at }
                }
            }
        }
    });

    cluster
        .api
        .patch_deployment(&namespace, &names.deployment, &patch)
        .await
        .map_err(|e| Error::upstream("failed to update deployment", e))?;

    info!(cluster = %cluster.name, namespace = %namespace, deployment = %names.deployment, "restarted deployment");
    Ok((StatusCode::OK, "deployment restarted successfully"))
}
