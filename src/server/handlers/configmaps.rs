use std::collections::BTreeMap;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::{ClusterError, ResourceList};
use crate::error::{Error, Result};
use crate::server::extract::{JsonBody, TargetCluster};

/// Config map every namespace carries; hidden from listings
pub const ROOT_CA_CONFIG_MAP: &str = "kube-root-ca.crt";

/// Body of `POST /configmap`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapRequest {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub config_map_name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Create a config map, creating its namespace first when absent
pub async fn create_config_map(
    TargetCluster(cluster): TargetCluster,
    JsonBody(request): JsonBody<ConfigMapRequest>,
) -> Result<StatusCode> {
    if request.namespace.is_empty() {
        return Err(Error::Validation("namespace is required".to_string()));
    }
    if request.config_map_name.is_empty() {
        return Err(Error::Validation("configMapName is required".to_string()));
    }

    let exists = cluster
        .api
        .get_namespace(&request.namespace)
        .await
        .map_err(|e| Error::upstream("failed to get namespace", e))?;
    if exists.is_none() {
        match cluster.api.create_namespace(&request.namespace).await {
            Ok(_) | Err(ClusterError::AlreadyExists { .. }) => {
                debug!(cluster = %cluster.name, namespace = %request.namespace, "created namespace for config map");
            }
            Err(e) => return Err(Error::upstream("failed to create namespace", e)),
        }
    }

    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(request.config_map_name.clone()),
            namespace: Some(request.namespace.clone()),
            ..Default::default()
        },
        data: Some(request.data),
        ..Default::default()
    };

    cluster
        .api
        .create_config_map(&request.namespace, &config_map)
        .await
        .map_err(|e| Error::upstream("failed to create config map", e))?;

    info!(cluster = %cluster.name, namespace = %request.namespace, config_map = %request.config_map_name, "created config map");
    Ok(StatusCode::CREATED)
}

pub async fn list_config_maps(
    TargetCluster(cluster): TargetCluster,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse> {
    let config_maps: Vec<ConfigMap> = cluster
        .api
        .list_config_maps(&namespace)
        .await
        .map_err(|e| Error::upstream("failed to list config maps", e))?
        .into_iter()
        .filter(|cm| cm.metadata.name.as_deref() != Some(ROOT_CA_CONFIG_MAP))
        .collect();
    Ok(Json(ResourceList::core("ConfigMapList", config_maps)))
}
