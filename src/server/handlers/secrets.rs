use std::collections::BTreeMap;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::ResourceList;
use crate::encoding::base64_map;
use crate::error::{Error, Result};
use crate::server::extract::{JsonBody, TargetCluster};

/// Body of `POST /secrets`; values are base64 in JSON
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRequest {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub secret_name: String,
    #[serde(default, with = "base64_map")]
    pub data: BTreeMap<String, Vec<u8>>,
}

pub async fn create_secret(
    TargetCluster(cluster): TargetCluster,
    JsonBody(request): JsonBody<SecretRequest>,
) -> Result<StatusCode> {
    if request.namespace.is_empty() {
        return Err(Error::Validation("namespace is required".to_string()));
    }
    if request.secret_name.is_empty() {
        return Err(Error::Validation("secretName is required".to_string()));
    }
    if request.data.is_empty() {
        return Err(Error::Validation("data is required".to_string()));
    }

    let namespace = cluster
        .api
        .get_namespace(&request.namespace)
        .await
        .map_err(|e| Error::upstream("failed to get namespace", e))?;
    if namespace.is_none() {
        return Err(Error::Validation(format!(
            "namespace {} does not exist",
            request.namespace
        )));
    }

    let keys = request.data.len();
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(request.secret_name.clone()),
            namespace: Some(request.namespace.clone()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(
            request
                .data
                .into_iter()
                .map(|(k, v)| (k, ByteString(v)))
                .collect(),
        ),
        ..Default::default()
    };

    cluster
        .api
        .create_secret(&request.namespace, &secret)
        .await
        .map_err(|e| Error::upstream("failed to create secret", e))?;

    info!(cluster = %cluster.name, namespace = %request.namespace, secret = %request.secret_name, keys, "created secret");
    Ok(StatusCode::CREATED)
}

pub async fn list_secrets(
    TargetCluster(cluster): TargetCluster,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse> {
    let secrets = cluster
        .api
        .list_secrets(&namespace)
        .await
        .map_err(|e| Error::upstream("failed to list secrets", e))?;
    Ok(Json(ResourceList::core("SecretList", secrets)))
}
