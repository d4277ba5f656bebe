//! Request extractors

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::cluster::{ClusterEntry, CLUSTER_HEADER};
use crate::error::Error;
use crate::server::state::AppState;

/// Cluster selected by the `cluster-name` header, or the default
pub struct TargetCluster(pub Arc<ClusterEntry>);

impl FromRequestParts<AppState> for TargetCluster {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let name = parts
            .headers
            .get(CLUSTER_HEADER)
            .map(|v| {
                v.to_str()
                    .map_err(|_| Error::Validation(format!("{} header is not valid text", CLUSTER_HEADER)))
            })
            .transpose()?;

        let entry = state.registry.resolve(name).await?;
        Ok(Self(entry))
    }
}

/// JSON body whose rejections render as validation errors
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection_to_error(rejection)),
        }
    }
}

fn rejection_to_error(rejection: JsonRejection) -> Error {
    Error::Validation(format!("invalid JSON: {}", rejection.body_text()))
}
