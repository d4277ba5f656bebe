//! Error taxonomy for the HTTP surface
//!
//! Every handler returns [`Result<T>`]; the error is rendered as a plain-text
//! body with the status code of its class.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cluster::ClusterError;
use crate::workload::PipelineError;

/// Result type for request handling
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to API callers
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing request fields
    #[error("{0}")]
    Validation(String),

    /// The `cluster-name` header names a cluster that was never onboarded
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    /// Resource or cluster does not exist
    #[error("{0}")]
    NotFound(String),

    /// Resource already exists
    #[error("{0}")]
    Conflict(String),

    /// The downstream control plane could not be reached
    #[error("unable to contact cluster: {0}")]
    UpstreamUnreachable(String),

    /// Missing or wrong `Authorization` header
    #[error("Unauthorized")]
    Unauthorized,

    /// A provisioning or teardown step failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Any other downstream failure
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Wrap a control-plane failure with the operation that caused it,
    /// keeping the not-found and conflict classes intact.
    pub fn upstream(context: &str, err: ClusterError) -> Self {
        let message = format!("{}: {}", context, err);
        match err {
            ClusterError::NotFound { .. } => Error::NotFound(message),
            ClusterError::AlreadyExists { .. } => Error::Conflict(message),
            ClusterError::Unreachable(_) => Error::UpstreamUnreachable(message),
            _ => Error::Internal(message),
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::UnknownCluster(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Pipeline(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Error::Pipeline(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
