//! # HTTP control surface
//!
//! ```text
//! request ─► Trace ─► CORS ─► Timeout ─► route ─► auth gate ─► handler
//!                                          │
//!                                          └─► /health, /ready (no auth)
//! ```
//!
//! Handlers resolve their target cluster from the `cluster-name` header via
//! [`extract::TargetCluster`] and return [`crate::error::Result`].

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::cluster::CLUSTER_HEADER;

pub mod auth;
pub mod extract;
pub mod handlers;
pub mod shutdown;
pub mod state;

pub use auth::AuthToken;
pub use shutdown::{serve_with_shutdown, shutdown_signal};
pub use state::AppState;

use handlers::{clusters, configmaps, deployments, health, pods, secrets};

/// Request body cap for `POST /clusters`
pub const ONBOARD_BODY_LIMIT: usize = 1 << 20;

/// Transport settings for [`create_router`]
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Deadline for a whole request, handler included
    pub request_timeout: Duration,
    /// Origins that may call the API from a browser
    pub cors_allowed_origins: Vec<String>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(CLUSTER_HEADER),
        ])
        .max_age(Duration::from_secs(3600))
}

/// Create the Axum router
pub fn create_router(state: AppState, options: &RouterOptions) -> Router {
    let protected = Router::new()
        // Pods
        .route("/pods/{namespace}", get(pods::list_pods))
        .route("/pods/{namespace}/{podname}/logs", get(pods::pod_logs))
        // Deployments
        .route("/deployments", post(deployments::create_deployment))
        .route("/deployments/{namespace}", get(deployments::list_deployments))
        .route(
            "/deployments/{namespace}/{name}",
            get(deployments::get_deployment)
                .put(deployments::update_deployment)
                .delete(deployments::delete_deployment),
        )
        .route(
            "/deployments/{namespace}/{name}/restart",
            post(deployments::restart_deployment),
        )
        // Clusters
        .route(
            "/clusters",
            get(clusters::list_clusters)
                .post(clusters::onboard_cluster)
                .layer(DefaultBodyLimit::max(ONBOARD_BODY_LIMIT)),
        )
        .route("/clusters/{name}", get(clusters::get_cluster))
        // Secrets & ConfigMaps
        .route("/secrets", post(secrets::create_secret))
        .route("/secrets/{namespace}", get(secrets::list_secrets))
        .route("/configmap", post(configmaps::create_config_map))
        .route("/configmap/{namespace}", get(configmaps::list_config_maps))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .merge(protected)
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(cors_layer(&options.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
