//! # Cluster access
//!
//! Everything needed to reach downstream Kubernetes clusters:
//!
//! - [`api`]: the [`ClusterApi`] seam every control-plane call goes through
//! - [`kube_api`]: kube-rs implementation for live clusters
//! - [`memory`]: in-memory implementation used by `--simulate` and tests
//! - [`registry`]: the default cluster plus every onboarded cluster
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ClusterRegistry               │
//! │  default ──► ClusterEntry                    │
//! │  onboarded ─► name → ClusterEntry            │
//! └───────────────┬──────────────────────────────┘
//!                 │ Arc<dyn ClusterApi>
//!        ┌────────┴────────┐
//!        ▼                 ▼
//!  KubeClusterApi    InMemoryCluster
//! ```

pub mod api;
pub mod certs;
pub mod connection;
pub mod domain;
pub mod kube_api;
pub mod memory;
pub mod registry;
pub mod resources;

pub use api::{ClusterApi, ClusterConnector, ClusterError};
pub use connection::{ClusterAuth, ConnectionConfig};
pub use domain::DomainConfig;
pub use kube_api::{KubeClusterApi, KubeConnector};
pub use memory::{InMemoryCluster, InMemoryConnector};
pub use registry::{ClusterEntry, ClusterInfo, ClusterRegistry, OnboardRequest, PROBE_TIMEOUT};
pub use resources::*;

/// Header that selects the target cluster
pub const CLUSTER_HEADER: &str = "cluster-name";
