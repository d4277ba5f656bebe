//! CLI module for clusterdeck
//!
//! Provides kubectl-like subcommands:
//! - `clusterdeck serve` - Run the provisioning API
//! - `clusterdeck context` - Manage server contexts
//! - `clusterdeck clusters` - List, inspect and onboard clusters
//! - `clusterdeck deploy` - Provision a workload from a manifest file
//! - `clusterdeck delete` / `scale` / `restart` - Manage a deployed workload
//! - `clusterdeck pods` / `logs` - Inspect running pods

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "clusterdeck")]
#[command(about = "Provision workloads across many Kubernetes clusters")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.clusterdeck/config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to a .env file loaded before anything else
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    /// Target cluster for client commands (overrides the context's cluster)
    #[arg(long, global = true, env = "CLUSTERDECK_CLUSTER")]
    pub cluster: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the provisioning API server
    Serve(ServeArgs),

    /// Manage server contexts
    Context(ContextArgs),

    /// List, inspect and onboard clusters
    #[command(visible_alias = "cluster")]
    Clusters(ClustersArgs),

    /// Provision a workload from a YAML or JSON manifest
    Deploy(DeployArgs),

    /// Tear down a workload
    Delete(WorkloadRef),

    /// Change a deployment's replica count
    Scale(ScaleArgs),

    /// Trigger a rolling restart of a deployment
    Restart(WorkloadRef),

    /// List pods in a namespace
    Pods(PodsArgs),

    /// Show the tail of a pod's logs
    Logs(LogsArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "CLUSTERDECK_LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: String,

    /// Deadline for a single request, in seconds
    #[arg(long, env = "CLUSTERDECK_REQUEST_TIMEOUT_SECS", default_value = "120")]
    pub request_timeout_secs: u64,

    /// Time allowed for in-flight requests after a shutdown signal
    #[arg(
        long,
        env = "CLUSTERDECK_TERMINATION_GRACE_PERIOD_SECS",
        default_value = "5"
    )]
    pub termination_grace_period_secs: u64,

    /// PEM private key for the default ingress domain
    #[arg(long, env = "CLUSTERDECK_TLS_KEY_FILE", value_name = "FILE")]
    pub tls_key_file: Option<String>,

    /// PEM certificate chain for the default ingress domain
    #[arg(long, env = "CLUSTERDECK_TLS_CERT_FILE", value_name = "FILE")]
    pub tls_cert_file: Option<String>,

    /// Shared secret expected in the Authorization header
    #[arg(long, env = "CLUSTERDECK_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Platform name; the default domain is services.<platform>.com
    #[arg(long, env = "CLUSTERDECK_PLATFORM", default_value = "clappform")]
    pub platform: String,

    /// Name of the cluster reached through in-cluster credentials
    #[arg(long, env = "CLUSTERDECK_DEFAULT_CLUSTER", default_value = "default")]
    pub default_cluster: String,

    /// Browser origin allowed to call the API (repeatable)
    #[arg(
        long = "cors-allowed-origin",
        env = "CLUSTERDECK_CORS_ALLOWED_ORIGINS",
        value_delimiter = ','
    )]
    pub cors_allowed_origins: Vec<String>,

    /// Serve from an in-memory cluster backend instead of a control plane
    #[arg(long, env = "CLUSTERDECK_SIMULATE")]
    pub simulate: bool,
}

/// Arguments for the context command
#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// List all contexts
    List,

    /// Show current context
    Current,

    /// Switch to a context
    Use {
        /// Context name
        name: String,
    },

    /// Add a new context
    Add {
        /// Context name
        name: String,

        /// Server URL
        #[arg(long)]
        url: String,

        /// Auth token sent with every request
        #[arg(long)]
        token: Option<String>,

        /// Cluster targeted by default from this context
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Delete a context
    Delete {
        /// Context name
        name: String,
    },
}

/// Arguments for the clusters command
#[derive(Parser, Debug)]
pub struct ClustersArgs {
    #[command(subcommand)]
    pub action: ClustersAction,
}

#[derive(Subcommand, Debug)]
pub enum ClustersAction {
    /// List onboarded clusters that respond
    List,

    /// Show one onboarded cluster
    Get {
        /// Cluster name
        name: String,
    },

    /// Onboard a cluster with a service account token
    Add(OnboardArgs),
}

/// Arguments for `clusters add`
#[derive(Parser, Debug)]
pub struct OnboardArgs {
    /// Cluster name
    pub name: String,

    /// API server URL
    #[arg(long)]
    pub server: String,

    /// PEM CA bundle of the API server
    #[arg(long, value_name = "FILE")]
    pub ca_file: PathBuf,

    /// Service account bearer token
    #[arg(long, env = "CLUSTERDECK_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: String,

    /// Namespace assumed when none is given
    #[arg(long)]
    pub default_namespace: Option<String>,

    /// Ingress domain for this cluster
    #[arg(long, requires_all = ["certificate_file", "private_key_file"])]
    pub domain: Option<String>,

    /// PEM certificate for the ingress domain
    #[arg(long, value_name = "FILE")]
    pub certificate_file: Option<PathBuf>,

    /// PEM private key for the ingress domain
    #[arg(long, value_name = "FILE")]
    pub private_key_file: Option<PathBuf>,
}

/// Arguments for the deploy command
#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Path to the workload manifest (JSON or YAML)
    pub file: PathBuf,
}

/// A deployed workload
#[derive(Parser, Debug)]
pub struct WorkloadRef {
    /// Namespace
    pub namespace: String,

    /// Workload name
    pub name: String,
}

/// Arguments for the scale command
#[derive(Parser, Debug)]
pub struct ScaleArgs {
    #[command(flatten)]
    pub workload: WorkloadRef,

    /// Number of replicas
    #[arg(long)]
    pub replicas: i32,
}

/// Arguments for the pods command
#[derive(Parser, Debug)]
pub struct PodsArgs {
    /// Namespace
    pub namespace: String,
}

/// Arguments for the logs command
#[derive(Parser, Debug)]
pub struct LogsArgs {
    /// Namespace
    pub namespace: String,

    /// Pod name
    pub pod: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::parse_from(["clusterdeck", "serve"]);
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.listen_address, "0.0.0.0:8080");
                assert_eq!(args.request_timeout_secs, 120);
                assert_eq!(args.platform, "clappform");
                assert!(args.cors_allowed_origins.is_empty());
                assert!(!args.simulate);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_serve_cors_origins() {
        let cli = Cli::parse_from([
            "clusterdeck",
            "serve",
            "--cors-allowed-origin",
            "https://a.example.com,https://b.example.com",
            "--cors-allowed-origin",
            "https://c.example.com",
        ]);
        match cli.command {
            Commands::Serve(args) => assert_eq!(args.cors_allowed_origins.len(), 3),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::parse_from(["clusterdeck", "deploy", "workload.yaml"]);
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.file, PathBuf::from("workload.yaml"));
            }
            _ => panic!("Expected Deploy command"),
        }
    }

    #[test]
    fn test_parse_scale() {
        let cli = Cli::parse_from(["clusterdeck", "scale", "ns1", "web", "--replicas", "3"]);
        match cli.command {
            Commands::Scale(args) => {
                assert_eq!(args.workload.namespace, "ns1");
                assert_eq!(args.workload.name, "web");
                assert_eq!(args.replicas, 3);
            }
            _ => panic!("Expected Scale command"),
        }
    }

    #[test]
    fn test_parse_global_cluster() {
        let cli = Cli::parse_from(["clusterdeck", "pods", "ns1", "--cluster", "edge"]);
        assert_eq!(cli.cluster.as_deref(), Some("edge"));
        assert!(matches!(cli.command, Commands::Pods(_)));
    }

    #[test]
    fn test_parse_context_use() {
        let cli = Cli::parse_from(["clusterdeck", "context", "use", "prod"]);
        match cli.command {
            Commands::Context(args) => match args.action {
                ContextAction::Use { name } => {
                    assert_eq!(name, "prod");
                }
                _ => panic!("Expected Use action"),
            },
            _ => panic!("Expected Context command"),
        }
    }

    #[test]
    fn test_parse_clusters_add_requires_full_domain() {
        let result = Cli::try_parse_from([
            "clusterdeck",
            "clusters",
            "add",
            "edge",
            "--server",
            "https://edge:6443",
            "--ca-file",
            "ca.pem",
            "--bearer-token",
            "t",
            "--domain",
            "apps.edge.example.com",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_count() {
        let cli = Cli::parse_from(["clusterdeck", "-vv", "context", "list"]);
        assert_eq!(cli.verbose, 2);
    }
}
