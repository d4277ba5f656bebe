//! Provisioning pipeline
//!
//! A bundle is created as an ordered list of (action, compensation) pairs.
//! Execution stops at the first failing step. Nothing is rolled back; the
//! error carries every committed step together with the action that would
//! undo it so the caller can clean up.

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::{manifests, BundleNames, ValidatedWorkload, TLS_SECRET_NAME};
use crate::cluster::{ClusterApi, ClusterError, DomainConfig};

/// Pipeline stages, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Namespace,
    TlsSecret,
    Deployment,
    Service,
    Middleware,
    Ingress,
    /// Teardown only: counting the workloads left in the namespace
    RemainingWorkloads,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Namespace => "namespace",
            Step::TlsSecret => "tls-secret",
            Step::Deployment => "deployment",
            Step::Service => "service",
            Step::Middleware => "middleware",
            Step::Ingress => "ingress",
            Step::RemainingWorkloads => "remaining-workloads",
        };
        f.write_str(name)
    }
}

/// Action that undoes a committed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Compensation {
    DeleteNamespace { name: String },
    DeleteSecret { namespace: String, name: String },
    DeleteDeployment { namespace: String, name: String },
    DeleteService { namespace: String, name: String },
    DeleteMiddleware { namespace: String, name: String },
    DeleteIngress { namespace: String, name: String },
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::DeleteNamespace { name } => write!(f, "delete namespace {}", name),
            Compensation::DeleteSecret { namespace, name } => {
                write!(f, "delete secret {}/{}", namespace, name)
            }
            Compensation::DeleteDeployment { namespace, name } => {
                write!(f, "delete deployment {}/{}", namespace, name)
            }
            Compensation::DeleteService { namespace, name } => {
                write!(f, "delete service {}/{}", namespace, name)
            }
            Compensation::DeleteMiddleware { namespace, name } => {
                write!(f, "delete middleware {}/{}", namespace, name)
            }
            Compensation::DeleteIngress { namespace, name } => {
                write!(f, "delete ingress {}/{}", namespace, name)
            }
        }
    }
}

/// A step that took effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedStep {
    pub step: Step,
    /// `None` when the object already existed and was left untouched
    pub compensation: Option<Compensation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Provision,
    Teardown,
}

/// A pipeline step failed after zero or more steps committed
#[derive(Error, Debug)]
#[error("{operation}: {source}{}", describe_committed(.committed))]
pub struct PipelineError {
    pub kind: PipelineKind,
    pub step: Step,
    /// e.g. "failed to create service"
    pub operation: String,
    pub committed: Vec<CommittedStep>,
    #[source]
    pub source: ClusterError,
}

impl PipelineError {
    /// Teardown hit an object that does not exist
    pub fn is_not_found(&self) -> bool {
        self.kind == PipelineKind::Teardown && self.source.is_not_found()
    }

    /// Compensations for committed steps, most recent first
    pub fn pending_compensations(&self) -> Vec<&Compensation> {
        self.committed
            .iter()
            .rev()
            .filter_map(|c| c.compensation.as_ref())
            .collect()
    }
}

fn describe_committed(committed: &[CommittedStep]) -> String {
    if committed.is_empty() {
        return String::new();
    }
    let steps: Vec<String> = committed
        .iter()
        .map(|c| match &c.compensation {
            Some(comp) => format!("{} (undo: {})", c.step, comp),
            None => format!("{} (pre-existing)", c.step),
        })
        .collect();
    format!(" (completed steps: {})", steps.join(", "))
}

/// What a step does
#[derive(Debug, Clone)]
pub enum Action {
    /// Create the namespace unless it exists
    EnsureNamespace(String),
    /// Create the TLS secret unless one with the same name exists
    EnsureSecret(Secret),
    CreateDeployment(Deployment),
    CreateService(Service),
    CreateMiddleware(DynamicObject),
    CreateIngress(Ingress),
}

impl Action {
    fn operation(&self) -> &'static str {
        match self {
            Action::EnsureNamespace(_) => "failed to create namespace",
            Action::EnsureSecret(_) => "failed to create TLS secret",
            Action::CreateDeployment(_) => "failed to create deployment",
            Action::CreateService(_) => "failed to create service",
            Action::CreateMiddleware(_) => "failed to create middleware",
            Action::CreateIngress(_) => "failed to create ingress",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub step: Step,
    pub action: Action,
    pub compensation: Compensation,
}

/// Every step needed to provision one workload
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub namespace: String,
    pub names: BundleNames,
    pub steps: Vec<PlannedStep>,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub deployment: Deployment,
    pub committed: Vec<CommittedStep>,
}

// ============================================================================
// SBIO: pure planning, no I/O
// ============================================================================

impl ProvisionPlan {
    pub fn build(workload: &ValidatedWorkload, domain: &DomainConfig) -> Self {
        let ns = workload.namespace.clone();
        let names = workload.names.clone();
        let scoped = |name: &str| (ns.clone(), name.to_string());

        let (n, s) = scoped(TLS_SECRET_NAME);
        let secret_undo = Compensation::DeleteSecret { namespace: n, name: s };
        let (n, s) = scoped(&names.deployment);
        let deployment_undo = Compensation::DeleteDeployment { namespace: n, name: s };
        let (n, s) = scoped(&names.service);
        let service_undo = Compensation::DeleteService { namespace: n, name: s };
        let (n, s) = scoped(&names.middleware);
        let middleware_undo = Compensation::DeleteMiddleware { namespace: n, name: s };
        let (n, s) = scoped(&names.ingress);
        let ingress_undo = Compensation::DeleteIngress { namespace: n, name: s };

        let steps = vec![
            PlannedStep {
                step: Step::Namespace,
                action: Action::EnsureNamespace(ns.clone()),
                compensation: Compensation::DeleteNamespace { name: ns.clone() },
            },
            PlannedStep {
                step: Step::TlsSecret,
                action: Action::EnsureSecret(manifests::tls_secret(&ns, domain)),
                compensation: secret_undo,
            },
            PlannedStep {
                step: Step::Deployment,
                action: Action::CreateDeployment(manifests::deployment(workload)),
                compensation: deployment_undo,
            },
            PlannedStep {
                step: Step::Service,
                action: Action::CreateService(manifests::service(workload)),
                compensation: service_undo,
            },
            PlannedStep {
                step: Step::Middleware,
                action: Action::CreateMiddleware(manifests::middleware(workload)),
                compensation: middleware_undo,
            },
            PlannedStep {
                step: Step::Ingress,
                action: Action::CreateIngress(manifests::ingress(workload, domain)),
                compensation: ingress_undo,
            },
        ];

        Self {
            namespace: ns,
            names,
            steps,
        }
    }

    /// Run every step in order, stopping at the first failure
    pub async fn execute(self, api: &dyn ClusterApi) -> Result<Provisioned, PipelineError> {
        let namespace = self.namespace;
        let mut committed: Vec<CommittedStep> = Vec::with_capacity(self.steps.len());
        let mut created_deployment = None;

        for planned in self.steps {
            let operation = planned.action.operation();
            let outcome = run_action(api, &namespace, planned.action).await;

            match outcome {
                Ok(ActionOutcome { created, deployment }) => {
                    debug!(namespace = %namespace, step = %planned.step, created, "pipeline step committed");
                    if deployment.is_some() {
                        created_deployment = deployment;
                    }
                    committed.push(CommittedStep {
                        step: planned.step,
                        compensation: created.then_some(planned.compensation),
                    });
                }
                Err(source) => {
                    return Err(PipelineError {
                        kind: PipelineKind::Provision,
                        step: planned.step,
                        operation: operation.to_string(),
                        committed,
                        source,
                    });
                }
            }
        }

        info!(
            namespace = %namespace,
            deployment = %self.names.deployment,
            steps = committed.len(),
            "workload provisioned"
        );

        // The plan always contains a deployment step, so this only trips on a hand-built plan
        let deployment = created_deployment.ok_or_else(|| PipelineError {
            kind: PipelineKind::Provision,
            step: Step::Deployment,
            operation: "failed to create deployment".to_string(),
            committed: committed.clone(),
            source: ClusterError::not_found("deployment", &self.names.deployment),
        })?;

        Ok(Provisioned {
            deployment,
            committed,
        })
    }
}

struct ActionOutcome {
    /// `false` when the object already existed
    created: bool,
    deployment: Option<Deployment>,
}

impl ActionOutcome {
    fn created() -> Self {
        Self {
            created: true,
            deployment: None,
        }
    }

    fn existing() -> Self {
        Self {
            created: false,
            deployment: None,
        }
    }
}

async fn run_action(
    api: &dyn ClusterApi,
    namespace: &str,
    action: Action,
) -> Result<ActionOutcome, ClusterError> {
    match action {
        Action::EnsureNamespace(name) => {
            if api.get_namespace(&name).await?.is_some() {
                return Ok(ActionOutcome::existing());
            }
            match api.create_namespace(&name).await {
                Ok(_) => Ok(ActionOutcome::created()),
                Err(ClusterError::AlreadyExists { .. }) => Ok(ActionOutcome::existing()),
                Err(e) => Err(e),
            }
        }
        Action::EnsureSecret(secret) => {
            let name = secret.metadata.name.clone().unwrap_or_default();
            if api.get_secret(namespace, &name).await?.is_some() {
                return Ok(ActionOutcome::existing());
            }
            match api.create_secret(namespace, &secret).await {
                Ok(_) => Ok(ActionOutcome::created()),
                Err(ClusterError::AlreadyExists { .. }) => Ok(ActionOutcome::existing()),
                Err(e) => Err(e),
            }
        }
        Action::CreateDeployment(deployment) => {
            let created = api.create_deployment(namespace, &deployment).await?;
            Ok(ActionOutcome {
                created: true,
                deployment: Some(created),
            })
        }
        Action::CreateService(service) => {
            api.create_service(namespace, &service).await?;
            Ok(ActionOutcome::created())
        }
        Action::CreateMiddleware(middleware) => {
            api.create_middleware(namespace, &middleware).await?;
            Ok(ActionOutcome::created())
        }
        Action::CreateIngress(ingress) => {
            api.create_ingress(namespace, &ingress).await?;
            Ok(ActionOutcome::created())
        }
    }
}

/// Build and execute the plan for `workload` against `api`
pub async fn provision(
    api: &dyn ClusterApi,
    workload: &ValidatedWorkload,
    domain: &DomainConfig,
) -> Result<Provisioned, PipelineError> {
    ProvisionPlan::build(workload, domain).execute(api).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{InMemoryCluster, Operation};
    use crate::cluster::api::MockClusterApi;
    use crate::workload::tests::sample_request;

    fn domain() -> DomainConfig {
        DomainConfig::platform_default("clappform", b"CERT".to_vec(), b"KEY".to_vec())
    }

    #[tokio::test]
    async fn test_provisions_full_bundle() {
        let cluster = InMemoryCluster::new("https://sim");
        let workload = sample_request().validate().unwrap();

        let provisioned = provision(&cluster, &workload, &domain()).await.unwrap();
        assert_eq!(
            provisioned.deployment.metadata.name.as_deref(),
            Some("app1-deployment")
        );
        let steps: Vec<Step> = provisioned.committed.iter().map(|c| c.step).collect();
        assert_eq!(
            steps,
            vec![
                Step::Namespace,
                Step::TlsSecret,
                Step::Deployment,
                Step::Service,
                Step::Middleware,
                Step::Ingress
            ]
        );

        assert!(cluster.has_namespace("ns1").await);
        let secret = cluster.secret("ns1", "cert").await.unwrap();
        assert_eq!(secret.type_.as_deref(), Some("kubernetes.io/tls"));
        assert!(cluster.service("ns1", "app1-deployment-service").await.is_some());
        assert!(cluster
            .middleware("ns1", "strip-app1-deployment-prefix")
            .await
            .is_some());
        let ingress = cluster.ingress("ns1", "app1-ingress").await.unwrap();
        let host = ingress.spec.unwrap().rules.unwrap()[0].host.clone();
        assert_eq!(host.as_deref(), Some("services.clappform.com"));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let workload = sample_request().validate().unwrap();
        let a = ProvisionPlan::build(&workload, &domain());
        let b = ProvisionPlan::build(&workload, &domain());

        let render = |plan: &ProvisionPlan| -> Vec<String> {
            plan.steps
                .iter()
                .map(|s| format!("{} {:?} {}", s.step, s.action, s.compensation))
                .collect()
        };
        assert_eq!(render(&a), render(&b));
        assert_eq!(a.steps.len(), 6);
    }

    #[tokio::test]
    async fn test_existing_namespace_and_secret_are_kept() {
        let cluster = InMemoryCluster::new("https://sim");
        let workload = sample_request().validate().unwrap();
        provision(&cluster, &workload, &domain()).await.unwrap();

        let mut second = sample_request();
        second.deployment_name = "app2".to_string();
        let second = second.validate().unwrap();
        let other_domain = DomainConfig::platform_default("other", b"NEW".to_vec(), b"NEWKEY".to_vec());
        let provisioned = provision(&cluster, &second, &other_domain).await.unwrap();

        assert_eq!(provisioned.committed[0].compensation, None);
        assert_eq!(provisioned.committed[1].compensation, None);
        let secret = cluster.secret("ns1", "cert").await.unwrap();
        assert_eq!(secret.data.unwrap()["tls.crt"].0, b"CERT".to_vec());
    }

    #[tokio::test]
    async fn test_partial_failure_at_service() {
        let cluster = InMemoryCluster::new("https://sim");
        cluster
            .fail_on(
                Operation::CreateService,
                ClusterError::Api {
                    code: 500,
                    message: "admission webhook denied".into(),
                },
            )
            .await;
        let workload = sample_request().validate().unwrap();

        let err = provision(&cluster, &workload, &domain()).await.unwrap_err();
        assert_eq!(err.kind, PipelineKind::Provision);
        assert_eq!(err.step, Step::Service);
        assert!(!err.is_not_found());
        let committed: Vec<Step> = err.committed.iter().map(|c| c.step).collect();
        assert_eq!(
            committed,
            vec![Step::Namespace, Step::TlsSecret, Step::Deployment]
        );

        let message = err.to_string();
        assert!(message.starts_with("failed to create service: "));
        assert!(message.contains("admission webhook denied"));
        assert!(message.contains("undo: delete deployment ns1/app1-deployment"));

        let undo = err.pending_compensations();
        assert_eq!(
            undo[0],
            &Compensation::DeleteDeployment {
                namespace: "ns1".into(),
                name: "app1-deployment".into()
            }
        );

        // Nothing was rolled back
        assert!(cluster.has_namespace("ns1").await);
        assert!(cluster.secret("ns1", "cert").await.is_some());
        assert!(cluster.deployment("ns1", "app1-deployment").await.is_some());
        assert!(cluster.service("ns1", "app1-deployment-service").await.is_none());
        assert!(cluster.ingress("ns1", "app1-ingress").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_workload_conflicts_at_deployment() {
        let cluster = InMemoryCluster::new("https://sim");
        let workload = sample_request().validate().unwrap();
        provision(&cluster, &workload, &domain()).await.unwrap();

        let err = provision(&cluster, &workload, &domain()).await.unwrap_err();
        assert_eq!(err.step, Step::Deployment);
        assert!(matches!(err.source, ClusterError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_namespace_failure_stops_everything() {
        let mut api = MockClusterApi::new();
        api.expect_get_namespace().times(1).returning(|_| Ok(None));
        api.expect_create_namespace()
            .times(1)
            .returning(|_| Err(ClusterError::Unreachable("connection reset".into())));
        api.expect_create_secret().times(0);
        api.expect_create_deployment().times(0);

        let workload = sample_request().validate().unwrap();
        let err = provision(&api, &workload, &domain()).await.unwrap_err();
        assert_eq!(err.step, Step::Namespace);
        assert!(err.committed.is_empty());
        assert_eq!(
            err.to_string(),
            "failed to create namespace: control plane unreachable: connection reset"
        );
    }
}
