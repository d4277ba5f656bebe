//! Workload teardown
//!
//! Deletes a workload's deployment, service and ingress in that order, then
//! removes the namespace once no deployment is left in it. The middleware
//! stays behind.

use serde::Serialize;
use tracing::{debug, info};

use super::pipeline::{CommittedStep, PipelineError, PipelineKind, Step};
use super::BundleNames;
use crate::cluster::{ClusterApi, ClusterError};
use crate::error::{Error, Result};

/// What a teardown removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub deleted: Vec<Step>,
    pub namespace_removed: bool,
}

fn failed(step: Step, operation: &str, committed: &[Step], source: ClusterError) -> Error {
    Error::Pipeline(PipelineError {
        kind: PipelineKind::Teardown,
        step,
        operation: operation.to_string(),
        committed: committed
            .iter()
            .map(|s| CommittedStep {
                step: *s,
                compensation: None,
            })
            .collect(),
        source,
    })
}

/// Remove the bundle for `workload` from `namespace`
pub async fn teardown(api: &dyn ClusterApi, namespace: &str, workload: &str) -> Result<TeardownReport> {
    let exists = api
        .get_namespace(namespace)
        .await
        .map_err(|e| Error::upstream("failed to get namespace", e))?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("namespace {:?} not found", namespace)));
    }

    let names = BundleNames::new(workload);
    let mut deleted = Vec::with_capacity(3);

    api.delete_deployment(namespace, &names.deployment)
        .await
        .map_err(|e| failed(Step::Deployment, "failed to delete deployment", &deleted, e))?;
    deleted.push(Step::Deployment);
    debug!(namespace, deployment = %names.deployment, "deleted deployment");

    api.delete_service(namespace, &names.service)
        .await
        .map_err(|e| failed(Step::Service, "failed to delete service", &deleted, e))?;
    deleted.push(Step::Service);
    debug!(namespace, service = %names.service, "deleted service");

    api.delete_ingress(namespace, &names.ingress)
        .await
        .map_err(|e| failed(Step::Ingress, "failed to delete ingress", &deleted, e))?;
    deleted.push(Step::Ingress);
    debug!(namespace, ingress = %names.ingress, "deleted ingress");

    let remaining = api.list_deployments(namespace).await.map_err(|e| {
        failed(
            Step::RemainingWorkloads,
            "failed to list deployments",
            &deleted,
            e,
        )
    })?;

    let namespace_removed = remaining.is_empty();
    if namespace_removed {
        api.delete_namespace(namespace)
            .await
            .map_err(|e| failed(Step::Namespace, "failed to delete namespace", &deleted, e))?;
        deleted.push(Step::Namespace);
    }

    info!(
        namespace,
        workload,
        namespace_removed,
        "workload removed"
    );
    Ok(TeardownReport {
        deleted,
        namespace_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{InMemoryCluster, Operation};
    use crate::cluster::DomainConfig;
    use crate::workload::provision;
    use crate::workload::tests::sample_request;
    use axum::http::StatusCode;

    async fn provisioned(cluster: &InMemoryCluster, names: &[&str]) {
        let domain = DomainConfig::platform_default("clappform", b"C".to_vec(), b"K".to_vec());
        for name in names {
            let mut request = sample_request();
            request.deployment_name = name.to_string();
            provision(cluster, &request.validate().unwrap(), &domain)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_last_workload_removes_namespace() {
        let cluster = InMemoryCluster::new("https://sim");
        provisioned(&cluster, &["app1"]).await;

        let report = teardown(&cluster, "ns1", "app1").await.unwrap();
        assert!(report.namespace_removed);
        assert_eq!(
            report.deleted,
            vec![Step::Deployment, Step::Service, Step::Ingress, Step::Namespace]
        );
        assert!(!cluster.has_namespace("ns1").await);
    }

    #[tokio::test]
    async fn test_other_workloads_keep_namespace() {
        let cluster = InMemoryCluster::new("https://sim");
        provisioned(&cluster, &["app1", "app2"]).await;

        let report = teardown(&cluster, "ns1", "app1").await.unwrap();
        assert!(!report.namespace_removed);
        assert!(cluster.has_namespace("ns1").await);
        assert!(cluster.deployment("ns1", "app1-deployment").await.is_none());
        assert!(cluster.deployment("ns1", "app2-deployment").await.is_some());
        // Middleware is left behind
        assert!(cluster
            .middleware("ns1", "strip-app1-deployment-prefix")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_repeated_delete_is_not_found() {
        let cluster = InMemoryCluster::new("https://sim");
        provisioned(&cluster, &["app1", "app2"]).await;

        teardown(&cluster, "ns1", "app1").await.unwrap();
        let err = teardown(&cluster, "ns1", "app1").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().starts_with("failed to delete deployment: "));
    }

    #[tokio::test]
    async fn test_missing_namespace_is_not_found() {
        let cluster = InMemoryCluster::new("https://sim");
        let err = teardown(&cluster, "ghost", "app1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failure_reports_completed_deletes() {
        let cluster = InMemoryCluster::new("https://sim");
        provisioned(&cluster, &["app1"]).await;
        cluster
            .fail_on(
                Operation::DeleteIngress,
                ClusterError::Api {
                    code: 500,
                    message: "storage error".into(),
                },
            )
            .await;

        let err = teardown(&cluster, "ns1", "app1").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let Error::Pipeline(pipeline) = err else {
            panic!("expected pipeline error");
        };
        assert_eq!(pipeline.step, Step::Ingress);
        let committed: Vec<Step> = pipeline.committed.iter().map(|c| c.step).collect();
        assert_eq!(committed, vec![Step::Deployment, Step::Service]);
        assert!(cluster.has_namespace("ns1").await);
    }
}
