//! # Workload bundles
//!
//! A workload is one container image exposed through a Traefik ingress. Each
//! request expands into a fixed bundle of objects:
//!
//! ```text
//! Namespace ─► Secret "cert" ─► Deployment ─► Service ─► Middleware ─► Ingress
//! ```
//!
//! [`pipeline`] creates the bundle in that order; [`teardown`] removes it.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub mod manifests;
pub mod pipeline;
pub mod quantity;
pub mod teardown;

pub use pipeline::{
    provision, Compensation, PipelineError, PipelineKind, ProvisionPlan, Provisioned, Step,
};
pub use quantity::parse_quantity;
pub use teardown::{teardown, TeardownReport};

/// Name of the TLS secret every workload namespace carries
pub const TLS_SECRET_NAME: &str = "cert";

/// Longest workload name whose derived service name still fits a DNS label
pub const MAX_WORKLOAD_NAME_LEN: usize = 63 - "-deployment-service".len();

/// Body of `POST /deployments`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRequest {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub deployment_name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
}

/// CPU and memory requests/limits as quantity strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu_limits: String,
    #[serde(default)]
    pub cpu_requests: String,
    #[serde(default)]
    pub memory_limits: String,
    #[serde(default)]
    pub memory_requests: String,
}

/// One container port
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    #[serde(default)]
    pub container_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Object names derived from a workload name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleNames {
    pub workload: String,
    pub deployment: String,
    pub container: String,
    pub service: String,
    pub ingress: String,
    pub middleware: String,
    pub path_prefix: String,
}

impl BundleNames {
    pub fn new(workload: &str) -> Self {
        let deployment = format!("{}-deployment", workload);
        Self {
            workload: workload.to_string(),
            container: format!("{}-container", workload),
            service: format!("{}-service", deployment),
            ingress: format!("{}-ingress", workload),
            middleware: format!("strip-{}-prefix", deployment),
            path_prefix: format!("/{}", deployment),
            deployment,
        }
    }

    /// `{app: <workload>}`
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), self.workload.clone())])
    }
}

/// A request whose fields and quantities have all been checked
#[derive(Debug, Clone)]
pub struct ValidatedWorkload {
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
    pub ports: Vec<PortSpec>,
    pub names: BundleNames,
    pub limits: BTreeMap<String, Quantity>,
    pub requests: BTreeMap<String, Quantity>,
}

impl ValidatedWorkload {
    /// Port the service and ingress route to
    pub fn primary_port(&self) -> i32 {
        self.ports.first().map(|p| p.container_port).unwrap_or_default()
    }
}

/// `true` for an RFC 1123 label of at most `max` characters
pub fn is_dns_label(value: &str, max: usize) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= max
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(|b| *b != b'-')
        && bytes.last().is_some_and(|b| *b != b'-')
}

// ============================================================================
// SBIO: pure validation, no I/O
// ============================================================================

impl WorkloadRequest {
    /// Check every field, reporting all problems at once
    pub fn validate(&self) -> Result<ValidatedWorkload, Error> {
        let mut errors = Vec::new();

        if self.namespace.is_empty() {
            errors.push("namespace is required".to_string());
        } else if !is_dns_label(&self.namespace, 63) {
            errors.push(format!(
                "namespace {:?} must be a lowercase RFC 1123 label",
                self.namespace
            ));
        }

        if self.deployment_name.is_empty() {
            errors.push("deploymentName is required".to_string());
        } else if !is_dns_label(&self.deployment_name, MAX_WORKLOAD_NAME_LEN) {
            errors.push(format!(
                "deploymentName {:?} must be a lowercase RFC 1123 label of at most {} characters",
                self.deployment_name, MAX_WORKLOAD_NAME_LEN
            ));
        }

        if self.image.trim().is_empty() {
            errors.push("image is required".to_string());
        }
        if self.replicas <= 0 {
            errors.push("replicas must be greater than 0".to_string());
        }

        let mut limits = BTreeMap::new();
        let mut requests = BTreeMap::new();
        let quantities = [
            ("cpuLimits", &self.resources.cpu_limits, "cpu", true),
            ("memoryLimits", &self.resources.memory_limits, "memory", true),
            ("cpuRequests", &self.resources.cpu_requests, "cpu", false),
            ("memoryRequests", &self.resources.memory_requests, "memory", false),
        ];
        for (field, value, resource, is_limit) in quantities {
            if value.is_empty() {
                errors.push(format!("resources.{} is required", field));
                continue;
            }
            match parse_quantity(value) {
                Ok(q) if is_limit => {
                    limits.insert(resource.to_string(), q);
                }
                Ok(q) => {
                    requests.insert(resource.to_string(), q);
                }
                Err(e) => errors.push(format!("resources.{}: {}", field, e)),
            }
        }

        if self.ports.is_empty() {
            errors.push("at least one port is required in ports".to_string());
        }
        for (i, port) in self.ports.iter().enumerate() {
            if port.container_port <= 0 || port.container_port > 65535 {
                errors.push(format!(
                    "ports[{}].containerPort is required and must be between 1 and 65535",
                    i
                ));
            }
            if let Some(protocol) = &port.protocol {
                if !matches!(protocol.as_str(), "TCP" | "UDP" | "SCTP") {
                    errors.push(format!(
                        "ports[{}].protocol must be TCP, UDP or SCTP",
                        i
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(Error::Validation(format!(
                "validation failed: [{}]",
                errors.join("; ")
            )));
        }

        Ok(ValidatedWorkload {
            namespace: self.namespace.clone(),
            image: self.image.trim().to_string(),
            replicas: self.replicas,
            ports: self.ports.clone(),
            names: BundleNames::new(&self.deployment_name),
            limits,
            requests,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_request() -> WorkloadRequest {
        WorkloadRequest {
            namespace: "ns1".to_string(),
            deployment_name: "app1".to_string(),
            image: "nginx:1.25".to_string(),
            replicas: 2,
            resources: ResourceSpec {
                cpu_limits: "500m".to_string(),
                cpu_requests: "250m".to_string(),
                memory_limits: "256Mi".to_string(),
                memory_requests: "128Mi".to_string(),
            },
            ports: vec![PortSpec {
                container_port: 8080,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_bundle_names() {
        let names = BundleNames::new("app1");
        assert_eq!(names.deployment, "app1-deployment");
        assert_eq!(names.container, "app1-container");
        assert_eq!(names.service, "app1-deployment-service");
        assert_eq!(names.ingress, "app1-ingress");
        assert_eq!(names.middleware, "strip-app1-deployment-prefix");
        assert_eq!(names.path_prefix, "/app1-deployment");
        assert_eq!(names.labels()["app"], "app1");
    }

    #[test]
    fn test_valid_request() {
        let validated = sample_request().validate().unwrap();
        assert_eq!(validated.primary_port(), 8080);
        assert_eq!(validated.limits["cpu"], Quantity("500m".to_string()));
        assert_eq!(validated.requests["memory"], Quantity("128Mi".to_string()));
    }

    #[test]
    fn test_reports_every_problem() {
        let request = WorkloadRequest {
            replicas: 0,
            ports: vec![PortSpec::default()],
            ..Default::default()
        };
        let Err(Error::Validation(message)) = request.validate() else {
            panic!("expected validation error");
        };
        assert!(message.starts_with("validation failed: ["));
        for needle in [
            "namespace is required",
            "deploymentName is required",
            "image is required",
            "replicas must be greater than 0",
            "resources.cpuLimits is required",
            "resources.memoryRequests is required",
            "ports[0].containerPort",
        ] {
            assert!(message.contains(needle), "missing {:?} in {}", needle, message);
        }
    }

    #[test]
    fn test_rejects_bad_quantity_and_names() {
        let mut request = sample_request();
        request.resources.memory_limits = "lots".to_string();
        request.namespace = "Bad_NS".to_string();
        request.deployment_name = "x".repeat(MAX_WORKLOAD_NAME_LEN + 1);

        let Err(Error::Validation(message)) = request.validate() else {
            panic!("expected validation error");
        };
        assert!(message.contains("resources.memoryLimits"));
        assert!(message.contains("namespace \"Bad_NS\""));
        assert!(message.contains("deploymentName"));
    }

    #[test]
    fn test_dns_label() {
        assert!(is_dns_label("web-1", 63));
        assert!(!is_dns_label("-web", 63));
        assert!(!is_dns_label("web-", 63));
        assert!(!is_dns_label("Web", 63));
        assert!(!is_dns_label("", 63));
        assert!(!is_dns_label("abcd", 3));
    }

    #[test]
    fn test_deserializes_camel_case_body() {
        let json = r#"{
            "namespace": "ns1",
            "deploymentName": "app1",
            "image": "nginx:1.25",
            "replicas": 2,
            "resources": {"cpuLimits": "1", "cpuRequests": "500m", "memoryLimits": "1Gi", "memoryRequests": "512Mi"},
            "ports": [{"containerPort": 8080, "protocol": "TCP"}]
        }"#;
        let request: WorkloadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.deployment_name, "app1");
        assert_eq!(request.ports[0].protocol.as_deref(), Some("TCP"));
        assert!(request.validate().is_ok());
    }
}
