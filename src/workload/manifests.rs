//! Object manifests for a workload bundle
//!
//! Pure constructors: nothing here talks to a cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, ResourceRequirements, Secret, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use serde_json::json;

use super::{ValidatedWorkload, TLS_SECRET_NAME};
use crate::cluster::kube_api::middleware_resource;
use crate::cluster::DomainConfig;

pub const ENTRYPOINTS_ANNOTATION: &str = "traefik.ingress.kubernetes.io/router.entrypoints";
pub const TLS_ANNOTATION: &str = "traefik.ingress.kubernetes.io/router.tls";
pub const MIDDLEWARES_ANNOTATION: &str = "traefik.ingress.kubernetes.io/router.middlewares";

fn meta(name: &str, namespace: &str, labels: Option<BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels,
        ..Default::default()
    }
}

/// `kubernetes.io/tls` secret named `cert` holding the domain's TLS pair
pub fn tls_secret(namespace: &str, domain: &DomainConfig) -> Secret {
    Secret {
        metadata: meta(TLS_SECRET_NAME, namespace, None),
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(BTreeMap::from([
            (
                "tls.crt".to_string(),
                ByteString(domain.certificate.clone()),
            ),
            (
                "tls.key".to_string(),
                ByteString(domain.private_key.clone()),
            ),
        ])),
        ..Default::default()
    }
}

pub fn deployment(workload: &ValidatedWorkload) -> Deployment {
    let names = &workload.names;
    let labels = names.labels();

    let ports = workload
        .ports
        .iter()
        .map(|p| ContainerPort {
            container_port: p.container_port,
            name: p.name.clone(),
            protocol: p.protocol.clone(),
            ..Default::default()
        })
        .collect();

    Deployment {
        metadata: meta(&names.deployment, &workload.namespace, Some(labels.clone())),
        spec: Some(DeploymentSpec {
            replicas: Some(workload.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: names.container.clone(),
                        image: Some(workload.image.clone()),
                        ports: Some(ports),
                        resources: Some(ResourceRequirements {
                            limits: Some(workload.limits.clone()),
                            requests: Some(workload.requests.clone()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ClusterIP service forwarding the primary port
pub fn service(workload: &ValidatedWorkload) -> Service {
    let names = &workload.names;
    let port = workload.primary_port();

    Service {
        metadata: meta(&names.service, &workload.namespace, Some(names.labels())),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(names.labels()),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Traefik middleware stripping the workload's path prefix
pub fn middleware(workload: &ValidatedWorkload) -> DynamicObject {
    let names = &workload.names;
    DynamicObject::new(&names.middleware, &middleware_resource())
        .within(&workload.namespace)
        .data(json!({
            "spec": {
                "stripPrefixRegex": {
                    "regex": [format!("^{}", names.path_prefix)]
                }
            }
        }))
}

/// Traefik ingress routing `https://<domain>/<name>-deployment` to the service
pub fn ingress(workload: &ValidatedWorkload, domain: &DomainConfig) -> Ingress {
    let names = &workload.names;
    let annotations = BTreeMap::from([
        (ENTRYPOINTS_ANNOTATION.to_string(), "websecure".to_string()),
        (TLS_ANNOTATION.to_string(), "true".to_string()),
        (
            MIDDLEWARES_ANNOTATION.to_string(),
            format!("{}-{}@kubernetescrd", workload.namespace, names.middleware),
        ),
    ]);

    Ingress {
        metadata: ObjectMeta {
            annotations: Some(annotations),
            ..meta(&names.ingress, &workload.namespace, None)
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(domain.domain.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(names.path_prefix.clone()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: names.service.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(workload.primary_port()),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![domain.domain.clone()]),
                secret_name: Some(TLS_SECRET_NAME.to_string()),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
