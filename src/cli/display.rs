//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use k8s_openapi::api::apps::v1::Deployment;

use super::commands::ContextInfo;
use crate::cluster::ClusterInfo;
use crate::server::handlers::pods::PodList;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    let mut push_row = |cells: Vec<String>| {
        let line: Vec<String> = cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(&width) => format!("{:width$}", cell, width = width),
                None => cell,
            })
            .collect();
        output.push_str(line.join("   ").trim_end());
        output.push('\n');
    };

    push_row(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        push_row(row);
    }

    output
}

fn or_none(value: Option<&str>) -> String {
    value.unwrap_or("<none>").to_string()
}

// ============================================================================
// Context display
// ============================================================================

pub fn format_context_list(contexts: &[ContextInfo]) -> String {
    let headers = &["", "NAME", "URL", "CLUSTER"];
    let rows: Vec<Vec<String>> = contexts
        .iter()
        .map(|ctx| {
            vec![
                if ctx.is_current { "*" } else { " " }.to_string(),
                ctx.name.clone(),
                ctx.url.clone(),
                or_none(ctx.cluster.as_deref()),
            ]
        })
        .collect();

    format_table(headers, rows)
}

pub fn format_current_context(name: &str, url: &str) -> String {
    format!("Current context: {} ({})\n", name, url)
}

// ============================================================================
// Cluster display
// ============================================================================

pub fn format_cluster_list(clusters: &[ClusterInfo]) -> String {
    let headers = &["NAME", "SERVER", "VERSION", "DEFAULT NAMESPACE"];
    let rows = clusters
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.server.clone(),
                c.k8s_version.clone(),
                or_none(c.default_namespace.as_deref()),
            ]
        })
        .collect();

    format_table(headers, rows)
}

pub fn format_cluster_detail(cluster: &ClusterInfo) -> String {
    format!(
        "Name:              {}\nServer:            {}\nVersion:           {}\nDefault namespace: {}\n",
        cluster.name,
        cluster.server,
        cluster.k8s_version,
        or_none(cluster.default_namespace.as_deref()),
    )
}

// ============================================================================
// Workload display
// ============================================================================

/// One-line summary of a freshly provisioned deployment
pub fn format_deployment_created(deployment: &Deployment) -> String {
    let meta = &deployment.metadata;
    let replicas = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    format!(
        "deployment {}/{} created ({} replicas)\n",
        or_none(meta.namespace.as_deref()),
        or_none(meta.name.as_deref()),
        replicas
    )
}

pub fn format_pod_list(list: &PodList) -> String {
    let headers = &["NAME", "STATUS", "RESTART POLICY", "STARTED"];
    let rows = list
        .pods
        .iter()
        .map(|pod| {
            vec![
                pod.name.clone(),
                or_none(pod.status.as_deref()),
                or_none(pod.restart_policy.as_deref()),
                pod.start_time
                    .as_ref()
                    .map(|t| t.0.to_rfc3339())
                    .unwrap_or_else(|| "<none>".to_string()),
            ]
        })
        .collect();

    format_table(headers, rows)
}
