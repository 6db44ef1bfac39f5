// SPDX-License-Identifier: MIT
//! Deployment environment detection from the Kubernetes service account namespace.
use std::fs;

const NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Environment name derived from the pod namespace, `"development"` outside a cluster.
pub fn detect_environment() -> &'static str {
    match fs::read_to_string(NAMESPACE_FILE) {
        Ok(namespace) => environment_for_namespace(namespace.trim()),
        Err(e) => {
            tracing::debug!(error = %e, "no kubernetes namespace, assuming development");
            "development"
        }
    }
}

/// Map a namespace to an environment name. Later matches take precedence.
pub fn environment_for_namespace(namespace: &str) -> &'static str {
    let mut environment = "development";
    if namespace.contains("prod") {
        environment = "production";
    }
    if namespace.contains("test") {
        environment = "testing";
    }
    if namespace.contains("staging") {
        environment = "staging";
    }
    environment
}
