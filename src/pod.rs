// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Point-in-time pod views and the target predicate.
//!
//! A [`PodSnapshot`] is built fresh from every watch event or list result and
//! dropped once the filter or synthesis pass consuming it is done.

use crate::constants::TARGET_LABEL_VALUE;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

/// A container port declared by a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredPort {
    /// Port number
    pub port: i32,
    /// Declared protocol (`TCP` when omitted)
    pub protocol: String,
}

/// Immutable view of one pod at event time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PodSnapshot {
    pub namespace: String,
    pub name: String,
    /// Whether the pod shares its node's network namespace
    pub host_network: bool,
    pub labels: BTreeMap<String, String>,
    /// Node the pod is scheduled to, empty until scheduled
    pub node_name: String,
    /// IP of the node, empty until the kubelet reports it
    pub host_ip: String,
    /// Container ports in declaration order
    pub ports: Vec<DeclaredPort>,
}

impl PodSnapshot {
    /// `namespace/name` key for logging and indexing.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for PodSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&Pod> for PodSnapshot {
    fn from(pod: &Pod) -> Self {
        let spec = pod.spec.as_ref();

        let ports = spec
            .map(|s| {
                s.containers
                    .iter()
                    .flat_map(|c| c.ports.iter().flatten())
                    .map(|p| DeclaredPort {
                        port: p.container_port,
                        protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            host_network: spec.and_then(|s| s.host_network).unwrap_or(false),
            labels: pod.labels().clone(),
            node_name: spec.and_then(|s| s.node_name.clone()).unwrap_or_default(),
            host_ip: pod
                .status
                .as_ref()
                .and_then(|s| s.host_ip.clone())
                .unwrap_or_default(),
            ports,
        }
    }
}

/// Whether a pod is a rule-synthesis candidate.
///
/// All three must hold: the pod uses host networking, carries `marker_label`
/// set to `"true"`, and has been assigned to a node.
#[must_use]
pub fn is_target(pod: &PodSnapshot, marker_label: &str) -> bool {
    pod.host_network
        && pod.labels.get(marker_label).map(String::as_str) == Some(TARGET_LABEL_VALUE)
        && !pod.node_name.is_empty()
}

#[cfg(test)]
#[path = "pod_tests.rs"]
mod pod_tests;
