// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `pod.rs`

#[cfg(test)]
mod tests {
    use crate::pod::{is_target, DeclaredPort, PodSnapshot};
    use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    const LABEL: &str = "updateNSG";

    fn target_snapshot() -> PodSnapshot {
        PodSnapshot {
            namespace: "ns".to_string(),
            name: "app1".to_string(),
            host_network: true,
            labels: BTreeMap::from([(LABEL.to_string(), "true".to_string())]),
            node_name: "node1".to_string(),
            host_ip: "10.0.0.5".to_string(),
            ports: vec![],
        }
    }

    #[test]
    fn test_target_when_all_conditions_hold() {
        assert!(is_target(&target_snapshot(), LABEL));
    }

    #[test]
    fn test_not_target_without_host_network() {
        let pod = PodSnapshot {
            host_network: false,
            ..target_snapshot()
        };
        assert!(!is_target(&pod, LABEL));
    }

    #[test]
    fn test_not_target_without_marker() {
        let pod = PodSnapshot {
            labels: BTreeMap::new(),
            ..target_snapshot()
        };
        assert!(!is_target(&pod, LABEL));
    }

    #[test]
    fn test_not_target_when_marker_not_literal_true() {
        for value in ["false", "True", "yes", ""] {
            let pod = PodSnapshot {
                labels: BTreeMap::from([(LABEL.to_string(), value.to_string())]),
                ..target_snapshot()
            };
            assert!(!is_target(&pod, LABEL), "marker value {value:?}");
        }
    }

    #[test]
    fn test_not_target_when_unscheduled() {
        let pod = PodSnapshot {
            node_name: String::new(),
            ..target_snapshot()
        };
        assert!(!is_target(&pod, LABEL));
    }

    #[test]
    fn test_target_ignores_host_ip() {
        // A scheduled pod without a reported host IP is still a target;
        // synthesis decides whether it can produce a rule.
        let pod = PodSnapshot {
            host_ip: String::new(),
            ..target_snapshot()
        };
        assert!(is_target(&pod, LABEL));
    }

    #[test]
    fn test_snapshot_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("app1".to_string()),
                namespace: Some("ns".to_string()),
                labels: Some(BTreeMap::from([(LABEL.to_string(), "true".to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                host_network: Some(true),
                node_name: Some("node1".to_string()),
                containers: vec![
                    Container {
                        name: "web".to_string(),
                        ports: Some(vec![ContainerPort {
                            container_port: 8080,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    },
                    Container {
                        name: "dns".to_string(),
                        ports: Some(vec![ContainerPort {
                            container_port: 53,
                            protocol: Some("UDP".to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            status: Some(PodStatus {
                host_ip: Some("10.0.0.5".to_string()),
                ..Default::default()
            }),
        };

        let snapshot = PodSnapshot::from(&pod);

        assert_eq!(snapshot.key(), "ns/app1");
        assert!(snapshot.host_network);
        assert_eq!(snapshot.node_name, "node1");
        assert_eq!(snapshot.host_ip, "10.0.0.5");
        assert_eq!(
            snapshot.ports,
            vec![
                DeclaredPort {
                    port: 8080,
                    protocol: "TCP".to_string()
                },
                DeclaredPort {
                    port: 53,
                    protocol: "UDP".to_string()
                },
            ]
        );
        assert!(is_target(&snapshot, LABEL));
    }

    #[test]
    fn test_snapshot_from_empty_pod() {
        let snapshot = PodSnapshot::from(&Pod::default());
        assert!(!snapshot.host_network);
        assert!(snapshot.node_name.is_empty());
        assert!(snapshot.host_ip.is_empty());
        assert!(snapshot.ports.is_empty());
        assert!(!is_target(&snapshot, LABEL));
    }
}
