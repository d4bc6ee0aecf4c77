// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::azure::AzureCloud;
    use crate::config::{AzureConfig, Cli, CredentialSource, Settings};
    use crate::errors::ConfigError;
    use crate::rules::Protocol;
    use clap::Parser;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn azure_json() -> serde_json::Value {
        json!({
            "cloud": "AzurePublicCloud",
            "tenantId": "tenant-1",
            "subscriptionId": "sub-1",
            "resourceGroup": "mc_rg",
            "location": "eastus",
            "vnetName": "aks-vnet",
            "vnetResourceGroup": "",
            "subnetName": "aks-subnet",
            "securityGroupName": "aks-agentpool-nsg",
            "aadClientId": "msi",
            "aadClientSecret": "msi",
            "useManagedIdentityExtension": true,
            "userAssignedIdentityID": "uami-1"
        })
    }

    fn write_config(value: &serde_json::Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(value.to_string().as_bytes()).unwrap();
        file
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["hostnet-nsg"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn parse(value: serde_json::Value) -> AzureConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_cli_defaults() {
        let cli = cli(&["--azure-config", "/tmp/azure.json"]);
        assert_eq!(cli.rule_prefix, "hostNetwork");
        assert_eq!(cli.target_label, "updateNSG");
        assert_eq!(cli.cooldown_secs, 10);
        assert_eq!(cli.base_priority, 2000);
        assert_eq!(cli.priority_step, 10);
        assert_eq!(cli.rule_protocol, Protocol::Tcp);
        assert_eq!(cli.metrics_address.to_string(), "0.0.0.0:8080");
        assert_eq!(cli.operation_timeout_secs, 600);
    }

    #[test]
    fn test_cli_protocol_flag() {
        assert_eq!(cli(&["--rule-protocol", "udp"]).rule_protocol, Protocol::Udp);
        assert_eq!(cli(&["--rule-protocol", "any"]).rule_protocol, Protocol::Any);
        assert!(Cli::try_parse_from(["hostnet-nsg", "--rule-protocol", "sctp"]).is_err());
    }

    #[test]
    fn test_load_full_settings() {
        let file = write_config(&azure_json());
        let cli = cli(&[
            "--azure-config",
            file.path().to_str().unwrap(),
            "--cooldown-secs",
            "30",
            "--operation-timeout-secs",
            "120",
        ]);

        let azure = AzureConfig::load(&cli.azure_config).unwrap();
        let settings = Settings::from_parts(&cli, &azure, None).unwrap();

        assert_eq!(settings.subnet.subscription_id, "sub-1");
        assert_eq!(settings.subnet.resource_group, "mc_rg");
        assert_eq!(settings.subnet.virtual_network, "aks-vnet");
        assert_eq!(settings.subnet.subnet, "aks-subnet");
        assert_eq!(settings.cloud, AzureCloud::Public);
        assert_eq!(settings.cooldown, Duration::from_secs(30));
        assert_eq!(settings.poll.timeout, Duration::from_secs(120));
        assert_eq!(settings.rules.prefix, "hostNetwork");
        assert_eq!(settings.marker_label, "updateNSG");
        assert!(settings.credential == CredentialSource::ManagedIdentity {
            client_id: Some("uami-1".to_string())
        });
    }

    #[test]
    fn test_vnet_resource_group_overrides() {
        let mut value = azure_json();
        value["vnetResourceGroup"] = json!("network-rg");
        let subnet = parse(value).subnet().unwrap();
        assert_eq!(subnet.resource_group, "network-rg");
    }

    #[test]
    fn test_missing_identifiers() {
        for field in ["subscriptionId", "resourceGroup", "vnetName", "subnetName"] {
            let mut value = azure_json();
            value[field] = json!("");
            let err = parse(value).subnet().unwrap_err();
            assert!(
                matches!(err, ConfigError::Missing(f) if f == field),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn test_unreadable_and_malformed_files() {
        let Err(err) = AzureConfig::load(std::path::Path::new("/nonexistent/azure.json")) else {
            panic!("loading a missing file must fail");
        };
        assert!(matches!(err, ConfigError::Read { .. }));

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let Err(err) = AzureConfig::load(file.path()) else {
            panic!("loading malformed JSON must fail");
        };
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_cloud_selection() {
        let mut value = azure_json();
        value["cloud"] = json!("AzureChinaCloud");
        assert_eq!(parse(value.clone()).cloud().unwrap(), AzureCloud::China);

        value["cloud"] = json!("AzureUSGovernmentCloud");
        assert_eq!(parse(value.clone()).cloud().unwrap(), AzureCloud::UsGovernment);

        value["cloud"] = json!("");
        assert_eq!(parse(value.clone()).cloud().unwrap(), AzureCloud::Public);

        value["cloud"] = json!("AzureGermanCloud");
        assert!(matches!(
            parse(value).cloud().unwrap_err(),
            ConfigError::Invalid { field: "cloud", .. }
        ));
    }

    #[test]
    fn test_credential_precedence() {
        let mut value = azure_json();
        value["userAssignedIdentityID"] = json!("");
        assert!(
            parse(value.clone()).credential_source(None).unwrap()
                == CredentialSource::ManagedIdentity { client_id: None }
        );

        value["useManagedIdentityExtension"] = json!(false);
        value["aadClientId"] = json!("app-1");
        value["aadClientSecret"] = json!("secret");
        assert!(
            parse(value.clone()).credential_source(Some("env".to_string())).unwrap()
                == CredentialSource::ClientSecret {
                    tenant_id: "tenant-1".to_string(),
                    client_id: "app-1".to_string(),
                    client_secret: "secret".to_string(),
                }
        );

        value["aadClientSecret"] = json!("");
        assert!(
            parse(value.clone()).credential_source(Some("env".to_string())).unwrap()
                == CredentialSource::StaticToken("env".to_string())
        );

        assert!(matches!(
            parse(value).credential_source(None).unwrap_err(),
            ConfigError::NoCredential
        ));
    }

    #[test]
    fn test_client_secret_requires_tenant() {
        let mut value = azure_json();
        value["useManagedIdentityExtension"] = json!(false);
        value["tenantId"] = json!("");
        assert!(matches!(
            parse(value).credential_source(None).unwrap_err(),
            ConfigError::Missing("tenantId")
        ));
    }

    #[test]
    fn test_invalid_flags_are_rejected() {
        let azure = parse(azure_json());
        let cases: &[(&[&str], &str)] = &[
            (&["--rule-prefix", ""], "rule-prefix"),
            (&["--rule-prefix", "host network"], "rule-prefix"),
            (
                &["--rule-prefix", "a-very-long-prefix-that-leaves-no-room-for-names"],
                "rule-prefix",
            ),
            (&["--target-label", ""], "target-label"),
            (&["--base-priority", "99"], "base-priority"),
            (&["--base-priority", "4097"], "base-priority"),
            (&["--priority-step", "0"], "priority-step"),
            (&["--cooldown-secs", "0"], "cooldown-secs"),
            (&["--operation-timeout-secs", "0"], "operation-timeout-secs"),
        ];

        for (args, expected) in cases {
            let err = Settings::from_parts(&cli(args), &azure, None).err().unwrap();
            assert!(
                matches!(err, ConfigError::Invalid { field, .. } if field == *expected),
                "{args:?}: {err}"
            );
        }
    }
}
