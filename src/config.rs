// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration.
//!
//! Settings come from two places:
//!
//! - command-line flags, each with an environment variable fallback ([`Cli`])
//! - the cloud-provider-azure `azure.json` file already present on AKS nodes ([`AzureConfig`])
//!
//! [`Settings::from_parts`] validates both and produces everything `main`
//! needs. Any problem is a [`ConfigError`] and aborts startup.

use crate::azure::credential::{
    CachedCredential, ClientSecretCredential, ManagedIdentityCredential, StaticTokenCredential,
    TokenCredential,
};
use crate::azure::poller::PollSettings;
use crate::azure::{AzureCloud, SubnetRef};
use crate::constants::{
    ACCESS_TOKEN_ENV, DEFAULT_AZURE_CONFIG_PATH, DEFAULT_BASE_PRIORITY, DEFAULT_COOLDOWN_SECS,
    DEFAULT_METRICS_ADDRESS, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_PRIORITY_STEP,
    DEFAULT_RULE_PREFIX, DEFAULT_TARGET_LABEL, MAX_RULE_PRIORITY, MIN_RULE_PRIORITY,
};
use crate::errors::ConfigError;
use crate::rules::{Protocol, RuleSettings};
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Longest accepted rule prefix, leaving room for namespace and pod name.
const MAX_RULE_PREFIX_LEN: usize = 40;

/// Command-line flags.
#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a kubeconfig file (in-cluster or default config when omitted)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Path to the cloud-provider-azure configuration file
    #[arg(long, env = "AZURE_CONFIG_FILE", default_value = DEFAULT_AZURE_CONFIG_PATH)]
    pub azure_config: PathBuf,

    /// Reserved name prefix of rules managed by this controller
    #[arg(long, env = "RULE_PREFIX", default_value = DEFAULT_RULE_PREFIX)]
    pub rule_prefix: String,

    /// Label key pods set to "true" to opt in
    #[arg(long, env = "TARGET_LABEL", default_value = DEFAULT_TARGET_LABEL)]
    pub target_label: String,

    /// Minimum seconds between two NSG updates
    #[arg(long, env = "COOLDOWN_SECS", default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub cooldown_secs: u64,

    /// Priority of the first managed rule
    #[arg(long, env = "BASE_PRIORITY", default_value_t = DEFAULT_BASE_PRIORITY)]
    pub base_priority: i32,

    /// Gap between priorities of consecutive managed rules
    #[arg(long, env = "PRIORITY_STEP", default_value_t = DEFAULT_PRIORITY_STEP)]
    pub priority_step: i32,

    /// Protocol of managed rules (tcp, udp or any)
    #[arg(long, env = "RULE_PROTOCOL", default_value = "tcp")]
    pub rule_protocol: Protocol,

    /// Address of the metrics and health endpoint
    #[arg(long, env = "METRICS_ADDRESS", default_value = DEFAULT_METRICS_ADDRESS)]
    pub metrics_address: SocketAddr,

    /// Seconds to wait for an NSG write to complete
    #[arg(long, env = "OPERATION_TIMEOUT_SECS", default_value_t = DEFAULT_OPERATION_TIMEOUT_SECS)]
    pub operation_timeout_secs: u64,
}

/// Subset of the cloud-provider-azure `azure.json` file.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureConfig {
    pub cloud: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub vnet_name: String,
    /// Resource group of the virtual network when it differs from `resource_group`
    pub vnet_resource_group: String,
    pub subnet_name: String,
    pub aad_client_id: String,
    pub aad_client_secret: String,
    pub use_managed_identity_extension: bool,
    #[serde(rename = "userAssignedIdentityID")]
    pub user_assigned_identity_id: String,
}

impl AzureConfig {
    /// Read and parse an `azure.json` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The subnet whose NSG is managed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when an identifier is empty.
    pub fn subnet(&self) -> Result<SubnetRef, ConfigError> {
        let subscription_id = required(&self.subscription_id, "subscriptionId")?;
        let resource_group = required(&self.resource_group, "resourceGroup")?;
        let virtual_network = required(&self.vnet_name, "vnetName")?;
        let subnet = required(&self.subnet_name, "subnetName")?;

        let vnet_group = if self.vnet_resource_group.trim().is_empty() {
            resource_group
        } else {
            self.vnet_resource_group.trim().to_string()
        };

        Ok(SubnetRef {
            subscription_id,
            resource_group: vnet_group,
            virtual_network,
            subnet,
        })
    }

    /// Cloud environment named by the `cloud` field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown cloud.
    pub fn cloud(&self) -> Result<AzureCloud, ConfigError> {
        self.cloud
            .trim()
            .parse::<AzureCloud>()
            .map_err(|reason| ConfigError::Invalid {
                field: "cloud",
                reason,
            })
    }

    /// Pick a credential source.
    ///
    /// Managed identity wins, then a service principal secret, then a token
    /// from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoCredential`] when none is configured.
    pub fn credential_source(
        &self,
        env_token: Option<String>,
    ) -> Result<CredentialSource, ConfigError> {
        if self.use_managed_identity_extension {
            let client_id = Some(self.user_assigned_identity_id.trim())
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            return Ok(CredentialSource::ManagedIdentity { client_id });
        }

        if !self.aad_client_id.is_empty() && !self.aad_client_secret.is_empty() {
            return Ok(CredentialSource::ClientSecret {
                tenant_id: required(&self.tenant_id, "tenantId")?,
                client_id: self.aad_client_id.clone(),
                client_secret: self.aad_client_secret.clone(),
            });
        }

        match env_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => Ok(CredentialSource::StaticToken(token)),
            None => Err(ConfigError::NoCredential),
        }
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Missing(field));
    }
    Ok(value.to_string())
}

/// Where ARM tokens come from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Node identity via IMDS, optionally a user-assigned identity
    ManagedIdentity { client_id: Option<String> },
    /// Service principal with a client secret
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// Pre-issued token from the environment
    StaticToken(String),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
            Self::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::StaticToken(_) => f.debug_tuple("StaticToken").field(&"<redacted>").finish(),
        }
    }
}

impl CredentialSource {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ManagedIdentity { .. } => "managed-identity",
            Self::ClientSecret { .. } => "client-secret",
            Self::StaticToken(_) => "static-token",
        }
    }

    /// Build a caching credential for `cloud`.
    #[must_use]
    pub fn into_credential(
        self,
        cloud: AzureCloud,
        client: reqwest::Client,
    ) -> Arc<dyn TokenCredential> {
        let resource = cloud.resource_manager_endpoint();
        match self {
            Self::ManagedIdentity { client_id } => Arc::new(CachedCredential::new(
                ManagedIdentityCredential::new(client, resource, client_id),
            )),
            Self::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => Arc::new(CachedCredential::new(ClientSecretCredential::new(
                client,
                cloud.authority_host(),
                &tenant_id,
                client_id,
                client_secret,
                resource,
            ))),
            Self::StaticToken(token) => Arc::new(StaticTokenCredential::new(token)),
        }
    }
}

/// Validated settings for one controller process.
pub struct Settings {
    pub kubeconfig: Option<PathBuf>,
    pub subnet: SubnetRef,
    pub cloud: AzureCloud,
    pub credential: CredentialSource,
    pub marker_label: String,
    pub rules: RuleSettings,
    pub cooldown: Duration,
    pub metrics_address: SocketAddr,
    pub poll: PollSettings,
}

impl Settings {
    /// Load `azure.json` named by the flags and validate everything.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let azure = AzureConfig::load(&cli.azure_config)?;
        Self::from_parts(cli, &azure, std::env::var(ACCESS_TOKEN_ENV).ok())
    }

    /// Validate flags and an already parsed `azure.json`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn from_parts(
        cli: &Cli,
        azure: &AzureConfig,
        env_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let prefix = cli.rule_prefix.as_str();
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "rule-prefix",
                reason: "must be non-empty and contain no whitespace".to_string(),
            });
        }
        if prefix.chars().count() > MAX_RULE_PREFIX_LEN {
            return Err(ConfigError::Invalid {
                field: "rule-prefix",
                reason: format!("must be at most {MAX_RULE_PREFIX_LEN} characters"),
            });
        }

        let label = cli.target_label.as_str();
        if label.is_empty() || label.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "target-label",
                reason: "must be non-empty and contain no whitespace".to_string(),
            });
        }

        if !(MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY).contains(&cli.base_priority) {
            return Err(ConfigError::Invalid {
                field: "base-priority",
                reason: format!("must be within {MIN_RULE_PRIORITY}..={MAX_RULE_PRIORITY}"),
            });
        }
        if cli.priority_step < 1 {
            return Err(ConfigError::Invalid {
                field: "priority-step",
                reason: "must be at least 1".to_string(),
            });
        }
        if cli.cooldown_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "cooldown-secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if cli.operation_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "operation-timeout-secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            kubeconfig: cli.kubeconfig.clone(),
            subnet: azure.subnet()?,
            cloud: azure.cloud()?,
            credential: azure.credential_source(env_token)?,
            marker_label: label.to_string(),
            rules: RuleSettings {
                prefix: prefix.to_string(),
                base_priority: cli.base_priority,
                priority_step: cli.priority_step,
                protocol: cli.rule_protocol,
            },
            cooldown: Duration::from_secs(cli.cooldown_secs),
            metrics_address: cli.metrics_address,
            poll: PollSettings {
                timeout: Duration::from_secs(cli.operation_timeout_secs),
                ..PollSettings::default()
            },
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
