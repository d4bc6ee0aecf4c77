// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Azure Resource Manager integration.
//!
//! This module talks to ARM over plain REST with `reqwest`:
//!
//! - [`client`] - subnet lookup, NSG read, NSG write with long-running-operation polling
//! - [`credential`] - bearer tokens from managed identity, a service principal, or the environment
//! - [`models`] - request/response models for the `Microsoft.Network` resources used here
//! - [`poller`] - polling cadence for long-running operations
//! - [`resource_id`] - parsing and formatting of ARM resource ids

pub mod client;
pub mod credential;
pub mod models;
pub mod poller;
pub mod resource_id;

pub use client::ArmClient;
pub use models::{SecurityGroup, SecurityGroupProperties, Subnet};
pub use resource_id::{ResourceId, SubnetRef};

use std::str::FromStr;

/// Azure cloud environment selected by the `cloud` field of `azure.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AzureCloud {
    #[default]
    Public,
    China,
    UsGovernment,
}

impl AzureCloud {
    /// Azure Resource Manager endpoint.
    #[must_use]
    pub fn resource_manager_endpoint(self) -> &'static str {
        match self {
            Self::Public => "https://management.azure.com",
            Self::China => "https://management.chinacloudapi.cn",
            Self::UsGovernment => "https://management.usgovcloudapi.net",
        }
    }

    /// Microsoft Entra ID authority host.
    #[must_use]
    pub fn authority_host(self) -> &'static str {
        match self {
            Self::Public => "https://login.microsoftonline.com",
            Self::China => "https://login.chinacloudapi.cn",
            Self::UsGovernment => "https://login.microsoftonline.us",
        }
    }
}

impl FromStr for AzureCloud {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "azurepubliccloud" => Ok(Self::Public),
            "azurechinacloud" => Ok(Self::China),
            "azureusgovernmentcloud" => Ok(Self::UsGovernment),
            other => Err(format!("unsupported cloud '{other}'")),
        }
    }
}
