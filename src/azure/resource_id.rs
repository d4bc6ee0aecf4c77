// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ARM resource identifiers.

use crate::errors::NetworkError;
use std::fmt;
use std::str::FromStr;

/// Parsed top-level resource id of the form
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{provider}/{type}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    /// Resource provider namespace, e.g. `Microsoft.Network`
    pub provider: String,
    /// Resource type, e.g. `networkSecurityGroups`
    pub resource_type: String,
    pub name: String,
}

impl ResourceId {
    /// Id of a network security group.
    #[must_use]
    pub fn security_group(subscription_id: &str, resource_group: &str, name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            provider: "Microsoft.Network".to_string(),
            resource_type: "networkSecurityGroups".to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription_id, self.resource_group, self.provider, self.resource_type, self.name
        )
    }
}

impl FromStr for ResourceId {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NetworkError::InvalidResourceId(s.to_string());

        let segments: Vec<&str> = s.trim_end_matches('/').split('/').collect();
        let ["", subscriptions, subscription_id, resource_groups, resource_group, providers, provider, resource_type, name] =
            segments.as_slice()
        else {
            return Err(invalid());
        };

        let keywords_match = subscriptions.eq_ignore_ascii_case("subscriptions")
            && resource_groups.eq_ignore_ascii_case("resourceGroups")
            && providers.eq_ignore_ascii_case("providers");
        let parts = [subscription_id, resource_group, provider, resource_type, name];
        if !keywords_match || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }

        Ok(Self {
            subscription_id: (*subscription_id).to_string(),
            resource_group: (*resource_group).to_string(),
            provider: (*provider).to_string(),
            resource_type: (*resource_type).to_string(),
            name: (*name).to_string(),
        })
    }
}

/// Subnet whose NSG this controller manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRef {
    pub subscription_id: String,
    /// Resource group of the virtual network
    pub resource_group: String,
    pub virtual_network: String,
    pub subnet: String,
}

impl SubnetRef {
    /// ARM path of the subnet.
    #[must_use]
    pub fn path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
            self.subscription_id, self.resource_group, self.virtual_network, self.subnet
        )
    }
}

impl fmt::Display for SubnetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.virtual_network, self.subnet)
    }
}

#[cfg(test)]
#[path = "resource_id_tests.rs"]
mod resource_id_tests;
