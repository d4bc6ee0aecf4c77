// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Azure API request and response models.
//!
//! Only the fields this controller reads are modeled; the rest are carried in
//! flattened `extra` maps so that a fetched NSG can be written back unchanged
//! apart from its rule collection.

use crate::rules::FirewallRule;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============================================================================
// Network security groups
// ============================================================================

/// Network security group resource.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Required on write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub properties: SecurityGroupProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Network security group properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupProperties {
    /// Custom rules; ARM's default rules live in `defaultSecurityRules`
    #[serde(default)]
    pub security_rules: Vec<FirewallRule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Subnets
// ============================================================================

/// Virtual network subnet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub properties: SubnetProperties,
}

/// Subnet properties.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetProperties {
    pub network_security_group: Option<SubResource>,
}

/// Reference to another resource.
#[derive(Debug, Clone, Deserialize)]
pub struct SubResource {
    pub id: String,
}

// ============================================================================
// Long-running operations and errors
// ============================================================================

/// Body returned by an `Azure-AsyncOperation` status URL.
#[derive(Debug, Clone, Deserialize)]
pub struct AsyncOperationStatus {
    /// `InProgress`, `Succeeded`, `Failed` or `Canceled`
    pub status: String,
    pub error: Option<ArmErrorDetail>,
}

/// ARM error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmErrorResponse {
    pub error: ArmErrorDetail,
}

/// ARM error detail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArmErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
