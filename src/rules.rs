// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Security rule model, rule synthesis and merge.
//!
//! [`FirewallRule`] mirrors the Azure Resource Manager `securityRules` JSON shape.
//! Fields this controller does not model are kept in flattened `extra` maps so
//! that rules owned by someone else round-trip unchanged.
//!
//! # Ownership
//!
//! Every rule this controller creates is named `<prefix>-<namespace>-<pod>`.
//! Any remote rule whose name starts with `<prefix>-` is considered
//! owned and is regenerated from scratch on every pass; every other rule is
//! foreign and is never edited.
//!
//! # Example
//!
//! ```rust
//! use hostnet_nsg::rules::{merge, synthesize, RuleSettings};
//!
//! let settings = RuleSettings::default();
//! let desired = synthesize(&[], &settings);
//! let merged = merge(Vec::new(), &desired.rules, &settings.prefix).unwrap();
//! assert!(merged.is_empty());
//! ```

use crate::constants::{
    ANY, DEFAULT_BASE_PRIORITY, DEFAULT_PRIORITY_STEP, DEFAULT_RULE_PREFIX, MAX_RULE_NAME_LEN,
    MAX_RULE_PRIORITY, MIN_RULE_PRIORITY, RULE_NAME_DIGEST_LEN,
};
use crate::errors::RuleError;
use crate::pod::PodSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Network protocol a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
    Esp,
    Ah,
    #[serde(rename = "*")]
    Any,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tcp => "Tcp",
            Self::Udp => "Udp",
            Self::Icmp => "Icmp",
            Self::Esp => "Esp",
            Self::Ah => "Ah",
            Self::Any => "*",
        };
        f.write_str(s)
    }
}

impl Protocol {
    /// Whether a rule with this protocol admits traffic for a container port
    /// declared with `declared` (`TCP`, `UDP`, `SCTP`).
    #[must_use]
    pub fn covers(self, declared: &str) -> bool {
        self == Self::Any || declared.parse::<Self>().is_ok_and(|p| p == self)
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            "esp" => Ok(Self::Esp),
            "ah" => Ok(Self::Ah),
            "any" | "*" => Ok(Self::Any),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

/// Whether matching traffic is allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Allow,
    Deny,
}

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("Inbound"),
            Self::Outbound => f.write_str("Outbound"),
        }
    }
}

/// Properties of a security rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleProperties {
    pub protocol: Protocol,
    pub access: Access,
    pub direction: Direction,
    /// Lower values are evaluated first
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_address_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_port_ranges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_address_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_port_ranges: Vec<String>,
    /// Read-only, reported by ARM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One named, prioritized security rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    /// Unique within the rule collection
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub properties: RuleProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FirewallRule {
    /// Build an inbound allow rule from any source to `destination` on `ports`.
    #[must_use]
    pub fn inbound_allow(
        name: String,
        priority: i32,
        protocol: Protocol,
        destination: String,
        ports: Vec<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            name,
            id: None,
            etag: None,
            properties: RuleProperties {
                protocol,
                access: Access::Allow,
                direction: Direction::Inbound,
                priority,
                description,
                source_address_prefix: Some(ANY.to_string()),
                source_address_prefixes: Vec::new(),
                source_port_range: Some(ANY.to_string()),
                source_port_ranges: Vec::new(),
                destination_address_prefix: Some(destination),
                destination_address_prefixes: Vec::new(),
                destination_port_range: None,
                destination_port_ranges: ports,
                provisioning_state: None,
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    /// Whether this rule lives in the reserved namespace `prefix`.
    ///
    /// The separator is part of the namespace, so `hostNetworkAdmin` is not
    /// owned under the prefix `hostNetwork`.
    #[must_use]
    pub fn is_owned(&self, prefix: &str) -> bool {
        self.name
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Compare the user-settable parts of two rules.
    ///
    /// Read-only fields reported by ARM (`id`, `etag`, `provisioningState`) and
    /// unmodeled extras are ignored.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        self.name == other.name && self.properties.definition() == other.properties.definition()
    }
}

impl RuleProperties {
    fn definition(&self) -> Self {
        Self {
            provisioning_state: None,
            extra: Map::new(),
            ..self.clone()
        }
    }
}

/// Parameters that shape synthesized rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSettings {
    /// Reserved name prefix marking rules owned by this controller
    pub prefix: String,
    /// Priority of the first synthesized rule
    pub base_priority: i32,
    /// Gap between consecutive priorities
    pub priority_step: i32,
    /// Protocol of every synthesized rule
    pub protocol: Protocol,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_RULE_PREFIX.to_string(),
            base_priority: DEFAULT_BASE_PRIORITY,
            priority_step: DEFAULT_PRIORITY_STEP,
            protocol: Protocol::Tcp,
        }
    }
}

/// Why a target pod produced no rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The kubelet has not reported a host IP yet
    NoHostIp,
    /// The pod declares no container ports
    NoPorts,
}

impl SkipReason {
    /// Metric label for this reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoHostIp => "no_host_ip",
            Self::NoPorts => "no_ports",
        }
    }
}

/// A target pod excluded from one synthesis pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPod {
    /// `namespace/name`
    pub pod: String,
    pub reason: SkipReason,
}

/// Rules synthesized in one pass, plus the pods that were skipped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesiredRuleSet {
    pub rules: Vec<FirewallRule>,
    pub skipped: Vec<SkippedPod>,
}

/// Deterministic rule name for a pod.
///
/// Names longer than ARM's limit are cut and suffixed with a digest of the
/// full name, so the same pod always maps to the same rule.
#[must_use]
pub fn rule_name(prefix: &str, namespace: &str, name: &str) -> String {
    let full = format!("{prefix}-{namespace}-{name}");
    if full.chars().count() <= MAX_RULE_NAME_LEN {
        return full;
    }

    let digest = Sha256::digest(full.as_bytes());
    let suffix: String = digest
        .iter()
        .take(RULE_NAME_DIGEST_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect();
    let head: String = full
        .chars()
        .take(MAX_RULE_NAME_LEN - RULE_NAME_DIGEST_LEN - 1)
        .collect();
    format!("{head}-{suffix}")
}

/// Synthesize the desired rule set for the given candidate pods.
///
/// Pods are processed in input order. Priorities are `base + step * k` where
/// `k` counts emitted rules, so skipped pods leave no gaps. A pod without a
/// host IP or without ports is skipped and the rest are still processed.
#[must_use]
pub fn synthesize(pods: &[PodSnapshot], settings: &RuleSettings) -> DesiredRuleSet {
    let mut desired = DesiredRuleSet::default();

    for pod in pods {
        if pod.host_ip.is_empty() {
            warn!(pod = %pod, "Skipping pod without host IP");
            desired.skipped.push(SkippedPod {
                pod: pod.key(),
                reason: SkipReason::NoHostIp,
            });
            continue;
        }

        let mut seen = HashSet::new();
        let ports: Vec<String> = pod
            .ports
            .iter()
            .filter(|p| seen.insert(p.port))
            .map(|p| p.port.to_string())
            .collect();

        for port in pod.ports.iter().filter(|p| !settings.protocol.covers(&p.protocol)) {
            warn!(
                pod = %pod,
                port = port.port,
                declared = %port.protocol,
                rule_protocol = %settings.protocol,
                "Container port protocol is not covered by the rule protocol"
            );
        }

        if ports.is_empty() {
            warn!(pod = %pod, "Skipping pod without declared container ports");
            desired.skipped.push(SkippedPod {
                pod: pod.key(),
                reason: SkipReason::NoPorts,
            });
            continue;
        }

        let k = i64::try_from(desired.rules.len()).unwrap_or(i64::MAX);
        let priority = i64::from(settings.base_priority)
            .saturating_add(i64::from(settings.priority_step).saturating_mul(k));
        let priority = i32::try_from(priority).unwrap_or(i32::MAX);

        let name = rule_name(&settings.prefix, &pod.namespace, &pod.name);
        debug!(
            pod = %pod,
            rule = %name,
            priority,
            destination = %pod.host_ip,
            ports = ?ports,
            "Synthesized rule"
        );

        desired.rules.push(FirewallRule::inbound_allow(
            name,
            priority,
            settings.protocol,
            pod.host_ip.clone(),
            ports,
            Some(format!("hostNetwork for pod {pod}")),
        ));
    }

    desired
}

/// Merge the remote rule collection with the desired rules.
///
/// Foreign rules (names outside `prefix`) are kept unchanged and in order,
/// owned rules are dropped, and `desired` is appended.
///
/// # Errors
///
/// Returns [`RuleError`] when the merged collection contains duplicate names,
/// duplicate priorities within one direction, or an owned rule whose priority
/// ARM would reject. Collisions are never resolved by editing a foreign rule.
pub fn merge(
    remote: Vec<FirewallRule>,
    desired: &[FirewallRule],
    prefix: &str,
) -> Result<Vec<FirewallRule>, RuleError> {
    let mut merged: Vec<FirewallRule> = remote
        .into_iter()
        .filter(|rule| !rule.is_owned(prefix))
        .collect();
    merged.extend_from_slice(desired);

    validate(&merged, prefix)?;
    Ok(merged)
}

fn validate(rules: &[FirewallRule], prefix: &str) -> Result<(), RuleError> {
    let mut names = HashSet::new();
    let mut priorities: HashMap<(Direction, i32), &str> = HashMap::new();

    for rule in rules {
        if !names.insert(rule.name.as_str()) {
            return Err(RuleError::DuplicateName(rule.name.clone()));
        }

        let priority = rule.properties.priority;
        if rule.is_owned(prefix) && !(MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY).contains(&priority) {
            return Err(RuleError::PriorityOutOfRange {
                name: rule.name.clone(),
                priority,
            });
        }

        let direction = rule.properties.direction;
        if let Some(first) = priorities.insert((direction, priority), rule.name.as_str()) {
            return Err(RuleError::DuplicatePriority {
                priority,
                direction: direction.to_string(),
                first: first.to_string(),
                second: rule.name.clone(),
            });
        }
    }

    Ok(())
}

/// Whether two rule collections would produce the same NSG.
#[must_use]
pub fn same_rules(current: &[FirewallRule], next: &[FirewallRule]) -> bool {
    current.len() == next.len()
        && current
            .iter()
            .zip(next)
            .all(|(a, b)| a.same_definition(b))
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod rules_tests;
