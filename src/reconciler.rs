// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! One reconcile pass: pods → desired rules → merged NSG → write.
//!
//! The pass talks to its two collaborators through traits so that the
//! orchestration can be exercised without a cluster or a cloud account:
//!
//! - [`PodSource`] - point-in-time list of opted-in pods
//! - [`NetworkProvider`] - subnet → NSG lookup, NSG read and NSG write
//!
//! Nothing is cached between passes. Any failure aborts the pass and leaves no
//! partial state behind; the coalescer retries from scratch later.

use crate::azure::{ResourceId, SecurityGroup, SubnetRef};
use crate::errors::{NetworkError, ReconcileError};
use crate::metrics;
use crate::pod::{is_target, PodSnapshot};
use crate::rules::{merge, same_rules, synthesize, RuleSettings};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

/// Source of candidate pods.
#[async_trait]
pub trait PodSource: Send + Sync {
    /// List pods carrying the opt-in label.
    async fn list_target_pods(&self) -> Result<Vec<PodSnapshot>, kube::Error>;
}

/// Cloud network collaborator.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Resolve the NSG attached to `subnet`.
    async fn resolve_security_group(&self, subnet: &SubnetRef) -> Result<ResourceId, NetworkError>;

    /// Fetch the NSG, including its full rule collection.
    async fn get_security_group(&self, id: &ResourceId) -> Result<SecurityGroup, NetworkError>;

    /// Replace the NSG and wait until the write has completed.
    async fn put_security_group(
        &self,
        id: &ResourceId,
        group: &SecurityGroup,
    ) -> Result<(), NetworkError>;
}

/// Something the coalescer can run.
#[async_trait]
pub trait ReconcilePass: Send + Sync {
    async fn reconcile_once(&self) -> Result<ReconcileSummary, ReconcileError>;
}

/// Counters describing one successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    /// Rules synthesized for target pods
    pub desired: usize,
    /// Foreign rules kept as-is
    pub foreign: usize,
    /// Previously owned rules that were replaced
    pub removed: usize,
    /// Target pods that produced no rule
    pub skipped: usize,
    /// Whether the NSG was written
    pub written: bool,
}

/// Orchestrates a reconcile pass.
pub struct Reconciler<P, N> {
    pods: P,
    network: N,
    subnet: SubnetRef,
    marker_label: String,
    settings: RuleSettings,
}

impl<P: PodSource, N: NetworkProvider> Reconciler<P, N> {
    #[must_use]
    pub fn new(
        pods: P,
        network: N,
        subnet: SubnetRef,
        marker_label: String,
        settings: RuleSettings,
    ) -> Self {
        Self {
            pods,
            network,
            subnet,
            marker_label,
            settings,
        }
    }
}

#[async_trait]
impl<P: PodSource, N: NetworkProvider> ReconcilePass for Reconciler<P, N> {
    #[instrument(skip(self), fields(subnet = %self.subnet))]
    async fn reconcile_once(&self) -> Result<ReconcileSummary, ReconcileError> {
        let pods = self
            .pods
            .list_target_pods()
            .await
            .map_err(ReconcileError::ListPods)?;

        let candidates: Vec<PodSnapshot> = pods
            .into_iter()
            .filter(|pod| is_target(pod, &self.marker_label))
            .collect();
        debug!(count = candidates.len(), "Listed target pods");

        let desired = synthesize(&candidates, &self.settings);
        for skipped in &desired.skipped {
            metrics::record_pod_skipped(skipped.reason.as_str());
        }

        let id = self
            .network
            .resolve_security_group(&self.subnet)
            .await
            .inspect_err(|e| metrics::record_remote_error("resolve", e))?;
        debug!(nsg = %id, "Resolved network security group");

        let mut group = self
            .network
            .get_security_group(&id)
            .await
            .inspect_err(|e| metrics::record_remote_error("get", e))?;

        let remote = std::mem::take(&mut group.properties.security_rules);
        let owned_before = remote
            .iter()
            .filter(|r| r.is_owned(&self.settings.prefix))
            .count();
        let foreign = remote.len() - owned_before;

        let merged = merge(remote.clone(), &desired.rules, &self.settings.prefix)?;
        metrics::set_rule_counts(foreign, desired.rules.len());

        let summary = ReconcileSummary {
            desired: desired.rules.len(),
            foreign,
            removed: owned_before,
            skipped: desired.skipped.len(),
            written: false,
        };

        if same_rules(&remote, &merged) {
            info!(nsg = %id, rules = merged.len(), "NSG already up to date, skipping write");
            return Ok(summary);
        }

        group.properties.security_rules = merged;
        info!(
            nsg = %id,
            desired = summary.desired,
            foreign = summary.foreign,
            "Writing NSG rules"
        );
        self.network
            .put_security_group(&id, &group)
            .await
            .inspect_err(|e| metrics::record_remote_error("put", e))?;

        Ok(ReconcileSummary {
            written: true,
            ..summary
        })
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
