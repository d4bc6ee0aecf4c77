// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring: pod changes in, coalescer signals out.
//!
//! Pod changes never trigger a reconcile directly. They are checked against the
//! signal policy in [`change_signal`] and, when relevant, turned into a
//! non-blocking [`CoalescerHandle::signal`](crate::coalescer::CoalescerHandle::signal).
//! The coalescer loop itself is started only once the initial pod list has been
//! delivered, and its first pass is the forced startup reconcile. If that loop
//! stops or panics, the controller stops with an error.

use crate::coalescer::Coalescer;
use crate::kubernetes::PodChange;
use crate::pod::is_target;
use crate::reconciler::ReconcilePass;
use anyhow::{bail, Result};
use futures::future::OptionFuture;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Signal reason for a newly seen target pod.
pub const REASON_ADDED: &str = "added";
/// Signal reason for a target pod moved to another node.
pub const REASON_UPDATED: &str = "updated";
/// Signal reason for a deleted target pod.
pub const REASON_DELETED: &str = "deleted";

/// Decide whether a pod change requires an NSG update.
///
/// Adds and deletes of target pods signal. An update signals only when the
/// new state is a target and its node assignment or host IP changed, because
/// those determine the destination IP of the pod's rule. The scheduler sets
/// the node before the kubelet reports the host IP, so both are watched.
#[must_use]
pub fn change_signal(change: &PodChange, marker_label: &str) -> Option<&'static str> {
    match change {
        PodChange::Added(pod) if is_target(pod, marker_label) => Some(REASON_ADDED),
        PodChange::Deleted(pod) if is_target(pod, marker_label) => Some(REASON_DELETED),
        PodChange::Updated { old, new }
            if is_target(new, marker_label)
                && (old.node_name != new.node_name || old.host_ip != new.host_ip) =>
        {
            Some(REASON_UPDATED)
        }
        _ => None,
    }
}

/// Owns the reconciler until the pod cache has synced, then hands it to the
/// coalescer loop.
pub struct Controller<R> {
    reconciler: R,
    marker_label: String,
    cooldown: Duration,
}

impl<R: ReconcilePass + 'static> Controller<R> {
    #[must_use]
    pub fn new(reconciler: R, marker_label: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            reconciler,
            marker_label: marker_label.into(),
            cooldown,
        }
    }

    /// Consume pod changes until the stream ends.
    ///
    /// Watch errors are logged; the stream is expected to recover on its own.
    ///
    /// # Errors
    ///
    /// Returns an error when the change stream ends or the NSG update loop
    /// stops, since either way the NSG would no longer follow the cluster.
    pub async fn run<S, E>(self, changes: S) -> Result<()>
    where
        S: Stream<Item = Result<PodChange, E>>,
        E: Display,
    {
        let (coalescer, handle) = Coalescer::new(self.cooldown);
        let mut pending_start = Some((coalescer, self.reconciler));
        let mut updates: Option<JoinHandle<()>> = None;

        futures::pin_mut!(changes);
        loop {
            tokio::select! {
                item = changes.next() => {
                    let Some(item) = item else {
                        bail!("pod change stream ended");
                    };
                    let change = match item {
                        Ok(change) => change,
                        Err(e) => {
                            warn!(error = %e, "Pod watch error, watcher will retry");
                            continue;
                        }
                    };

                    if change == PodChange::Synced {
                        if let Some((coalescer, reconciler)) = pending_start.take() {
                            info!(cooldown = ?self.cooldown, "Pod cache synced, starting NSG updates");
                            updates = Some(tokio::spawn(coalescer.run(reconciler)));
                        }
                        continue;
                    }

                    if let Some(reason) = change_signal(&change, &self.marker_label) {
                        if let Some(pod) = change.pod() {
                            info!(
                                namespace = %pod.namespace,
                                pod = %pod.name,
                                node = %pod.node_name,
                                host_ip = %pod.host_ip,
                                reason,
                                "Pod change requires NSG update"
                            );
                        }
                        handle.signal(reason);
                    } else if let Some(pod) = change.pod() {
                        debug!(pod = %pod, "Ignoring pod change");
                    }
                }
                Some(result) = OptionFuture::from(updates.as_mut()), if updates.is_some() => {
                    match result {
                        Err(e) => {
                            error!(error = %e, "CRITICAL: NSG update loop failed");
                            bail!("NSG update loop failed: {e}")
                        }
                        Ok(()) => bail!("NSG update loop exited unexpectedly"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
