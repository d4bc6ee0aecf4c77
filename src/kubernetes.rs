// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes side of the controller: client setup, pod listing and the pod
//! change stream.
//!
//! The watcher yields raw [`watcher::Event`]s, including full relists after a
//! desync. [`PodTracker`] turns them into add/update/delete notifications
//! with the previous state attached, and reports a pod that vanished during a
//! relist as deleted.

use crate::constants::TARGET_LABEL_VALUE;
use crate::pod::PodSnapshot;
use crate::reconciler::PodSource;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Build a Kubernetes client from an explicit kubeconfig or the default chain.
///
/// # Errors
///
/// Returns an error if the kubeconfig cannot be read or no configuration is
/// found in the environment.
pub async fn client(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    match kubeconfig {
        Some(path) => {
            info!(path = %path.display(), "Loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)?;
            let config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await?;
            Ok(Client::try_from(config)?)
        }
        None => Ok(Client::try_default().await?),
    }
}

/// Lists opted-in pods across all namespaces.
#[derive(Clone)]
pub struct KubePodSource {
    api: Api<Pod>,
    selector: String,
}

impl KubePodSource {
    #[must_use]
    pub fn new(client: Client, marker_label: &str) -> Self {
        Self {
            api: Api::all(client),
            selector: format!("{marker_label}={TARGET_LABEL_VALUE}"),
        }
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn list_target_pods(&self) -> Result<Vec<PodSnapshot>, kube::Error> {
        let pods = self
            .api
            .list(&ListParams::default().labels(&self.selector))
            .await?;
        debug!(count = pods.items.len(), selector = %self.selector, "Listed labeled pods");
        Ok(pods.items.iter().map(PodSnapshot::from).collect())
    }
}

/// A change to one pod, or the end of the initial list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodChange {
    Added(PodSnapshot),
    Updated { old: PodSnapshot, new: PodSnapshot },
    Deleted(PodSnapshot),
    /// The initial list has been delivered; emitted once
    Synced,
}

impl PodChange {
    /// Current state of the pod this change is about.
    #[must_use]
    pub fn pod(&self) -> Option<&PodSnapshot> {
        match self {
            Self::Added(pod) | Self::Deleted(pod) | Self::Updated { new: pod, .. } => Some(pod),
            Self::Synced => None,
        }
    }
}

/// Remembers the last seen state of every pod so that watch events can be
/// turned into [`PodChange`]s.
#[derive(Debug, Default)]
pub struct PodTracker {
    known: HashMap<String, PodSnapshot>,
    relisted: Option<HashSet<String>>,
    synced: bool,
}

impl PodTracker {
    /// Fold one watch event into the tracker.
    pub fn observe(&mut self, event: watcher::Event<Pod>) -> Vec<PodChange> {
        match event {
            watcher::Event::Apply(pod) => vec![self.upsert(PodSnapshot::from(&pod))],
            watcher::Event::Delete(pod) => {
                let snapshot = PodSnapshot::from(&pod);
                self.known.remove(&snapshot.key());
                vec![PodChange::Deleted(snapshot)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(pod) => {
                let snapshot = PodSnapshot::from(&pod);
                self.relisted
                    .get_or_insert_with(HashSet::new)
                    .insert(snapshot.key());
                vec![self.upsert(snapshot)]
            }
            watcher::Event::InitDone => self.finish_relist(),
        }
    }

    fn upsert(&mut self, snapshot: PodSnapshot) -> PodChange {
        match self.known.insert(snapshot.key(), snapshot.clone()) {
            Some(old) => PodChange::Updated { old, new: snapshot },
            None => PodChange::Added(snapshot),
        }
    }

    fn finish_relist(&mut self) -> Vec<PodChange> {
        let seen = self.relisted.take().unwrap_or_default();
        let gone: Vec<String> = self
            .known
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();

        let mut changes: Vec<PodChange> = gone
            .iter()
            .filter_map(|key| self.known.remove(key))
            .map(PodChange::Deleted)
            .collect();
        if !changes.is_empty() {
            debug!(count = changes.len(), "Pods disappeared during relist");
        }

        if !self.synced {
            self.synced = true;
            info!(pods = self.known.len(), "Initial pod list synced");
            changes.push(PodChange::Synced);
        }
        changes
    }
}

/// Watch all pods and yield their changes.
///
/// Watch errors are yielded to the caller; the stream backs off and resumes
/// on its own.
pub fn pod_changes(client: Client) -> impl Stream<Item = Result<PodChange, watcher::Error>> {
    let api: Api<Pod> = Api::all(client);
    let mut tracker = PodTracker::default();

    watcher(api, watcher::Config::default())
        .default_backoff()
        .map_ok(move |event| {
            futures::stream::iter(tracker.observe(event).into_iter().map(Ok::<_, watcher::Error>))
        })
        .try_flatten()
}

#[cfg(test)]
#[path = "kubernetes_tests.rs"]
mod kubernetes_tests;
