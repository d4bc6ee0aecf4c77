// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # hostnet-nsg - Azure NSG rules for hostNetwork pods
//!
//! A Kubernetes controller that keeps an Azure Network Security Group in step with the
//! hostNetwork pods running in the cluster. Each opted-in pod gets an inbound allow rule
//! for its host IP and container ports; rules of pods that are gone are removed, and
//! rules the controller does not own are never touched.
//!
//! ## Modules
//!
//! - [`pod`] - Pod snapshots and the eligibility filter
//! - [`rules`] - Security rule model, rule synthesis and merging
//! - [`coalescer`] - Debounces pod change signals into reconcile passes
//! - [`reconciler`] - One reconcile pass: list pods, read the NSG, write it back
//! - [`controller`] - Wires the pod watch to the coalescer
//! - [`azure`] - Azure Resource Manager client and credentials
//! - [`kubernetes`] - Pod listing and watch for the controller
//! - [`config`] - Command-line flags and `azure.json`
//! - [`metrics`] - Prometheus metrics
//! - [`http`] - `/metrics` and `/healthz` endpoints
//!
//! ## Example
//!
//! ```rust
//! use hostnet_nsg::rules::{merge, synthesize, RuleSettings};
//!
//! let settings = RuleSettings::default();
//! let desired = synthesize(&[], &settings);
//! let merged = merge(Vec::new(), &desired.rules, &settings.prefix).unwrap();
//! assert!(merged.is_empty());
//! ```

pub mod azure;
pub mod coalescer;
pub mod config;
pub mod constants;
pub mod controller;
pub mod errors;
pub mod http;
pub mod kubernetes;
pub mod metrics;
pub mod pod;
pub mod reconciler;
pub mod rules;
