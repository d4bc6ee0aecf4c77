// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the hostNetwork NSG controller.
//!
//! The taxonomy follows how each failure is handled at runtime:
//!
//! - [`ConfigError`] - fatal, aborts startup
//! - [`NetworkError`] - Azure Resource Manager failures, the pass is abandoned and retried
//!   on the next coalescer release
//! - [`RuleError`] - the remote NSG conflicts with the reserved rule namespace
//! - [`ReconcileError`] - anything that aborts one reconcile pass

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading and validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The Azure configuration file could not be read
    #[error("Failed to read Azure config {path}: {source}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The Azure configuration file is not valid JSON
    #[error("Failed to parse Azure config {path}: {source}")]
    Parse {
        /// Path that was parsed
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// A required field is missing or empty
    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    /// A setting is present but not usable
    #[error("Invalid setting '{field}': {reason}")]
    Invalid {
        /// Name of the offending setting
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// No credential source is configured
    #[error("No Azure credential configured: set useManagedIdentityExtension, aadClientId/aadClientSecret, or AZURE_ACCESS_TOKEN")]
    NoCredential,
}

/// Errors returned by the Azure Resource Manager collaborator.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// HTTP request failed before a response was received
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// ARM returned an error response
    #[error("ARM error: {status} {code} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// ARM error code (e.g. `AnotherOperationInProgress`)
        code: String,
        /// Error message
        message: String,
    },

    /// Response body could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A resource id did not have the expected shape
    #[error("Invalid resource id '{0}'")]
    InvalidResourceId(String),

    /// The configured subnet has no network security group attached
    #[error("Subnet '{0}' has no network security group attached")]
    NoSecurityGroup(String),

    /// A long-running operation finished in a non-success state
    #[error("Operation finished with status {status}: {message}")]
    OperationFailed {
        /// Terminal status reported by ARM (`Failed`, `Canceled`)
        status: String,
        /// Error message reported by ARM
        message: String,
    },

    /// A long-running operation did not finish in time
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Access token could not be acquired
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl NetworkError {
    /// Whether the failure is expected to clear up on its own.
    ///
    /// Transient failures converge on a later pass without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => {
                *status == 408 || *status == 409 || *status == 429 || (500..600).contains(status)
            }
            Self::OperationFailed { status, .. } => status == "Canceled",
            _ => false,
        }
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        if self.is_transient() {
            "transient"
        } else {
            "permanent"
        }
    }
}

/// Inconsistencies detected in the merged rule collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Two rules in the collection share a name
    #[error("Duplicate security rule name '{0}'")]
    DuplicateName(String),

    /// Two rules of the same direction share a priority
    #[error("Security rules '{first}' and '{second}' share {direction} priority {priority}")]
    DuplicatePriority {
        /// Colliding priority
        priority: i32,
        /// Direction both rules apply to
        direction: String,
        /// Rule that claimed the priority first
        first: String,
        /// Rule that collided with it
        second: String,
    },

    /// A synthesized rule fell outside the priority range ARM accepts
    #[error("Security rule '{name}' priority {priority} is outside 100..=4096")]
    PriorityOutOfRange {
        /// Offending rule
        name: String,
        /// Priority it was assigned
        priority: i32,
    },
}

/// Errors that abort one reconcile pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Listing candidate pods failed
    #[error("Failed to list target pods: {0}")]
    ListPods(#[source] kube::Error),

    /// An Azure Resource Manager call failed
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The merged rule collection is inconsistent
    #[error(transparent)]
    Rules(#[from] RuleError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
