// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the hostNetwork NSG controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Rule Synthesis Constants
// ============================================================================

/// Reserved name prefix for every security rule owned by this controller
pub const DEFAULT_RULE_PREFIX: &str = "hostNetwork";

/// Pod label that opts a hostNetwork pod into rule synthesis (value must be `"true"`)
pub const DEFAULT_TARGET_LABEL: &str = "updateNSG";

/// Label value that marks a pod as opted in
pub const TARGET_LABEL_VALUE: &str = "true";

/// Priority of the first synthesized rule
pub const DEFAULT_BASE_PRIORITY: i32 = 2000;

/// Gap between priorities of consecutive synthesized rules
pub const DEFAULT_PRIORITY_STEP: i32 = 10;

/// Lowest priority ARM accepts for a custom security rule
pub const MIN_RULE_PRIORITY: i32 = 100;

/// Highest priority ARM accepts for a custom security rule
pub const MAX_RULE_PRIORITY: i32 = 4096;

/// Maximum length of a security rule name
pub const MAX_RULE_NAME_LEN: usize = 80;

/// Number of hex characters of the name digest appended to truncated rule names
pub const RULE_NAME_DIGEST_LEN: usize = 8;

/// Wildcard used for source address and source port of synthesized rules
pub const ANY: &str = "*";

// ============================================================================
// Coalescer Constants
// ============================================================================

/// Minimum time between two NSG writes (10 seconds)
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;

// ============================================================================
// Azure Resource Manager Constants
// ============================================================================

/// API version used for `Microsoft.Network` calls
pub const NETWORK_API_VERSION: &str = "2024-05-01";

/// Default location of the cloud-provider-azure configuration file
pub const DEFAULT_AZURE_CONFIG_PATH: &str = "/etc/kubernetes/azure.json";

/// Timeout for a single ARM HTTP request (30 seconds)
pub const ARM_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default upper bound on waiting for an NSG write to complete (10 minutes)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 600;

/// Initial polling interval for long-running operations (1 second)
pub const POLL_INITIAL_INTERVAL_MILLIS: u64 = 1000;

/// Maximum polling interval for long-running operations (30 seconds)
pub const POLL_MAX_INTERVAL_SECS: u64 = 30;

/// Polling interval growth factor
pub const POLL_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Tokens are refreshed this long before they expire (5 minutes)
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Environment variable holding a pre-issued ARM bearer token
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Instance Metadata Service token endpoint used for managed identity
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Timeout for a single token request to IMDS or Entra ID (30 seconds)
pub const TOKEN_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Instance Metadata Service API version
pub const IMDS_API_VERSION: &str = "2018-02-01";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 2;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default bind address for the metrics HTTP server
pub const DEFAULT_METRICS_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for liveness endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";
