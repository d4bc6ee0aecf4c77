// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bearer tokens for Azure Resource Manager.
//!
//! Three sources are supported, mirroring what a cluster's `azure.json`
//! usually offers:
//!
//! - [`ManagedIdentityCredential`] - the node's (optionally user-assigned) identity via IMDS
//! - [`ClientSecretCredential`] - a service principal's client secret
//! - [`StaticTokenCredential`] - a pre-issued token, mainly for local runs
//!
//! Wrap any of them in [`CachedCredential`] so that a token is reused until it
//! is about to expire.

use crate::constants::{IMDS_API_VERSION, IMDS_TOKEN_ENDPOINT, TOKEN_REFRESH_MARGIN_SECS};
use crate::errors::NetworkError;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// An access token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable `margin` seconds from now.
    #[must_use]
    pub fn is_fresh(&self, margin_secs: i64) -> bool {
        self.expires_at - TimeDelta::seconds(margin_secs) > Utc::now()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of ARM bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self) -> Result<AccessToken, NetworkError>;
}

/// OAuth2 token endpoint response.
///
/// Entra ID reports `expires_in` as a number, IMDS as a string.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "seconds")]
    expires_in: i64,
}

impl From<TokenResponse> for AccessToken {
    fn from(response: TokenResponse) -> Self {
        Self {
            token: response.access_token,
            expires_at: Utc::now() + TimeDelta::seconds(response.expires_in),
        }
    }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

async fn token_from_response(response: reqwest::Response) -> Result<AccessToken, NetworkError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(NetworkError::Auth(format!("token endpoint returned {status}: {text}")));
    }
    let parsed: TokenResponse = serde_json::from_str(&text)?;
    Ok(parsed.into())
}

/// HTTP client for token requests.
///
/// Token acquisition runs inside every reconcile pass, so a request that never
/// answers must not stall the update loop.
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn http_client(timeout: Duration) -> Result<Client, NetworkError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Service principal authenticated with a client secret.
pub struct ClientSecretCredential {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientSecretCredential {
    /// # Arguments
    /// * `authority_host` - Entra ID host, e.g. `https://login.microsoftonline.com`
    /// * `resource` - ARM endpoint the token is for
    #[must_use]
    pub fn new(
        client: Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        resource: &str,
    ) -> Self {
        Self {
            client,
            token_url: format!(
                "{}/{tenant_id}/oauth2/v2.0/token",
                authority_host.trim_end_matches('/')
            ),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: format!("{}/.default", resource.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self) -> Result<AccessToken, NetworkError> {
        debug!(url = %self.token_url, client_id = %self.client_id, "Requesting client secret token");

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("scope", &self.scope)
            .finish();

        let response = self
            .client
            .post(&self.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        token_from_response(response).await
    }
}

/// Managed identity of the node, fetched from the Instance Metadata Service.
pub struct ManagedIdentityCredential {
    client: Client,
    endpoint: String,
    resource: String,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// # Arguments
    /// * `resource` - ARM endpoint the token is for
    /// * `client_id` - Client id of a user-assigned identity, `None` for the system identity
    #[must_use]
    pub fn new(client: Client, resource: &str, client_id: Option<String>) -> Self {
        Self {
            client,
            endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
            resource: format!("{}/", resource.trim_end_matches('/')),
            client_id,
        }
    }

    /// Use a different token endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self) -> Result<AccessToken, NetworkError> {
        let mut params = vec![
            ("api-version", IMDS_API_VERSION),
            ("resource", self.resource.as_str()),
        ];
        if let Some(client_id) = &self.client_id {
            params.push(("client_id", client_id.as_str()));
        }
        let url = Url::parse_with_params(&self.endpoint, &params)
            .map_err(|e| NetworkError::Auth(format!("invalid IMDS endpoint: {e}")))?;

        debug!(client_id = ?self.client_id, "Requesting managed identity token");
        let response = self
            .client
            .get(url)
            .header("Metadata", "true")
            .send()
            .await?;

        token_from_response(response).await
    }
}

/// A token handed in from outside; never refreshed.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self) -> Result<AccessToken, NetworkError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: DateTime::<Utc>::MAX_UTC,
        })
    }
}

/// Reuses a token until it is within [`TOKEN_REFRESH_MARGIN_SECS`] of expiry.
pub struct CachedCredential<C> {
    inner: C,
    cached: Mutex<Option<AccessToken>>,
}

impl<C: TokenCredential> CachedCredential<C> {
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<C: TokenCredential> TokenCredential for CachedCredential<C> {
    async fn get_token(&self) -> Result<AccessToken, NetworkError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(TOKEN_REFRESH_MARGIN_SECS)) {
            return Ok(token.clone());
        }

        let token = self.inner.get_token().await?;
        debug!(expires_at = %token.expires_at, "Acquired ARM access token");
        *cached = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod credential_tests;
