// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Azure Resource Manager client for subnets and network security groups.

use super::credential::TokenCredential;
use super::models::{ArmErrorResponse, AsyncOperationStatus, SecurityGroup, Subnet};
use super::poller::{retry_after, PollSettings};
use super::resource_id::{ResourceId, SubnetRef};
use crate::constants::{ARM_REQUEST_TIMEOUT_SECS, NETWORK_API_VERSION};
use crate::errors::NetworkError;
use crate::reconciler::NetworkProvider;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, LOCATION};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Header carrying the status URL of an asynchronous ARM operation.
const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// How completion of a long-running operation is observed.
enum Operation {
    /// Poll until the body reports a terminal `status`
    AsyncStatus(String),
    /// Poll until the URL stops answering `202 Accepted`
    Location(String),
}

impl Operation {
    fn url(&self) -> &str {
        match self {
            Self::AsyncStatus(url) | Self::Location(url) => url,
        }
    }
}

/// ARM REST client.
#[derive(Clone)]
pub struct ArmClient {
    /// HTTP client.
    client: Client,
    /// ARM base URL without a trailing slash.
    endpoint: String,
    /// Source of bearer tokens.
    credential: Arc<dyn TokenCredential>,
    /// Long-running operation polling.
    poll: PollSettings,
}

impl ArmClient {
    /// Create a new ARM client.
    ///
    /// # Arguments
    /// * `endpoint` - ARM base URL, e.g. `https://management.azure.com`
    /// * `credential` - Source of bearer tokens
    /// * `poll` - Polling of long-running writes
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        poll: PollSettings,
    ) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(ARM_REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential,
            poll,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}?api-version={NETWORK_API_VERSION}", self.endpoint)
    }

    async fn bearer(&self) -> Result<String, NetworkError> {
        let token = self.credential.get_token().await?;
        Ok(format!("Bearer {}", token.token))
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, NetworkError> {
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.bearer().await?)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NetworkError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, "Failed to parse ARM response");
                NetworkError::Serialization(e)
            })
        } else {
            Err(api_error(status, &text))
        }
    }

    /// Fetch a subnet.
    ///
    /// # Errors
    /// Returns error if the request fails or ARM rejects it.
    pub async fn get_subnet(&self, subnet: &SubnetRef) -> Result<Subnet, NetworkError> {
        self.get(&self.url(&subnet.path())).await
    }

    /// Poll a long-running operation until it reaches a terminal state.
    async fn wait_for_operation(
        &self,
        operation: Operation,
        mut hint: Option<Duration>,
    ) -> Result<(), NetworkError> {
        let deadline = Instant::now() + self.poll.timeout;
        let mut backoff = self.poll.backoff();

        loop {
            let delay = hint.take().unwrap_or_else(|| backoff.next_backoff());
            if Instant::now() + delay > deadline {
                return Err(NetworkError::Timeout(self.poll.timeout.as_secs()));
            }
            sleep(delay).await;

            let response = self
                .client
                .get(operation.url())
                .header(AUTHORIZATION, self.bearer().await?)
                .send()
                .await?;
            let status = response.status();
            hint = retry_after(response.headers());
            let text = response.text().await?;

            if !status.is_success() {
                return Err(api_error(status, &text));
            }

            match &operation {
                Operation::AsyncStatus(_) => {
                    let body: AsyncOperationStatus = serde_json::from_str(&text)?;
                    match body.status.as_str() {
                        "Succeeded" => return Ok(()),
                        "Failed" | "Canceled" => {
                            return Err(NetworkError::OperationFailed {
                                status: body.status.clone(),
                                message: body.error.map(|e| e.message).unwrap_or_default(),
                            });
                        }
                        other => debug!(status = other, "Operation in progress"),
                    }
                }
                Operation::Location(_) => {
                    if status != StatusCode::ACCEPTED {
                        return Ok(());
                    }
                    debug!("Operation in progress");
                }
            }
        }
    }
}

/// Build an error from a non-success ARM response.
fn api_error(status: StatusCode, body: &str) -> NetworkError {
    let detail = serde_json::from_str::<ArmErrorResponse>(body)
        .map(|r| r.error)
        .unwrap_or_default();

    NetworkError::Api {
        status: status.as_u16(),
        code: if detail.code.is_empty() {
            status.canonical_reason().unwrap_or("Unknown").to_string()
        } else {
            detail.code
        },
        message: if detail.message.is_empty() {
            body.to_string()
        } else {
            detail.message
        },
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl NetworkProvider for ArmClient {
    async fn resolve_security_group(&self, subnet: &SubnetRef) -> Result<ResourceId, NetworkError> {
        let found = self.get_subnet(subnet).await?;
        let nsg = found
            .properties
            .network_security_group
            .ok_or_else(|| NetworkError::NoSecurityGroup(subnet.to_string()))?;
        nsg.id.parse()
    }

    async fn get_security_group(&self, id: &ResourceId) -> Result<SecurityGroup, NetworkError> {
        self.get(&self.url(&id.to_string())).await
    }

    async fn put_security_group(
        &self,
        id: &ResourceId,
        group: &SecurityGroup,
    ) -> Result<(), NetworkError> {
        let url = self.url(&id.to_string());
        info!(
            nsg = %id,
            rules = group.properties.security_rules.len(),
            "PUT network security group"
        );

        let response = self
            .client
            .put(&url)
            .header(AUTHORIZATION, self.bearer().await?)
            .json(group)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(api_error(status, &text));
        }

        let hint = retry_after(&headers);
        if let Some(url) = header_value(&headers, ASYNC_OPERATION_HEADER) {
            debug!(url = %url, "Waiting for asynchronous operation");
            return self.wait_for_operation(Operation::AsyncStatus(url), hint).await;
        }
        if status == StatusCode::ACCEPTED {
            if let Some(url) = header_value(&headers, LOCATION.as_str()) {
                debug!(url = %url, "Waiting for accepted operation");
                return self.wait_for_operation(Operation::Location(url), hint).await;
            }
            warn!(nsg = %id, "Write accepted without a status URL, assuming completion");
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
