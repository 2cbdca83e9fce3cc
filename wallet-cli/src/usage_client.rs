//! Blockfrost-compatible address usage client
//!
//! `GET {endpoint}/addresses/{address}/total` with a `project_id` header.
//! 404 means the chain has never seen the address.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use shelley_wallet::{AddressUsage, AddressUsageOracle, OracleError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct UsageClient {
    endpoint: String,
    project_id: Option<String>,
    client: Client,
}

/// Subset of the `/addresses/{address}/total` response.
#[derive(Debug, Deserialize)]
struct AddressTotal {
    tx_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl UsageClient {
    pub fn new(endpoint: &str, project_id: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        log::info!("Usage oracle client initialized: {}", endpoint);
        if project_id.is_none() {
            log::warn!("No usage oracle project id configured; requests will likely be rejected");
        }

        Ok(Self {
            endpoint,
            project_id,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn total_url(&self, address: &str) -> String {
        format!("{}/addresses/{}/total", self.endpoint, address)
    }
}

/// Map a response status and body onto a usage answer.
fn interpret(status: StatusCode, body: &str) -> Result<AddressUsage, OracleError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(AddressUsage::unused());
    }
    if !status.is_success() {
        let message = serde_json::from_str::<ApiError>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        return Err(OracleError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let total: AddressTotal = serde_json::from_str(body)
        .map_err(|e| OracleError::InvalidResponse(format!("Failed to parse address totals: {}", e)))?;
    if total.tx_count > 0 {
        Ok(AddressUsage::used(format!("{} transactions", total.tx_count)))
    } else {
        Ok(AddressUsage::unused())
    }
}

#[async_trait::async_trait]
impl AddressUsageOracle for UsageClient {
    async fn check_usage(&self, address: &str) -> Result<AddressUsage, OracleError> {
        log::debug!("→ usage check {}", address);

        let mut request = self.client.get(self.total_url(address));
        if let Some(project_id) = &self.project_id {
            request = request.header("project_id", project_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Unreachable("request timed out".to_string())
            } else {
                OracleError::Unreachable(e.to_string())
            }
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        interpret(status, &body)
    }
}
