//! Address usage oracle contract

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Usage oracle unreachable: {0}")]
    Unreachable(String),

    #[error("Usage oracle returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected usage oracle response: {0}")]
    InvalidResponse(String),
}

/// What the oracle knows about one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressUsage {
    pub is_used: bool,
    pub detail: Option<String>,
}

impl AddressUsage {
    pub fn used(detail: impl Into<String>) -> Self {
        Self {
            is_used: true,
            detail: Some(detail.into()),
        }
    }

    pub fn unused() -> Self {
        Self {
            is_used: false,
            detail: None,
        }
    }
}

/// Reports on-chain activity for an address.
#[async_trait::async_trait]
pub trait AddressUsageOracle: Send + Sync {
    async fn check_usage(&self, address: &str) -> Result<AddressUsage, OracleError>;
}

/// Usage result attached to a discovered address. Oracle failures count
/// as unused and keep the error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCheck {
    pub is_used: bool,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl UsageCheck {
    pub fn from_result(result: Result<AddressUsage, OracleError>) -> Self {
        match result {
            Ok(usage) => Self {
                is_used: usage.is_used,
                detail: usage.detail,
                error: None,
            },
            Err(e) => Self {
                is_used: false,
                detail: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}
