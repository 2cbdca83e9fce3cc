//! Gap-limit address discovery along one branch
//!
//! Indices are probed strictly in order from 0. Every probed address is
//! kept, used or not, and the scan stops once `gap_limit` consecutive
//! unused addresses have been seen. Usage oracle failures count as
//! unused; the error text stays on the record.

use crate::address::NetworkType;
use crate::builder::{build_address, BuildError, DerivedAddress};
use crate::derivation::{AccountKeys, Branch};
use crate::keys::KeyError;
use crate::oracle::{AddressUsageOracle, UsageCheck};
use crate::store::AddressRecord;
use crate::verify::{verify_derived, KeyAddressMismatch};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Consecutive unused addresses that end a scan.
pub const DEFAULT_GAP_LIMIT: u32 = 20;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Mismatch(#[from] KeyAddressMismatch),

    #[error("Failed to build {branch} address {index}: {source}")]
    Build {
        branch: Branch,
        index: u32,
        #[source]
        source: BuildError,
    },

    #[error("Failed to encode {branch} address {index}: {source}")]
    Encode {
        branch: Branch,
        index: u32,
        #[source]
        source: KeyError,
    },

    #[error("Discovery of {branch} addresses cancelled after {scanned} addresses")]
    Cancelled { branch: Branch, scanned: usize },

    #[error("Gap limit must be at least 1, got {0}")]
    InvalidGapLimit(u32),

    #[error("Ran out of non-hardened indices on the {0} branch")]
    IndexSpaceExhausted(Branch),
}

/// Progress notifications for a front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Checking {
        branch: Branch,
        index: u32,
        address: String,
    },
    Checked {
        branch: Branch,
        index: u32,
        is_used: bool,
    },
    UsageCheckFailed {
        branch: Branch,
        index: u32,
        error: String,
    },
    BranchScanned {
        branch: Branch,
        total: usize,
        used: usize,
    },
    Persisting {
        branch: Branch,
        count: usize,
    },
    Persisted {
        branch: Branch,
        count: usize,
    },
}

/// A verified address together with its usage result.
#[derive(Debug, Clone)]
pub struct DiscoveredAddress {
    pub derived: DerivedAddress,
    pub usage: UsageCheck,
}

impl DiscoveredAddress {
    pub fn index(&self) -> u32 {
        self.derived.index
    }

    pub fn is_used(&self) -> bool {
        self.usage.is_used
    }

    /// Storage form, without the private key.
    pub fn to_record(&self) -> Result<AddressRecord, KeyError> {
        Ok(AddressRecord {
            index: self.derived.index,
            branch: self.derived.branch,
            path: self.derived.path.to_string(),
            public_key: self.derived.public_key_bech32()?,
            address: self.derived.address.clone(),
            payment_key_hash: self.derived.payment_key_hash,
            is_used: self.usage.is_used,
            usage_detail: self.usage.detail.clone(),
            usage_error: self.usage.error.clone(),
        })
    }
}

/// Convert a finished scan into storage records.
pub fn to_records(discovered: &[DiscoveredAddress]) -> Result<Vec<AddressRecord>, DiscoveryError> {
    discovered
        .iter()
        .map(|d| {
            d.to_record().map_err(|source| DiscoveryError::Encode {
                branch: d.derived.branch,
                index: d.derived.index,
                source,
            })
        })
        .collect()
}

/// Mutable state of one branch scan.
#[derive(Debug)]
struct DiscoveryRun {
    branch: Branch,
    next_index: u32,
    consecutive_unused: u32,
    collected: Vec<DiscoveredAddress>,
}

impl DiscoveryRun {
    fn new(branch: Branch) -> Self {
        Self {
            branch,
            next_index: 0,
            consecutive_unused: 0,
            collected: Vec::new(),
        }
    }

    fn record(&mut self, discovered: DiscoveredAddress) {
        if discovered.is_used() {
            self.consecutive_unused = 0;
        } else {
            self.consecutive_unused += 1;
        }
        self.collected.push(discovered);
        self.next_index += 1;
    }

    fn is_complete(&self, gap_limit: u32) -> bool {
        self.consecutive_unused >= gap_limit
    }
}

/// Runs gap-limit scans against a usage oracle.
pub struct DiscoveryScanner<'a> {
    oracle: &'a dyn AddressUsageOracle,
    network: NetworkType,
    gap_limit: u32,
    cancel: Option<CancellationToken>,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl<'a> DiscoveryScanner<'a> {
    pub fn new(oracle: &'a dyn AddressUsageOracle, network: NetworkType) -> Self {
        Self {
            oracle,
            network,
            gap_limit: DEFAULT_GAP_LIMIT,
            cancel: None,
            progress: None,
        }
    }

    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.gap_limit = gap_limit;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn gap_limit(&self) -> u32 {
        self.gap_limit
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // receiver gone just means nobody is listening
            let _ = tx.send(event);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, |t| t.is_cancelled())
    }

    fn build(&self, keys: &AccountKeys, branch: Branch, index: u32) -> Result<DerivedAddress, DiscoveryError> {
        build_address(keys, branch, index, self.network).map_err(|source| match source {
            BuildError::IndexOutOfRange(_) => DiscoveryError::IndexSpaceExhausted(branch),
            source => DiscoveryError::Build {
                branch,
                index,
                source,
            },
        })
    }

    async fn check_usage(&self, branch: Branch, scanned: usize, address: &str) -> Result<UsageCheck, DiscoveryError> {
        let result = match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(DiscoveryError::Cancelled { branch, scanned }),
                result = self.oracle.check_usage(address) => result,
            },
            None => self.oracle.check_usage(address).await,
        };
        Ok(UsageCheck::from_result(result))
    }

    /// Scan `branch` of the account from index 0 until the gap limit is met.
    pub async fn discover(
        &self,
        keys: &AccountKeys,
        branch: Branch,
    ) -> Result<Vec<DiscoveredAddress>, DiscoveryError> {
        if self.gap_limit == 0 {
            return Err(DiscoveryError::InvalidGapLimit(self.gap_limit));
        }

        let mut run = DiscoveryRun::new(branch);
        log::info!(
            "discovering {} addresses for account {} (gap limit {})",
            branch,
            keys.account_index(),
            self.gap_limit
        );

        while !run.is_complete(self.gap_limit) {
            if self.is_cancelled() {
                log::info!("{} discovery cancelled at index {}", branch, run.next_index);
                return Err(DiscoveryError::Cancelled {
                    branch,
                    scanned: run.collected.len(),
                });
            }

            let index = run.next_index;
            let derived = self.build(keys, branch, index)?;
            verify_derived(&derived)?;

            self.emit(ProgressEvent::Checking {
                branch,
                index,
                address: derived.address.clone(),
            });
            let usage = self.check_usage(branch, run.collected.len(), &derived.address).await?;

            match &usage.error {
                Some(error) => {
                    log::warn!(
                        "usage check failed for {} address {}, treating as unused: {}",
                        branch,
                        index,
                        error
                    );
                    self.emit(ProgressEvent::UsageCheckFailed {
                        branch,
                        index,
                        error: error.clone(),
                    });
                }
                None => {
                    log::debug!("{} address {} used: {}", branch, index, usage.is_used);
                    self.emit(ProgressEvent::Checked {
                        branch,
                        index,
                        is_used: usage.is_used,
                    });
                }
            }

            run.record(DiscoveredAddress { derived, usage });
        }

        let used = run.collected.iter().filter(|d| d.is_used()).count();
        log::info!(
            "{} discovery finished: {} addresses, {} used",
            run.branch,
            run.collected.len(),
            used
        );
        self.emit(ProgressEvent::BranchScanned {
            branch,
            total: run.collected.len(),
            used,
        });

        Ok(run.collected)
    }
}
