//! Wallet creation pipeline
//!
//! 1. revalidate the account index with the store
//! 2. derive the account keys
//! 3. build and verify the primary address pair
//! 4. create the wallet record
//! 5. scan the receiving branch, then persist it as one batch
//! 6. the same for the change branch
//!
//! No persistence call is made for a branch until its whole scan has been
//! verified. Failures after step 4 do not undo earlier steps; they carry a
//! [`PartialWallet`] describing what was stored.

use crate::address::NetworkType;
use crate::builder::build_primary;
use crate::derivation::{derive_keys, AccountKeys, Branch, DerivationError};
use crate::discovery::{to_records, DiscoveryError, DiscoveryScanner, ProgressEvent, DEFAULT_GAP_LIMIT};
use crate::mnemonic::MnemonicError;
use crate::oracle::AddressUsageOracle;
use crate::store::{NewWalletRecord, PersistedAddress, WalletStore};
use crate::verify::{verify_derived, KeyAddressMismatch};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Result of one scanned and stored branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub branch: Branch,
    pub persisted: Vec<PersistedAddress>,
    pub used: usize,
}

/// What already exists when creation fails part way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialWallet {
    pub wallet_id: String,
    pub completed: Vec<BranchOutcome>,
}

impl fmt::Display for PartialWallet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "wallet {} created", self.wallet_id)?;
        for outcome in &self.completed {
            write!(f, ", {} {} addresses stored", outcome.persisted.len(), outcome.branch)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CreateWalletError {
    #[error("No mnemonic words supplied")]
    EmptyMnemonic,

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Wallet name must not be empty")]
    InvalidWalletName,

    #[error("Account index {account_index} is not valid for wallet set {wallet_set_id}: {reason}")]
    AccountIndexInvalid {
        wallet_set_id: String,
        account_index: u32,
        reason: String,
    },

    #[error("Key derivation failed for account {account_index}: {reason}")]
    KeyDerivation { account_index: u32, reason: String },

    #[error("{source}")]
    KeyAddressMismatch {
        #[source]
        source: KeyAddressMismatch,
        partial: Option<PartialWallet>,
    },

    #[error("Wallet record creation failed: {reason}")]
    WalletRecordCreationFailed { reason: String },

    #[error("Discovery of {branch} addresses failed ({partial}): {source}")]
    DiscoveryAborted {
        branch: Branch,
        #[source]
        source: DiscoveryError,
        partial: PartialWallet,
    },

    #[error("Failed to persist {branch} addresses ({partial}): {reason}")]
    AddressBatchPersistFailed {
        branch: Branch,
        reason: String,
        partial: PartialWallet,
    },
}

impl CreateWalletError {
    /// State left behind, if the wallet record had been created.
    pub fn partial(&self) -> Option<&PartialWallet> {
        match self {
            CreateWalletError::KeyAddressMismatch { partial, .. } => partial.as_ref(),
            CreateWalletError::DiscoveryAborted { partial, .. }
            | CreateWalletError::AddressBatchPersistFailed { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// Input of [`WalletCreator::create_wallet`].
#[derive(Clone)]
pub struct CreateWalletRequest {
    pub wallet_set_id: String,
    pub wallet_name: String,
    pub account_index: u32,
    pub mnemonic: Zeroizing<String>,
}

impl CreateWalletRequest {
    pub fn new(
        wallet_set_id: impl Into<String>,
        wallet_name: impl Into<String>,
        account_index: u32,
        mnemonic: &str,
    ) -> Self {
        Self {
            wallet_set_id: wallet_set_id.into(),
            wallet_name: wallet_name.into(),
            account_index,
            mnemonic: Zeroizing::new(mnemonic.to_string()),
        }
    }
}

impl fmt::Debug for CreateWalletRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CreateWalletRequest")
            .field("wallet_set_id", &self.wallet_set_id)
            .field("wallet_name", &self.wallet_name)
            .field("account_index", &self.account_index)
            .field("mnemonic", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWallet {
    pub wallet_id: String,
    pub account_index: u32,
    pub address: String,
    pub stake_address: String,
    pub receiving: BranchOutcome,
    pub change: BranchOutcome,
}

/// Creates wallets against a store and a usage oracle.
pub struct WalletCreator {
    store: Arc<dyn WalletStore>,
    oracle: Arc<dyn AddressUsageOracle>,
    network: NetworkType,
    gap_limit: u32,
    cancel: Option<CancellationToken>,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl WalletCreator {
    pub fn new(
        store: Arc<dyn WalletStore>,
        oracle: Arc<dyn AddressUsageOracle>,
        network: NetworkType,
    ) -> Self {
        Self {
            store,
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

    pub fn network(&self) -> NetworkType {
        self.network
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    fn scanner(&self) -> DiscoveryScanner<'_> {
        let mut scanner = DiscoveryScanner::new(self.oracle.as_ref(), self.network).with_gap_limit(self.gap_limit);
        if let Some(token) = &self.cancel {
            scanner = scanner.with_cancellation(token.clone());
        }
        if let Some(tx) = &self.progress {
            scanner = scanner.with_progress(tx.clone());
        }
        scanner
    }

    async fn check_account_index(&self, request: &CreateWalletRequest) -> Result<(), CreateWalletError> {
        let invalid = |reason: String| CreateWalletError::AccountIndexInvalid {
            wallet_set_id: request.wallet_set_id.clone(),
            account_index: request.account_index,
            reason,
        };

        match self
            .store
            .validate_account_index(&request.wallet_set_id, request.account_index)
            .await
        {
            Ok(None) => Ok(()),
            Ok(Some(reason)) if reason.trim().is_empty() => Ok(()),
            Ok(Some(reason)) => Err(invalid(reason)),
            Err(e) => Err(invalid(e.to_string())),
        }
    }

    fn derive(&self, request: &CreateWalletRequest) -> Result<AccountKeys, CreateWalletError> {
        derive_keys(&request.mnemonic, request.account_index).map_err(|e| match e {
            DerivationError::Mnemonic(MnemonicError::Empty) => CreateWalletError::EmptyMnemonic,
            DerivationError::Mnemonic(other) => CreateWalletError::InvalidMnemonic(other.to_string()),
            DerivationError::AccountIndexOutOfRange(index) => CreateWalletError::AccountIndexInvalid {
                wallet_set_id: request.wallet_set_id.clone(),
                account_index: index,
                reason: "must be below 2^31".to_string(),
            },
            other => CreateWalletError::KeyDerivation {
                account_index: request.account_index,
                reason: other.to_string(),
            },
        })
    }

    fn wallet_record(
        &self,
        request: &CreateWalletRequest,
        keys: &AccountKeys,
    ) -> Result<NewWalletRecord, CreateWalletError> {
        let key_error = |e: crate::keys::KeyError| CreateWalletError::KeyDerivation {
            account_index: request.account_index,
            reason: e.to_string(),
        };
        let primary = build_primary(keys, self.network).map_err(|e| CreateWalletError::KeyDerivation {
            account_index: request.account_index,
            reason: e.to_string(),
        })?;
        verify_derived(&primary.payment).map_err(|source| CreateWalletError::KeyAddressMismatch {
            source,
            partial: None,
        })?;

        Ok(NewWalletRecord {
            wallet_set_id: request.wallet_set_id.clone(),
            name: request.wallet_name.trim().to_string(),
            account_index: request.account_index,
            address: primary.payment.address.clone(),
            stake_address: primary.stake_address,
            account_public_key: keys.account_public_key().to_bech32().map_err(key_error)?,
            payment_public_key: keys.payment_public_key().to_bech32().map_err(key_error)?,
            stake_public_key: keys.stake_public_key().to_bech32().map_err(key_error)?,
            payment_private_key: keys.payment_key().to_bech32().map_err(key_error)?,
            stake_private_key: keys.stake_key().to_bech32().map_err(key_error)?,
        })
    }

    async fn scan_and_persist(
        &self,
        keys: &AccountKeys,
        branch: Branch,
        partial: &PartialWallet,
    ) -> Result<BranchOutcome, CreateWalletError> {
        let discovered = self.scanner().discover(keys, branch).await.map_err(|e| match e {
            DiscoveryError::Mismatch(source) => CreateWalletError::KeyAddressMismatch {
                source,
                partial: Some(partial.clone()),
            },
            source => CreateWalletError::DiscoveryAborted {
                branch,
                source,
                partial: partial.clone(),
            },
        })?;

        let records = to_records(&discovered).map_err(|source| CreateWalletError::DiscoveryAborted {
            branch,
            source,
            partial: partial.clone(),
        })?;
        let used = records.iter().filter(|r| r.is_used).count();

        self.emit(ProgressEvent::Persisting {
            branch,
            count: records.len(),
        });
        let persisted = self
            .store
            .persist_addresses(&partial.wallet_id, branch, &records)
            .await
            .map_err(|e| {
                log::error!("failed to persist {} addresses for {}: {}", branch, partial.wallet_id, e);
                CreateWalletError::AddressBatchPersistFailed {
                    branch,
                    reason: e.to_string(),
                    partial: partial.clone(),
                }
            })?;
        if persisted.len() != records.len() {
            log::warn!(
                "store returned {} ids for {} {} addresses",
                persisted.len(),
                records.len(),
                branch
            );
        }
        self.emit(ProgressEvent::Persisted {
            branch,
            count: persisted.len(),
        });

        Ok(BranchOutcome {
            branch,
            persisted,
            used,
        })
    }

    /// Create a wallet and store its discovered addresses.
    pub async fn create_wallet(&self, request: &CreateWalletRequest) -> Result<CreatedWallet, CreateWalletError> {
        if request.wallet_name.trim().is_empty() {
            return Err(CreateWalletError::InvalidWalletName);
        }

        self.check_account_index(request).await?;
        let keys = self.derive(request)?;
        let record = self.wallet_record(request, &keys)?;
        let address = record.address.clone();
        let stake_address = record.stake_address.clone();

        let wallet_id = match self.store.create_wallet(record).await {
            Ok(id) if !id.trim().is_empty() => id,
            Ok(_) => {
                return Err(CreateWalletError::WalletRecordCreationFailed {
                    reason: "no wallet id returned".to_string(),
                })
            }
            Err(e) => return Err(CreateWalletError::WalletRecordCreationFailed { reason: e.to_string() }),
        };
        log::info!(
            "wallet {} created for account {} of set {}",
            wallet_id,
            request.account_index,
            request.wallet_set_id
        );

        let mut partial = PartialWallet {
            wallet_id,
            completed: Vec::new(),
        };
        let receiving = self.scan_and_persist(&keys, Branch::Receiving, &partial).await?;
        partial.completed.push(receiving.clone());
        let change = self.scan_and_persist(&keys, Branch::Change, &partial).await?;

        Ok(CreatedWallet {
            wallet_id: partial.wallet_id,
            account_index: request.account_index,
            address,
            stake_address,
            receiving,
            change,
        })
    }
}
