//! Persistence, index and seed contracts the orchestrator calls into.

use crate::derivation::Branch;
use crate::keys::KeyHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Unknown wallet set: {0}")]
    UnknownWalletSet(String),

    #[error("Wallet set already exists: {0}")]
    DuplicateWalletSet(String),

    #[error("Unknown wallet: {0}")]
    UnknownWallet(String),

    #[error("Account index {index} is already used in wallet set {wallet_set_id}")]
    AccountIndexTaken { wallet_set_id: String, index: u32 },

    #[error("{0}")]
    Backend(String),
}

/// Wallet record submitted once the primary address has been verified.
#[derive(Clone)]
pub struct NewWalletRecord {
    pub wallet_set_id: String,
    pub name: String,
    pub account_index: u32,
    pub address: String,
    pub stake_address: String,
    pub account_public_key: String,
    pub payment_public_key: String,
    pub stake_public_key: String,
    pub payment_private_key: Zeroizing<String>,
    pub stake_private_key: Zeroizing<String>,
}

impl fmt::Debug for NewWalletRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NewWalletRecord")
            .field("wallet_set_id", &self.wallet_set_id)
            .field("name", &self.name)
            .field("account_index", &self.account_index)
            .field("address", &self.address)
            .field("stake_address", &self.stake_address)
            .finish_non_exhaustive()
    }
}

/// One discovered address as handed to the batch persister. Carries no
/// private key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub index: u32,
    pub branch: Branch,
    pub path: String,
    pub public_key: String,
    pub address: String,
    pub payment_key_hash: KeyHash,
    pub is_used: bool,
    pub usage_detail: Option<String>,
    pub usage_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAddress {
    pub id: String,
    pub index: u32,
}

/// Storage side of wallet creation.
///
/// `create_wallet` reports failure either as an error or as an empty id.
/// `persist_addresses` stores the whole batch or none of it.
#[async_trait::async_trait]
pub trait WalletStore: Send + Sync {
    /// Next free account index of a wallet set.
    async fn next_account_index(&self, wallet_set_id: &str) -> Result<u32, StoreError>;

    /// `None` when the index may be used, otherwise the reason it may not.
    async fn validate_account_index(
        &self,
        wallet_set_id: &str,
        account_index: u32,
    ) -> Result<Option<String>, StoreError>;

    /// Whether `mnemonic` is the phrase the wallet set was created from.
    async fn verify_seed_phrase(&self, wallet_set_id: &str, mnemonic: &str) -> Result<bool, StoreError>;

    async fn create_wallet(&self, record: NewWalletRecord) -> Result<String, StoreError>;

    async fn persist_addresses(
        &self,
        wallet_id: &str,
        branch: Branch,
        records: &[AddressRecord],
    ) -> Result<Vec<PersistedAddress>, StoreError>;
}
