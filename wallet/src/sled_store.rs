//! Sled-backed wallet store
//!
//! Trees:
//! - `wallet_sets`: set id -> [`WalletSet`]
//! - `accounts`: `"{set}/{account}"` -> wallet id
//! - `wallets`: wallet id -> [`WalletRow`]
//! - `addresses`: `"{wallet}/{branch}/{index}"` -> [`AddressRecord`]
//!
//! Values are bincode. Private keys in a [`NewWalletRecord`] are not
//! written; they can always be derived again from the phrase.

use crate::derivation::{root_fingerprint, Branch};
use crate::keys::KeyHash;
use crate::store::{AddressRecord, NewWalletRecord, PersistedAddress, StoreError, WalletStore};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A group of accounts sharing one seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSet {
    pub id: String,
    pub name: String,
    /// Blake2b-224 of the root extended public key.
    pub fingerprint: Option<KeyHash>,
    pub created_at: i64,
}

/// Stored form of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRow {
    pub id: String,
    pub wallet_set_id: String,
    pub name: String,
    pub account_index: u32,
    pub address: String,
    pub stake_address: String,
    pub account_public_key: String,
    pub payment_public_key: String,
    pub stake_public_key: String,
    pub created_at: i64,
}

pub struct SledWalletStore {
    db: sled::Db,
    wallet_sets: sled::Tree,
    accounts: sled::Tree,
    wallets: sled::Tree,
    addresses: sled::Tree,
}

fn account_key(wallet_set_id: &str, account_index: u32) -> String {
    format!("{}/{}", wallet_set_id, account_index)
}

fn address_id(wallet_id: &str, branch: Branch, index: u32) -> String {
    format!("{}/{}/{}", wallet_id, branch, index)
}

impl SledWalletStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            wallet_sets: db.open_tree("wallet_sets")?,
            accounts: db.open_tree("accounts")?,
            wallets: db.open_tree("wallets")?,
            addresses: db.open_tree("addresses")?,
            db,
        })
    }

    /// Register a wallet set. With a phrase, its fingerprint is kept for
    /// later seed checks.
    pub fn register_wallet_set(
        &self,
        id: &str,
        name: &str,
        mnemonic: Option<&str>,
    ) -> Result<WalletSet, StoreError> {
        let fingerprint = match mnemonic {
            Some(phrase) => Some(root_fingerprint(phrase).map_err(|e| StoreError::Backend(e.to_string()))?),
            None => None,
        };
        let set = WalletSet {
            id: id.to_string(),
            name: name.to_string(),
            fingerprint,
            created_at: chrono::Utc::now().timestamp(),
        };

        let value = bincode::serialize(&set)?;
        let swapped = self
            .wallet_sets
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(value))?;
        if swapped.is_err() {
            return Err(StoreError::DuplicateWalletSet(id.to_string()));
        }
        self.db.flush()?;

        log::info!("registered wallet set {}", id);
        Ok(set)
    }

    pub fn get_wallet_set(&self, id: &str) -> Result<Option<WalletSet>, StoreError> {
        match self.wallet_sets.get(id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn require_wallet_set(&self, id: &str) -> Result<WalletSet, StoreError> {
        self.get_wallet_set(id)?
            .ok_or_else(|| StoreError::UnknownWalletSet(id.to_string()))
    }

    pub fn get_wallet(&self, wallet_id: &str) -> Result<Option<WalletRow>, StoreError> {
        match self.wallets.get(wallet_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Account indices claimed in a wallet set, ascending.
    pub fn used_account_indices(&self, wallet_set_id: &str) -> Result<Vec<u32>, StoreError> {
        let prefix = format!("{}/", wallet_set_id);
        let mut indices = Vec::new();
        for item in self.accounts.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key);
            if let Ok(index) = key[prefix.len()..].parse::<u32>() {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Persisted addresses of a wallet, receiving before change, by index.
    pub fn list_addresses(&self, wallet_id: &str) -> Result<Vec<(String, AddressRecord)>, StoreError> {
        let prefix = format!("{}/", wallet_id);
        let mut result = Vec::new();
        for item in self.addresses.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            let record: AddressRecord = bincode::deserialize(&value)?;
            result.push((String::from_utf8_lossy(&key).to_string(), record));
        }
        result.sort_by_key(|(_, r)| (r.branch.role(), r.index));
        Ok(result)
    }
}

#[async_trait::async_trait]
impl WalletStore for SledWalletStore {
    async fn next_account_index(&self, wallet_set_id: &str) -> Result<u32, StoreError> {
        self.require_wallet_set(wallet_set_id)?;
        let next = match self.used_account_indices(wallet_set_id)?.last() {
            Some(max) => max + 1,
            None => 0,
        };
        Ok(next)
    }

    async fn validate_account_index(
        &self,
        wallet_set_id: &str,
        account_index: u32,
    ) -> Result<Option<String>, StoreError> {
        if self.get_wallet_set(wallet_set_id)?.is_none() {
            return Ok(Some(format!("Wallet set {} does not exist", wallet_set_id)));
        }
        if crate::keys::is_hardened(account_index) {
            return Ok(Some(format!("Account index {} is out of range", account_index)));
        }
        if self
            .accounts
            .contains_key(account_key(wallet_set_id, account_index).as_bytes())?
        {
            return Ok(Some(format!(
                "Account index {} is already used in this wallet set",
                account_index
            )));
        }
        Ok(None)
    }

    async fn verify_seed_phrase(&self, wallet_set_id: &str, mnemonic: &str) -> Result<bool, StoreError> {
        let set = self.require_wallet_set(wallet_set_id)?;
        let Some(expected) = set.fingerprint else {
            return Ok(true);
        };
        match root_fingerprint(mnemonic) {
            Ok(fingerprint) => Ok(fingerprint == expected),
            Err(_) => Ok(false),
        }
    }

    async fn create_wallet(&self, record: NewWalletRecord) -> Result<String, StoreError> {
        self.require_wallet_set(&record.wallet_set_id)?;

        let wallet_id = format!("wallet-{}", self.db.generate_id()?);
        let claim = account_key(&record.wallet_set_id, record.account_index);
        let swapped = self.accounts.compare_and_swap(
            claim.as_bytes(),
            None as Option<&[u8]>,
            Some(wallet_id.as_bytes()),
        )?;
        if swapped.is_err() {
            return Err(StoreError::AccountIndexTaken {
                wallet_set_id: record.wallet_set_id,
                index: record.account_index,
            });
        }

        let row = WalletRow {
            id: wallet_id.clone(),
            wallet_set_id: record.wallet_set_id,
            name: record.name,
            account_index: record.account_index,
            address: record.address,
            stake_address: record.stake_address,
            account_public_key: record.account_public_key,
            payment_public_key: record.payment_public_key,
            stake_public_key: record.stake_public_key,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.wallets.insert(wallet_id.as_bytes(), bincode::serialize(&row)?)?;
        self.db.flush()?;

        log::info!(
            "created wallet {} for account {} of set {}",
            wallet_id,
            row.account_index,
            row.wallet_set_id
        );
        Ok(wallet_id)
    }

    async fn persist_addresses(
        &self,
        wallet_id: &str,
        branch: Branch,
        records: &[AddressRecord],
    ) -> Result<Vec<PersistedAddress>, StoreError> {
        if !self.wallets.contains_key(wallet_id.as_bytes())? {
            return Err(StoreError::UnknownWallet(wallet_id.to_string()));
        }

        let mut batch = sled::Batch::default();
        let mut persisted = Vec::with_capacity(records.len());
        for record in records {
            if record.branch != branch {
                return Err(StoreError::Backend(format!(
                    "record {} belongs to {} not {}",
                    record.index, record.branch, branch
                )));
            }
            let id = address_id(wallet_id, branch, record.index);
            batch.insert(id.as_bytes(), bincode::serialize(record)?);
            persisted.push(PersistedAddress {
                id,
                index: record.index,
            });
        }

        self.addresses.apply_batch(batch)?;
        self.db.flush()?;

        log::debug!("stored {} {} addresses for {}", persisted.len(), branch, wallet_id);
        Ok(persisted)
    }
}
