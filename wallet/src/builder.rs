//! Address Builder: one coordinate in, one base address out.

use crate::address::{Address, AddressError, NetworkType};
use crate::derivation::{AccountKeys, Branch, DerivationPath, PRIMARY_PAYMENT_INDEX};
use crate::keys::{is_hardened, ExtendedPrivateKey, ExtendedPublicKey, KeyError, KeyHash};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Branch {0} does not hold payment addresses")]
    UnsupportedBranch(Branch),

    #[error("Address index {0} is out of range (must be below 2^31)")]
    IndexOutOfRange(u32),

    #[error("Address encoding failed: {0}")]
    Address(#[from] AddressError),

    #[error("Key encoding failed: {0}")]
    Key(#[from] KeyError),
}

/// Output of the builder for one `(branch, index)`.
#[derive(Clone)]
pub struct DerivedAddress {
    pub index: u32,
    pub branch: Branch,
    pub path: DerivationPath,
    pub public_key: ExtendedPublicKey,
    private_key: ExtendedPrivateKey,
    /// Bech32 base address.
    pub address: String,
    pub payment_key_hash: KeyHash,
}

impl DerivedAddress {
    pub fn private_key(&self) -> &ExtendedPrivateKey {
        &self.private_key
    }

    pub fn public_key_bech32(&self) -> Result<String, KeyError> {
        self.public_key.to_bech32()
    }

    pub fn private_key_bech32(&self) -> Result<Zeroizing<String>, KeyError> {
        self.private_key.to_bech32()
    }
}

impl fmt::Debug for DerivedAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DerivedAddress")
            .field("path", &self.path.to_string())
            .field("address", &self.address)
            .field("payment_key_hash", &self.payment_key_hash)
            .finish_non_exhaustive()
    }
}

/// Build the base address at `branch/index` of the account.
///
/// The stake part is always the account's stake credential. Same inputs
/// give the same output.
pub fn build_address(
    keys: &AccountKeys,
    branch: Branch,
    index: u32,
    network: NetworkType,
) -> Result<DerivedAddress, BuildError> {
    if branch == Branch::Stake {
        return Err(BuildError::UnsupportedBranch(branch));
    }
    if is_hardened(index) {
        return Err(BuildError::IndexOutOfRange(index));
    }

    let private_key = keys.derive_child(branch, index);
    let public_key = private_key.public();
    let payment_key_hash = public_key.hash();
    let address = Address::base(network, payment_key_hash, *keys.stake_credential()).to_bech32()?;

    Ok(DerivedAddress {
        index,
        branch,
        path: DerivationPath::new(keys.account_index(), branch, index),
        public_key,
        private_key,
        address,
        payment_key_hash,
    })
}

/// Primary payment address plus the account's reward address.
#[derive(Debug, Clone)]
pub struct PrimaryAddresses {
    pub payment: DerivedAddress,
    pub stake_address: String,
}

pub fn build_primary(keys: &AccountKeys, network: NetworkType) -> Result<PrimaryAddresses, BuildError> {
    let payment = build_address(keys, Branch::Receiving, PRIMARY_PAYMENT_INDEX, network)?;
    let stake_address = Address::reward(network, *keys.stake_credential()).to_bech32()?;
    Ok(PrimaryAddresses {
        payment,
        stake_address,
    })
}
