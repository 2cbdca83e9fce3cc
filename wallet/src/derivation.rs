//! Key derivation along the Shelley account path
//!
//! `m / 1852' / 1815' / account' / role / index`, where role 0 is the
//! receiving chain, 1 the change chain and 2 the staking key.

use crate::keys::{harden, is_hardened, ExtendedPrivateKey, ExtendedPublicKey, KeyHash};
use crate::mnemonic::{mnemonic_to_entropy, MnemonicError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// CIP-1852 purpose.
pub const PURPOSE: u32 = 1852;
/// Registered coin type for ada.
pub const COIN_TYPE: u32 = 1815;
/// The staking key sits at a fixed index of the stake role.
pub const STAKE_KEY_INDEX: u32 = 0;
/// The primary payment key is the first receiving key.
pub const PRIMARY_PAYMENT_INDEX: u32 = 0;

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error(transparent)]
    Mnemonic(#[from] MnemonicError),

    #[error("Account index {0} is out of range (must be below 2^31)")]
    AccountIndexOutOfRange(u32),

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),
}

/// Fixed sub-path under an account key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Receiving,
    Change,
    Stake,
}

impl Branch {
    /// Role segment of the derivation path.
    pub fn role(&self) -> u32 {
        match self {
            Branch::Receiving => 0,
            Branch::Change => 1,
            Branch::Stake => 2,
        }
    }

    /// Tag attached to persisted batches.
    pub fn label(&self) -> &'static str {
        match self {
            Branch::Receiving => "receiving",
            Branch::Change => "change",
            Branch::Stake => "stake",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Branch {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "receiving" | "external" | "0" => Ok(Branch::Receiving),
            "change" | "internal" | "1" => Ok(Branch::Change),
            "stake" | "2" => Ok(Branch::Stake),
            other => Err(DerivationError::UnknownBranch(other.to_string())),
        }
    }
}

/// Full derivation coordinate of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationPath {
    pub account: u32,
    pub branch: Branch,
    pub index: u32,
}

impl DerivationPath {
    pub fn new(account: u32, branch: Branch, index: u32) -> Self {
        Self {
            account,
            branch,
            index,
        }
    }

    /// Raw indices below the account key.
    pub fn account_relative(&self) -> [u32; 2] {
        [self.branch.role(), self.index]
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}/{}",
            PURPOSE,
            COIN_TYPE,
            self.account,
            self.branch.role(),
            self.index
        )
    }
}

/// Keys of one account. The root key is dropped once the account key
/// has been derived.
#[derive(Clone)]
pub struct AccountKeys {
    account_index: u32,
    account_key: ExtendedPrivateKey,
    payment_key: ExtendedPrivateKey,
    stake_key: ExtendedPrivateKey,
    stake_credential: KeyHash,
}

impl AccountKeys {
    pub fn account_index(&self) -> u32 {
        self.account_index
    }

    pub fn account_key(&self) -> &ExtendedPrivateKey {
        &self.account_key
    }

    pub fn account_public_key(&self) -> ExtendedPublicKey {
        self.account_key.public()
    }

    pub fn payment_key(&self) -> &ExtendedPrivateKey {
        &self.payment_key
    }

    pub fn payment_public_key(&self) -> ExtendedPublicKey {
        self.payment_key.public()
    }

    pub fn stake_key(&self) -> &ExtendedPrivateKey {
        &self.stake_key
    }

    pub fn stake_public_key(&self) -> ExtendedPublicKey {
        self.stake_key.public()
    }

    /// Stake key hash shared by every address of the account.
    pub fn stake_credential(&self) -> &KeyHash {
        &self.stake_credential
    }

    /// Derive the key at `branch/index` below the account key.
    pub fn derive_child(&self, branch: Branch, index: u32) -> ExtendedPrivateKey {
        self.account_key.derive_path(&[branch.role(), index])
    }
}

impl fmt::Debug for AccountKeys {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AccountKeys")
            .field("account_index", &self.account_index)
            .field("stake_credential", &self.stake_credential)
            .finish_non_exhaustive()
    }
}

fn root_key(mnemonic: &str) -> Result<ExtendedPrivateKey, MnemonicError> {
    let entropy = mnemonic_to_entropy(mnemonic)?;
    Ok(ExtendedPrivateKey::from_bip39_entropy(&entropy))
}

/// Derive the account, payment and stake keys for `account_index`.
///
/// The phrase is validated before any derivation work happens.
pub fn derive_keys(mnemonic: &str, account_index: u32) -> Result<AccountKeys, DerivationError> {
    let root = root_key(mnemonic)?;
    if is_hardened(account_index) {
        return Err(DerivationError::AccountIndexOutOfRange(account_index));
    }

    let account_key = root.derive_path(&[harden(PURPOSE), harden(COIN_TYPE), harden(account_index)]);
    drop(root);

    let payment_key = account_key.derive_path(&[Branch::Receiving.role(), PRIMARY_PAYMENT_INDEX]);
    let stake_key = account_key.derive_path(&[Branch::Stake.role(), STAKE_KEY_INDEX]);
    let stake_credential = stake_key.public().hash();

    log::debug!("derived keys for account {}", account_index);

    Ok(AccountKeys {
        account_index,
        account_key,
        payment_key,
        stake_key,
        stake_credential,
    })
}

/// Identifies a seed without revealing it: Blake2b-224 of the root
/// extended public key.
pub fn root_fingerprint(mnemonic: &str) -> Result<KeyHash, MnemonicError> {
    let root = root_key(mnemonic)?;
    Ok(KeyHash::of_bytes(root.public().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIP19_PHRASE: &str =
        "test walk nut penalty hip pave soap entry language right filter choice";
    const ZERO_24: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon art";

    #[test]
    fn test_path_strings() {
        assert_eq!(
            DerivationPath::new(5, Branch::Receiving, 3).to_string(),
            "m/1852'/1815'/5'/0/3"
        );
        assert_eq!(
            DerivationPath::new(5, Branch::Change, 3).to_string(),
            "m/1852'/1815'/5'/1/3"
        );
        assert_eq!(
            DerivationPath::new(0, Branch::Stake, 0).to_string(),
            "m/1852'/1815'/0'/2/0"
        );
    }

    #[test]
    fn test_branch_parsing() {
        assert_eq!("receiving".parse::<Branch>().unwrap(), Branch::Receiving);
        assert_eq!("Change".parse::<Branch>().unwrap(), Branch::Change);
        assert!("savings".parse::<Branch>().is_err());
    }

    #[test]
    fn test_account_keys_zero_entropy() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        assert_eq!(
            keys.account_public_key().to_bech32().unwrap(),
            "xpub1k0u2446ser6f355g950v6a9l258grpcw3xk2akpw3cgw7kr33pcfz2rdvq0vlc92lssjz92dk7rm7jyueu6uddwmt4sqjczjeze5ctcd0zfxc"
        );
        assert_eq!(
            keys.payment_public_key().hash().to_hex(),
            "00b7847c89d5721592fc0cc8932f50a8f8258b39b93861140a1b99fb"
        );
        assert_eq!(
            keys.stake_credential().to_hex(),
            "c2f45a16a6685616e566c00fc081fe59f8bd7ab679ee15e9ce203446"
        );
    }

    #[test]
    fn test_twelve_word_phrase_rejected() {
        let keys = derive_keys(CIP19_PHRASE, 0);
        assert!(matches!(
            keys,
            Err(DerivationError::Mnemonic(MnemonicError::InvalidWordCount(12)))
        ));
    }

    #[test]
    fn test_derive_child_matches_payment_key() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        let child = keys.derive_child(Branch::Receiving, 0);
        assert_eq!(child.as_bytes(), keys.payment_key().as_bytes());
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        let bad = ZERO_24.replace(" art", " zoo");
        assert!(matches!(
            derive_keys(&bad, 0),
            Err(DerivationError::Mnemonic(MnemonicError::InvalidMnemonic(_)))
        ));
        assert!(matches!(
            derive_keys("", 0),
            Err(DerivationError::Mnemonic(MnemonicError::Empty))
        ));
    }

    #[test]
    fn test_hardened_account_index_rejected() {
        assert!(matches!(
            derive_keys(ZERO_24, harden(0)),
            Err(DerivationError::AccountIndexOutOfRange(_))
        ));
    }

    #[test]
    fn test_accounts_differ() {
        let a = derive_keys(ZERO_24, 0).unwrap();
        let b = derive_keys(ZERO_24, 1).unwrap();
        assert_ne!(a.stake_credential(), b.stake_credential());
    }

    #[test]
    fn test_root_fingerprint_is_stable() {
        let a = root_fingerprint(ZERO_24).unwrap();
        let b = root_fingerprint(&ZERO_24.to_uppercase()).unwrap();
        assert_eq!(a, b);
        assert!(root_fingerprint("").is_err());
    }

    #[test]
    fn test_debug_hides_keys() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        let debug = format!("{:?}", keys);
        assert!(debug.contains("stake_credential"));
        assert!(!debug.contains("account_key"));
    }
}
