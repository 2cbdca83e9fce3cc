//! Shelley HD wallet engine
//!
//! - BIP-39 phrase gate (15 or 24 words)
//! - Icarus BIP32-Ed25519 key derivation on `m/1852'/1815'/account'`
//! - Base, enterprise and reward addresses with bech32 text forms
//! - Key/address self-check after every derivation
//! - Gap-limit discovery of receiving and change addresses
//! - Wallet creation pipeline over pluggable store and usage oracle
//! - Sled-backed reference store

pub mod address;
pub mod builder;
pub mod derivation;
pub mod discovery;
pub mod keys;
pub mod mnemonic;
pub mod oracle;
pub mod orchestrator;
pub mod sled_store;
pub mod store;
pub mod verify;

pub use address::{Address, AddressError, NetworkType};
pub use builder::{build_address, build_primary, BuildError, DerivedAddress, PrimaryAddresses};
pub use derivation::{
    derive_keys, root_fingerprint, AccountKeys, Branch, DerivationError, DerivationPath, COIN_TYPE,
    PURPOSE,
};
pub use discovery::{
    DiscoveredAddress, DiscoveryError, DiscoveryScanner, ProgressEvent, DEFAULT_GAP_LIMIT,
};
pub use keys::{ExtendedPrivateKey, ExtendedPublicKey, KeyError, KeyHash};
pub use mnemonic::{
    generate_mnemonic, is_valid_bip39_word, validate_mnemonic, MnemonicError, MnemonicPhrase,
};
pub use oracle::{AddressUsage, AddressUsageOracle, OracleError, UsageCheck};
pub use orchestrator::{
    BranchOutcome, CreateWalletError, CreateWalletRequest, CreatedWallet, PartialWallet,
    WalletCreator,
};
pub use sled_store::{SledWalletStore, WalletRow, WalletSet};
pub use store::{AddressRecord, NewWalletRecord, PersistedAddress, StoreError, WalletStore};
pub use verify::{verify_derived, verify_match, KeyAddressMismatch};
