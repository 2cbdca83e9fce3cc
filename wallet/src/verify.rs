//! Key-address consistency check run after every derivation.

use crate::address::Address;
use crate::builder::DerivedAddress;
use crate::derivation::Branch;
use crate::keys::ExtendedPrivateKey;
use thiserror::Error;

/// A derived private key does not control the address built for it.
#[derive(Debug, Clone, Error)]
#[error("Key/address mismatch at {branch} index {index} ({address})")]
pub struct KeyAddressMismatch {
    pub branch: Branch,
    pub index: u32,
    pub address: String,
}

/// True when the key's public-key hash equals the address's payment
/// credential. Base and enterprise forms are both accepted; anything else
/// (reward addresses, malformed text) is a mismatch.
pub fn verify_match(private_key: &ExtendedPrivateKey, address: &str) -> bool {
    let payment = match Address::from_bech32(address) {
        Ok(parsed @ (Address::Base { .. } | Address::Enterprise { .. })) => parsed.payment_key_hash().copied(),
        Ok(Address::Reward { .. }) => None,
        Err(e) => {
            log::debug!("address did not parse during verification: {}", e);
            None
        }
    };

    match payment {
        Some(hash) => private_key.public().hash() == hash,
        None => false,
    }
}

/// Recheck a builder output from its private key.
pub fn verify_derived(derived: &DerivedAddress) -> Result<(), KeyAddressMismatch> {
    if verify_match(derived.private_key(), &derived.address) {
        Ok(())
    } else {
        log::error!(
            "derived key does not match address at {} ({})",
            derived.path,
            derived.address
        );
        Err(KeyAddressMismatch {
            branch: derived.branch,
            index: derived.index,
            address: derived.address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NetworkType;
    use crate::builder::{build_address, build_primary};
    use crate::derivation::derive_keys;

    const ZERO_24: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon art";

    #[test]
    fn test_derived_addresses_verify() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        for branch in [Branch::Receiving, Branch::Change] {
            for index in 0..5 {
                let derived = build_address(&keys, branch, index, NetworkType::Mainnet).unwrap();
                assert!(verify_match(derived.private_key(), &derived.address));
                assert!(verify_derived(&derived).is_ok());
            }
        }
    }

    #[test]
    fn test_enterprise_form_verifies() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        let derived = build_address(&keys, Branch::Receiving, 0, NetworkType::Testnet).unwrap();
        let enterprise = Address::enterprise(NetworkType::Testnet, derived.payment_key_hash).to_string();
        assert!(verify_match(derived.private_key(), &enterprise));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        let first = build_address(&keys, Branch::Receiving, 0, NetworkType::Mainnet).unwrap();
        let second = build_address(&keys, Branch::Receiving, 1, NetworkType::Mainnet).unwrap();
        assert!(!verify_match(first.private_key(), &second.address));
    }

    #[test]
    fn test_mutated_record_rejected() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        let mut derived = build_address(&keys, Branch::Change, 4, NetworkType::Mainnet).unwrap();
        derived.address = build_address(&keys, Branch::Change, 5, NetworkType::Mainnet)
            .unwrap()
            .address;

        let err = verify_derived(&derived).unwrap_err();
        assert_eq!(err.branch, Branch::Change);
        assert_eq!(err.index, 4);
    }

    #[test]
    fn test_reward_and_garbage_rejected() {
        let keys = derive_keys(ZERO_24, 0).unwrap();
        let primary = build_primary(&keys, NetworkType::Mainnet).unwrap();
        assert!(!verify_match(keys.stake_key(), &primary.stake_address));
        assert!(!verify_match(keys.payment_key(), "not an address"));
        assert!(!verify_match(keys.payment_key(), ""));
    }
}
