use crate::keys::{KeyHash, KEY_HASH_SIZE};
use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid bech32 address: {0}")]
    InvalidBech32(String),

    #[error("Invalid address length: {0} bytes")]
    InvalidLength(usize),

    #[error("Unknown address prefix: {0}")]
    InvalidPrefix(String),

    #[error("Invalid network id: {0}")]
    InvalidNetwork(u8),

    #[error("Unsupported address type: {0:#06b}")]
    UnsupportedType(u8),

    #[error("Unknown network name: {0}")]
    UnknownNetwork(String),
}

/// Network type for addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    Testnet,
}

impl NetworkType {
    /// Network id carried in the low nibble of the address header.
    pub fn network_id(&self) -> u8 {
        match self {
            NetworkType::Mainnet => 1,
            NetworkType::Testnet => 0,
        }
    }

    pub fn from_network_id(id: u8) -> Result<Self, AddressError> {
        match id {
            1 => Ok(NetworkType::Mainnet),
            0 => Ok(NetworkType::Testnet),
            other => Err(AddressError::InvalidNetwork(other)),
        }
    }

    pub fn payment_hrp(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => "addr",
            NetworkType::Testnet => "addr_test",
        }
    }

    pub fn reward_hrp(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => "stake",
            NetworkType::Testnet => "stake_test",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkType::Mainnet => write!(f, "mainnet"),
            NetworkType::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for NetworkType {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkType::Mainnet),
            "testnet" | "preprod" | "preview" => Ok(NetworkType::Testnet),
            other => Err(AddressError::UnknownNetwork(other.to_string())),
        }
    }
}

const HEADER_BASE: u8 = 0b0000;
const HEADER_ENTERPRISE: u8 = 0b0110;
const HEADER_REWARD: u8 = 0b1110;

/// Shelley address with key-hash credentials.
///
/// Header byte is `type << 4 | network_id`. Script credentials, pointer
/// and Byron addresses are not produced by this wallet and are rejected
/// when parsed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Base {
        network: NetworkType,
        payment: KeyHash,
        stake: KeyHash,
    },
    Enterprise {
        network: NetworkType,
        payment: KeyHash,
    },
    Reward {
        network: NetworkType,
        stake: KeyHash,
    },
}

impl Address {
    pub fn base(network: NetworkType, payment: KeyHash, stake: KeyHash) -> Self {
        Address::Base {
            network,
            payment,
            stake,
        }
    }

    pub fn enterprise(network: NetworkType, payment: KeyHash) -> Self {
        Address::Enterprise { network, payment }
    }

    pub fn reward(network: NetworkType, stake: KeyHash) -> Self {
        Address::Reward { network, stake }
    }

    pub fn network(&self) -> NetworkType {
        match self {
            Address::Base { network, .. }
            | Address::Enterprise { network, .. }
            | Address::Reward { network, .. } => *network,
        }
    }

    /// Payment credential key hash, if the address has one.
    pub fn payment_key_hash(&self) -> Option<&KeyHash> {
        match self {
            Address::Base { payment, .. } | Address::Enterprise { payment, .. } => Some(payment),
            Address::Reward { .. } => None,
        }
    }

    pub fn stake_key_hash(&self) -> Option<&KeyHash> {
        match self {
            Address::Base { stake, .. } | Address::Reward { stake, .. } => Some(stake),
            Address::Enterprise { .. } => None,
        }
    }

    fn header_type(&self) -> u8 {
        match self {
            Address::Base { .. } => HEADER_BASE,
            Address::Enterprise { .. } => HEADER_ENTERPRISE,
            Address::Reward { .. } => HEADER_REWARD,
        }
    }

    fn hrp(&self) -> &'static str {
        match self {
            Address::Reward { network, .. } => network.reward_hrp(),
            other => other.network().payment_hrp(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 2 * KEY_HASH_SIZE);
        bytes.push(self.header_type() << 4 | self.network().network_id());
        match self {
            Address::Base { payment, stake, .. } => {
                bytes.extend_from_slice(payment.as_bytes());
                bytes.extend_from_slice(stake.as_bytes());
            }
            Address::Enterprise { payment, .. } => bytes.extend_from_slice(payment.as_bytes()),
            Address::Reward { stake, .. } => bytes.extend_from_slice(stake.as_bytes()),
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let header = *bytes.first().ok_or(AddressError::InvalidLength(0))?;
        let network = NetworkType::from_network_id(header & 0x0f)?;
        let body = &bytes[1..];
        let hash = |range: std::ops::Range<usize>| {
            KeyHash::from_slice(&body[range]).map_err(|_| AddressError::InvalidLength(bytes.len()))
        };

        match header >> 4 {
            HEADER_BASE => {
                if body.len() != 2 * KEY_HASH_SIZE {
                    return Err(AddressError::InvalidLength(bytes.len()));
                }
                Ok(Address::Base {
                    network,
                    payment: hash(0..KEY_HASH_SIZE)?,
                    stake: hash(KEY_HASH_SIZE..2 * KEY_HASH_SIZE)?,
                })
            }
            HEADER_ENTERPRISE => {
                if body.len() != KEY_HASH_SIZE {
                    return Err(AddressError::InvalidLength(bytes.len()));
                }
                Ok(Address::Enterprise {
                    network,
                    payment: hash(0..KEY_HASH_SIZE)?,
                })
            }
            HEADER_REWARD => {
                if body.len() != KEY_HASH_SIZE {
                    return Err(AddressError::InvalidLength(bytes.len()));
                }
                Ok(Address::Reward {
                    network,
                    stake: hash(0..KEY_HASH_SIZE)?,
                })
            }
            other => Err(AddressError::UnsupportedType(other)),
        }
    }

    pub fn to_bech32(&self) -> Result<String, AddressError> {
        bech32::encode(self.hrp(), self.to_bytes().to_base32(), Variant::Bech32)
            .map_err(|e| AddressError::InvalidBech32(e.to_string()))
    }

    /// Parse bech32 text; the prefix must agree with the header.
    pub fn from_bech32(s: &str) -> Result<Self, AddressError> {
        let (hrp, data, variant) =
            bech32::decode(s).map_err(|e| AddressError::InvalidBech32(e.to_string()))?;
        if variant != Variant::Bech32 {
            return Err(AddressError::InvalidBech32("bech32m variant".to_string()));
        }
        let bytes =
            Vec::<u8>::from_base32(&data).map_err(|e| AddressError::InvalidBech32(e.to_string()))?;
        let address = Self::from_bytes(&bytes)?;

        if address.hrp() != hrp {
            return Err(AddressError::InvalidPrefix(hrp));
        }
        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let encoded = self.to_bech32().map_err(|_| fmt::Error)?;
        write!(f, "{}", encoded)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIP19_PAYMENT_HASH: &str = "9493315cd92eb5d8c4304e67b7e16ae36d61d34502694657811a2c8e";
    const ZERO_ENTROPY_STAKE_HASH: &str = "c2f45a16a6685616e566c00fc081fe59f8bd7ab679ee15e9ce203446";

    fn payment_hash() -> KeyHash {
        KeyHash::from_hex(CIP19_PAYMENT_HASH).unwrap()
    }

    fn stake_hash() -> KeyHash {
        KeyHash::from_hex(ZERO_ENTROPY_STAKE_HASH).unwrap()
    }

    #[test]
    fn test_enterprise_address_vector() {
        let address = Address::enterprise(NetworkType::Mainnet, payment_hash());
        assert_eq!(
            address.to_string(),
            "addr1vx2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzers66hrl8"
        );
    }

    #[test]
    fn test_reward_address_vector() {
        let address = Address::reward(NetworkType::Mainnet, stake_hash());
        assert_eq!(
            address.to_string(),
            "stake1u8p0gksk5e59v9h9vmqqlsyplevl30t6keu7u90fecsrg3sv33m94"
        );
    }

    #[test]
    fn test_base_address_round_trip() {
        let address = Address::base(NetworkType::Mainnet, payment_hash(), stake_hash());
        let text = address.to_string();
        assert!(text.starts_with("addr1q"));

        let parsed = Address::from_bech32(&text).unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.payment_key_hash(), Some(&payment_hash()));
        assert_eq!(parsed.stake_key_hash(), Some(&stake_hash()));
    }

    #[test]
    fn test_testnet_prefixes() {
        let base = Address::base(NetworkType::Testnet, payment_hash(), stake_hash());
        assert!(base.to_string().starts_with("addr_test1"));

        let reward = Address::reward(NetworkType::Testnet, stake_hash());
        assert!(reward.to_string().starts_with("stake_test1"));
        assert_eq!(reward.to_bytes()[0], 0xe0);
    }

    #[test]
    fn test_header_bytes() {
        assert_eq!(Address::base(NetworkType::Mainnet, payment_hash(), stake_hash()).to_bytes()[0], 0x01);
        assert_eq!(Address::enterprise(NetworkType::Mainnet, payment_hash()).to_bytes()[0], 0x61);
        assert_eq!(Address::reward(NetworkType::Mainnet, stake_hash()).to_bytes()[0], 0xe1);
        assert_eq!(Address::base(NetworkType::Mainnet, payment_hash(), stake_hash()).to_bytes().len(), 57);
    }

    #[test]
    fn test_reward_address_has_no_payment_credential() {
        let reward = Address::reward(NetworkType::Mainnet, stake_hash());
        assert!(reward.payment_key_hash().is_none());
    }

    #[test]
    fn test_mismatched_prefix_rejected() {
        let bytes = Address::enterprise(NetworkType::Mainnet, payment_hash()).to_bytes();
        let wrong = bech32::encode("stake", bytes.to_base32(), Variant::Bech32).unwrap();
        assert!(matches!(
            Address::from_bech32(&wrong),
            Err(AddressError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_unsupported_header_rejected() {
        let mut bytes = Address::enterprise(NetworkType::Mainnet, payment_hash()).to_bytes();
        bytes[0] = 0x71; // enterprise script credential
        assert!(matches!(
            Address::from_bytes(&bytes),
            Err(AddressError::UnsupportedType(0b0111))
        ));
    }

    #[test]
    fn test_invalid_address() {
        assert!(Address::from_bech32("INVALID").is_err());
        assert!(Address::from_bech32("addr1invalid").is_err());
        assert!(Address::from_bytes(&[]).is_err());
        assert!(Address::from_bytes(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("mainnet".parse::<NetworkType>().unwrap(), NetworkType::Mainnet);
        assert_eq!("Preprod".parse::<NetworkType>().unwrap(), NetworkType::Testnet);
        assert!("devnet".parse::<NetworkType>().is_err());
        assert!(NetworkType::from_network_id(3).is_err());
    }
}
