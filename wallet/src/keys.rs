//! BIP32-Ed25519 extended keys (Icarus master key, V2 child derivation)
//!
//! Extended private keys are `kL ‖ kR ‖ chain_code` (96 bytes), extended
//! public keys are `A ‖ chain_code` (64 bytes). Soft derivation is
//! supported, which is what lets `0/i` and `2/0` hang off a hardened
//! account key.

use bech32::{FromBase32, ToBase32, Variant};
use blake2::digest::consts::U28;
use blake2::{Blake2b, Digest};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;
type Blake2b224 = Blake2b<U28>;

pub const XPRV_SIZE: usize = 96;
pub const XPUB_SIZE: usize = 64;
pub const PUBLIC_KEY_SIZE: usize = 32;
pub const KEY_HASH_SIZE: usize = 28;

pub const HARDENED_OFFSET: u32 = 0x8000_0000;

const ICARUS_PBKDF2_ROUNDS: u32 = 4096;
const XPRV_HRP: &str = "xprv";
const XPUB_HRP: &str = "xpub";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid bech32 key encoding: {0}")]
    InvalidEncoding(String),

    #[error("Unexpected key prefix: expected {expected}, found {found}")]
    WrongPrefix { expected: &'static str, found: String },

    #[error("Extended private key bits are not normalised")]
    NotNormalized,
}

/// Mark an index as hardened.
pub fn harden(index: u32) -> u32 {
    index | HARDENED_OFFSET
}

pub fn is_hardened(index: u32) -> bool {
    index & HARDENED_OFFSET != 0
}

// ── scalar arithmetic on little-endian 256-bit values ───────────────

/// `x + 8·y` where `y` holds the 28 low bytes of the HMAC output.
fn add_28_mul8(x: &[u8], y: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for i in 0..28 {
        let r = x[i] as u16 + ((y[i] as u16) << 3) + carry;
        out[i] = (r & 0xff) as u8;
        carry = r >> 8;
    }
    for i in 28..32 {
        let r = x[i] as u16 + carry;
        out[i] = (r & 0xff) as u8;
        carry = r >> 8;
    }
    out
}

/// `x + y mod 2^256`
fn add_256bits(x: &[u8], y: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for i in 0..32 {
        let r = x[i] as u16 + y[i] as u16 + carry;
        out[i] = r as u8;
        carry = r >> 8;
    }
    out
}

/// `kL·B` without clamping.
fn public_point(kl: &[u8]) -> [u8; PUBLIC_KEY_SIZE] {
    let mut scalar_bytes = Zeroizing::new([0u8; 32]);
    scalar_bytes.copy_from_slice(&kl[..32]);
    let scalar = Scalar::from_bytes_mod_order(*scalar_bytes);
    EdwardsPoint::mul_base(&scalar).compress().to_bytes()
}

fn encode_bech32(hrp: &str, bytes: &[u8]) -> Result<String, KeyError> {
    bech32::encode(hrp, bytes.to_base32(), Variant::Bech32)
        .map_err(|e| KeyError::InvalidEncoding(e.to_string()))
}

fn decode_bech32(expected: &'static str, s: &str) -> Result<Vec<u8>, KeyError> {
    let (hrp, data, variant) =
        bech32::decode(s).map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
    if hrp != expected {
        return Err(KeyError::WrongPrefix {
            expected,
            found: hrp,
        });
    }
    if variant != Variant::Bech32 {
        return Err(KeyError::InvalidEncoding("bech32m is not used for keys".into()));
    }
    Vec::<u8>::from_base32(&data).map_err(|e| KeyError::InvalidEncoding(e.to_string()))
}

/// Blake2b-224 hash of a raw Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyHash([u8; KEY_HASH_SIZE]);

impl KeyHash {
    pub fn of_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> Self {
        Self::of_bytes(public_key)
    }

    /// Blake2b-224 of arbitrary bytes.
    pub fn of_bytes(data: &[u8]) -> Self {
        let digest = Blake2b224::digest(data);
        let mut hash = [0u8; KEY_HASH_SIZE];
        hash.copy_from_slice(&digest);
        Self(hash)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_HASH_SIZE {
            return Err(KeyError::InvalidLength {
                expected: KEY_HASH_SIZE,
                actual: bytes.len(),
            });
        }
        let mut hash = [0u8; KEY_HASH_SIZE];
        hash.copy_from_slice(bytes);
        Ok(Self(hash))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyHash({})", self.to_hex())
    }
}

/// BIP32-Ed25519 extended private key.
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    bytes: Zeroizing<[u8; XPRV_SIZE]>,
}

impl ExtendedPrivateKey {
    /// Icarus master key: PBKDF2-HMAC-SHA512 over the raw BIP-39 entropy,
    /// empty passphrase, then clamped.
    pub fn from_bip39_entropy(entropy: &[u8]) -> Self {
        let mut bytes = Zeroizing::new([0u8; XPRV_SIZE]);
        pbkdf2_hmac::<Sha512>(&[], entropy, ICARUS_PBKDF2_ROUNDS, &mut bytes[..]);
        bytes[0] &= 0b1111_1000;
        bytes[31] &= 0b0001_1111;
        bytes[31] |= 0b0100_0000;
        Self { bytes }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != XPRV_SIZE {
            return Err(KeyError::InvalidLength {
                expected: XPRV_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0] & 0b0000_0111 != 0 || bytes[31] & 0b1000_0000 != 0 {
            return Err(KeyError::NotNormalized);
        }
        let mut buf = Zeroizing::new([0u8; XPRV_SIZE]);
        buf.copy_from_slice(bytes);
        Ok(Self { bytes: buf })
    }

    pub fn from_bech32(s: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(decode_bech32(XPRV_HRP, s)?);
        Self::from_bytes(&bytes)
    }

    fn kl(&self) -> &[u8] {
        &self.bytes[..32]
    }

    fn kr(&self) -> &[u8] {
        &self.bytes[32..64]
    }

    pub fn chain_code(&self) -> &[u8] {
        &self.bytes[64..]
    }

    pub fn as_bytes(&self) -> &[u8; XPRV_SIZE] {
        &self.bytes
    }

    /// Derive a child key. Indices with the top bit set are hardened.
    pub fn derive(&self, index: u32) -> Self {
        let mut z_mac =
            HmacSha512::new_from_slice(self.chain_code()).expect("HMAC can take key of any size");
        let mut cc_mac =
            HmacSha512::new_from_slice(self.chain_code()).expect("HMAC can take key of any size");

        if is_hardened(index) {
            z_mac.update(&[0x00]);
            z_mac.update(self.kl());
            z_mac.update(self.kr());
            cc_mac.update(&[0x01]);
            cc_mac.update(self.kl());
            cc_mac.update(self.kr());
        } else {
            let public_key = public_point(self.kl());
            z_mac.update(&[0x02]);
            z_mac.update(&public_key);
            cc_mac.update(&[0x03]);
            cc_mac.update(&public_key);
        }
        let serialized = index.to_le_bytes();
        z_mac.update(&serialized);
        cc_mac.update(&serialized);

        let z = z_mac.finalize().into_bytes();
        let cc = cc_mac.finalize().into_bytes();

        let mut bytes = Zeroizing::new([0u8; XPRV_SIZE]);
        bytes[..32].copy_from_slice(&add_28_mul8(self.kl(), &z[..28]));
        bytes[32..64].copy_from_slice(&add_256bits(self.kr(), &z[32..]));
        bytes[64..].copy_from_slice(&cc[32..]);
        Self { bytes }
    }

    /// Derive along a sequence of indices.
    pub fn derive_path(&self, path: &[u32]) -> Self {
        path.iter()
            .fold(self.clone(), |key, &index| key.derive(index))
    }

    pub fn public(&self) -> ExtendedPublicKey {
        let mut bytes = [0u8; XPUB_SIZE];
        bytes[..32].copy_from_slice(&public_point(self.kl()));
        bytes[32..].copy_from_slice(self.chain_code());
        ExtendedPublicKey { bytes }
    }

    /// Raw 32-byte Ed25519 public key.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        public_point(self.kl())
    }

    pub fn to_bech32(&self) -> Result<Zeroizing<String>, KeyError> {
        encode_bech32(XPRV_HRP, &self.bytes[..]).map(Zeroizing::new)
    }
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ExtendedPrivateKey(redacted)")
    }
}

/// BIP32-Ed25519 extended public key.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    bytes: [u8; XPUB_SIZE],
}

impl ExtendedPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != XPUB_SIZE {
            return Err(KeyError::InvalidLength {
                expected: XPUB_SIZE,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; XPUB_SIZE];
        buf.copy_from_slice(bytes);
        Ok(Self { bytes: buf })
    }

    pub fn from_bech32(s: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&decode_bech32(XPUB_HRP, s)?)
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let mut pk = [0u8; PUBLIC_KEY_SIZE];
        pk.copy_from_slice(&self.bytes[..32]);
        pk
    }

    pub fn chain_code(&self) -> &[u8] {
        &self.bytes[32..]
    }

    pub fn as_bytes(&self) -> &[u8; XPUB_SIZE] {
        &self.bytes
    }

    pub fn hash(&self) -> KeyHash {
        KeyHash::of_public_key(&self.public_key())
    }

    pub fn to_bech32(&self) -> Result<String, KeyError> {
        encode_bech32(XPUB_HRP, &self.bytes)
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ExtendedPublicKey({})", hex::encode(&self.bytes[..32]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bip39::{Language, Mnemonic};

    const CIP19_MNEMONIC: &str =
        "test walk nut penalty hip pave soap entry language right filter choice";

    fn cip19_root() -> ExtendedPrivateKey {
        let mnemonic = Mnemonic::parse_in(Language::English, CIP19_MNEMONIC).unwrap();
        ExtendedPrivateKey::from_bip39_entropy(&mnemonic.to_entropy())
    }

    #[test]
    fn test_master_key_is_clamped() {
        let root = ExtendedPrivateKey::from_bip39_entropy(&[0u8; 32]);
        let bytes = root.as_bytes();
        assert_eq!(bytes[0] & 0b0000_0111, 0);
        assert_eq!(bytes[31] & 0b1110_0000, 0b0100_0000);
    }

    #[test]
    fn test_cip19_payment_key_vector() {
        let payment = cip19_root().derive_path(&[harden(1852), harden(1815), harden(0), 0, 0]);

        assert_eq!(
            hex::encode(payment.public_key_bytes()),
            "73fea80d424276ad0978d4fe5310e8bc2d485f5f6bb3bf87612989f112ad5a7d"
        );
        assert_eq!(
            payment.public().hash().to_hex(),
            "9493315cd92eb5d8c4304e67b7e16ae36d61d34502694657811a2c8e"
        );
    }

    #[test]
    fn test_account_xpub_vector() {
        let root = ExtendedPrivateKey::from_bip39_entropy(&[0u8; 32]);
        let account = root.derive_path(&[harden(1852), harden(1815), harden(0)]);
        assert_eq!(
            account.public().to_bech32().unwrap(),
            "xpub1k0u2446ser6f355g950v6a9l258grpcw3xk2akpw3cgw7kr33pcfz2rdvq0vlc92lssjz92dk7rm7jyueu6uddwmt4sqjczjeze5ctcd0zfxc"
        );
    }

    #[test]
    fn test_derivation_deterministic() {
        let a = cip19_root().derive(harden(1852)).derive(7);
        let b = cip19_root().derive(harden(1852)).derive(7);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_hardened_and_soft_children_differ() {
        let root = cip19_root();
        let soft = root.derive(5);
        let hard = root.derive(harden(5));
        assert_ne!(soft.public(), hard.public());
    }

    #[test]
    fn test_public_matches_public_key_bytes() {
        let key = cip19_root().derive(harden(1));
        assert_eq!(key.public().public_key(), key.public_key_bytes());
        assert_eq!(key.public().chain_code(), key.chain_code());
    }

    #[test]
    fn test_xprv_bech32_round_trip() {
        let key = cip19_root().derive(harden(44));
        let encoded = key.to_bech32().unwrap();
        assert!(encoded.starts_with("xprv1"));

        let decoded = ExtendedPrivateKey::from_bech32(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_xpub_bech32_rejects_xprv() {
        let key = cip19_root();
        let encoded = key.to_bech32().unwrap();
        assert!(matches!(
            ExtendedPublicKey::from_bech32(&encoded),
            Err(KeyError::WrongPrefix { expected: "xpub", .. })
        ));
    }

    #[test]
    fn test_from_bytes_rejects_unnormalised_key() {
        let mut bytes = [0u8; XPRV_SIZE];
        bytes[0] = 0b0000_0001;
        assert!(matches!(
            ExtendedPrivateKey::from_bytes(&bytes),
            Err(KeyError::NotNormalized)
        ));
        assert!(matches!(
            ExtendedPrivateKey::from_bytes(&bytes[..10]),
            Err(KeyError::InvalidLength { expected: 96, actual: 10 })
        ));
    }

    #[test]
    fn test_key_hash_hex_round_trip() {
        let hash = cip19_root().public().hash();
        assert_eq!(KeyHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(KeyHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = cip19_root();
        assert_eq!(format!("{:?}", key), "ExtendedPrivateKey(redacted)");
    }

    #[test]
    fn test_scalar_helpers() {
        let mut x = [0u8; 32];
        x[0] = 0xff;
        let mut y = [0u8; 28];
        y[0] = 0x01;
        let r = add_28_mul8(&x, &y);
        assert_eq!(r[0], 0x07);
        assert_eq!(r[1], 0x01);

        let ones = [0xffu8; 32];
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(add_256bits(&ones, &one), [0u8; 32]);
    }
}
