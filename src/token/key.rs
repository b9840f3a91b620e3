//! Binary bearer token codec.
//!
//! A key is a fixed 40-byte secret: an 8-byte public identifier followed by
//! a 32-byte private payload. The text form is the whole value encoded as
//! unpadded base-32; only the SHA3-384 digest of the private payload is
//! ever persisted, so a leaked credential store cannot be used to forge
//! tokens.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_384};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{KeyGenError, TokenParseError};

/// Size of the public identifier prefix in bytes.
pub const KEY_ID_SIZE: usize = 8;

/// Size of the private payload in bytes.
pub const KEY_PAYLOAD_SIZE: usize = 32;

/// Total key size in bytes.
pub const KEY_SIZE: usize = KEY_ID_SIZE + KEY_PAYLOAD_SIZE;

/// Size of the SHA3-384 payload digest in bytes.
pub const DIGEST_SIZE: usize = 48;

/// Number of key-id characters safe to show as a display hint.
pub const HINT_LEN: usize = (KEY_ID_SIZE * 6 / 4) - 1;

/// A full bearer key: public identifier plus private payload.
///
/// The private payload is wiped from memory on drop. `Debug` prints only
/// the public identifier.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Generate a new random key from the operating system CSPRNG.
    ///
    /// # Errors
    ///
    /// Fails only if the randomness source is unavailable, which is fatal
    /// to the calling operation and not retried.
    pub fn generate() -> Result<Self, KeyGenError> {
        let mut data = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut data)
            .map_err(|e| KeyGenError(e.to_string()))?;
        Ok(Self(data))
    }

    /// The non-secret public identifier prefix.
    #[must_use]
    pub fn id(&self) -> KeyId {
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&self.0[..KEY_ID_SIZE]);
        KeyId(id)
    }

    /// The private payload. Never persist or log this.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.0[KEY_ID_SIZE..]
    }

    /// SHA3-384 digest of the private payload only.
    #[must_use]
    pub fn hash(&self) -> Vec<u8> {
        Sha3_384::digest(self.payload()).to_vec()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE32_NOPAD.encode(&self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}..)", self.id())
    }
}

impl FromStr for Key {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = BASE32_NOPAD
            .decode(s.to_ascii_uppercase().as_bytes())
            .map_err(|e| TokenParseError::Encoding(e.to_string()))?;
        if data.len() != KEY_SIZE {
            return Err(TokenParseError::Size);
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&data);
        Ok(Self(key))
    }
}

/// Public identifier of a key: safe to index, log, and display.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId([u8; KEY_ID_SIZE]);

impl KeyId {
    /// Raw identifier bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE32_NOPAD.encode(&self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({self})")
    }
}

impl FromStr for KeyId {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = BASE32_NOPAD
            .decode(s.to_ascii_uppercase().as_bytes())
            .map_err(|e| TokenParseError::Encoding(e.to_string()))?;
        if data.len() != KEY_ID_SIZE {
            return Err(TokenParseError::Size);
        }
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&data);
        Ok(Self(id))
    }
}

impl Serialize for KeyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = Key::generate().unwrap();
        let parsed: Key = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let key = Key::generate().unwrap();
        let lower = key.to_string().to_ascii_lowercase();
        let parsed: Key = lower.parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_id_is_prefix_projection() {
        let key = Key::generate().unwrap();
        let id = key.id();
        assert!(key.to_string().starts_with(&id.to_string()[..HINT_LEN]));
        // Stable across calls.
        assert_eq!(key.id(), id);
    }

    #[test]
    fn test_id_round_trip() {
        let id = Key::generate().unwrap().id();
        let parsed: KeyId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_ids_do_not_collide_in_small_batch() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..256 {
            assert!(seen.insert(Key::generate().unwrap().id()));
        }
    }

    #[test]
    fn test_hash_is_fixed_size_and_not_payload() {
        let key = Key::generate().unwrap();
        let hash = key.hash();
        assert_eq!(hash.len(), DIGEST_SIZE);
        assert_ne!(hash.as_slice(), key.payload());
    }

    #[test]
    fn test_parse_rejects_wrong_size() {
        let short = BASE32_NOPAD.encode(&[0u8; 16]);
        assert_eq!(short.parse::<Key>(), Err(TokenParseError::Size));
    }

    #[test]
    fn test_parse_rejects_bad_encoding() {
        assert!(matches!(
            "!!!not-base32!!!".parse::<Key>(),
            Err(TokenParseError::Encoding(_))
        ));
    }

    #[test]
    fn test_debug_redacts_payload() {
        let key = Key::generate().unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains(&key.to_string()));
        assert!(debug.contains(&key.id().to_string()));
    }

    #[test]
    fn test_key_id_serde_as_text() {
        let id = Key::generate().unwrap().id();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: KeyId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
