use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IDError {
    #[error("invalid hex encoding")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("invalid ID length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("invalid hex encoding")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("invalid signature length: expected 64 bytes, got {0}")]
    InvalidLength(usize),
}

/// a 32-byte event ID, the sha256 of the canonical event serialization
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ID(pub [u8; 32]);

impl ID {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, IDError> {
        if hex_str.len() != 64 {
            return Err(IDError::InvalidLength(hex_str.len() / 2));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for ID {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ID {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ID::from_hex(&s).map_err(Error::custom)
    }
}

impl fmt::Debug for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<id:{}>", self.to_hex())
    }
}

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<id={}>", self.to_hex())
    }
}

/// a 64-byte schnorr signature
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, SignatureError> {
        if hex_str.len() != 128 {
            return Err(SignatureError::InvalidLength(hex_str.len() / 2));
        }
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(Error::custom)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<sig:{}>", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<sig={}>", self.to_hex())
    }
}

/// event kind type
///
/// kinds are opaque to this crate except for the encrypted direct message
/// kind, whose content carries nip04 ciphertext by convention.
#[derive(
    Copy, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Kind(pub u16);

impl Kind {
    pub const SET_METADATA: Kind = Kind(0);
    pub const TEXT_NOTE: Kind = Kind(1);
    pub const RECOMMEND_RELAY: Kind = Kind(2);
    pub const CONTACTS: Kind = Kind(3);
    pub const ENCRYPTED_DIRECT_MESSAGE: Kind = Kind(4);
    pub const DELETION: Kind = Kind(5);
    pub const REACTION: Kind = Kind(7);
    pub const CHANNEL_CREATE: Kind = Kind(40);
    pub const CHANNEL_METADATA: Kind = Kind(41);
    pub const CHANNEL_MESSAGE: Kind = Kind(42);
    pub const CHANNEL_HIDE_MESSAGE: Kind = Kind(43);
    pub const CHANNEL_MUTE_USER: Kind = Kind(44);
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex_roundtrip() {
        let hex = "5c83da77af1dec6d7289834998ad7aafbd9e2191396d75ec3cc27f5a77226f36";
        let id = ID::from_hex(hex).unwrap();
        assert_eq!(id.to_hex(), hex);
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{}\"", hex));
    }

    #[test]
    fn test_id_rejects_bad_lengths() {
        assert!(ID::from_hex("abcd").is_err());
        assert!(ID::from_hex(&"f".repeat(65)).is_err());
        assert!(Signature::from_hex(&"0".repeat(64)).is_err());
    }

    #[test]
    fn test_kind_serializes_as_plain_integer() {
        assert_eq!(
            serde_json::to_string(&Kind::ENCRYPTED_DIRECT_MESSAGE).unwrap(),
            "4"
        );
        let kind: Kind = serde_json::from_str("42").unwrap();
        assert_eq!(kind, Kind::CHANNEL_MESSAGE);
    }
}
