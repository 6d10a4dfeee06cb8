//! Selfkit library.
//!
//! Shared vocabulary for the selfkit demos: addresses, content kinds and their
//! typed payloads, credentials and presentations, content-addressed objects,
//! inbound events, and the [`Account`] trait through which every demo talks to
//! the external identity/messaging SDK.
//!
//! The crate is deliberately free of cryptography and transport. Signing,
//! validation, encryption and delivery all sit behind [`Account`], so the
//! correlation layer in `selfkit-interactive` can be driven by the real SDK or
//! by the in-process loopback used for demos and tests.
//!
//! # Example
//!
//! ```
//! use selfkit_lib::message::{DiscoveryRequest, ContentType};
//! use selfkit_lib::{Address, KeyPackage};
//! use chrono::{Duration, Utc};
//!
//! let owner = Address::from_bytes([7u8; 32]);
//! let package = KeyPackage::new(owner, Utc::now() + Duration::minutes(5), vec![1, 2, 3]);
//! let content = DiscoveryRequest::builder(package)
//!     .expires(Utc::now() + Duration::minutes(5))
//!     .finish()
//!     .unwrap();
//!
//! assert_eq!(content.content_type(), ContentType::DiscoveryRequest);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod account;
pub mod config;
pub mod credential;
pub mod errors;
pub mod event;
pub mod message;
pub mod object;
pub mod prelude;

pub use account::{Account, KeyPackage, Token, Welcome};
pub use config::{AccountConfig, LogLevel, Target};
pub use credential::{
    CredentialBuilder, PresentationBuilder, Proof, UnsignedCredential, UnsignedPresentation,
    VerifiableCredential, VerifiablePresentation,
};
pub use errors::{SelfkitError, SelfkitErrorCode};
pub use event::{InboundEvent, KeyPackageEvent, MessageEvent, WelcomeEvent};
pub use message::{Content, ContentType, ResponseStatus};
pub use object::Object;

/// Common result alias for selfkit operations.
pub type Result<T> = std::result::Result<T, SelfkitError>;

/// Length in bytes of an inbox address.
pub const ADDRESS_LEN: usize = 32;

/// Opaque identifier of a cryptographic endpoint (an inbox public key).
///
/// Addresses are plain values: compared by equality, never mutated. They
/// display and serialize as lowercase hex.
///
/// # Example
///
/// ```
/// use selfkit_lib::Address;
///
/// let address = Address::from_bytes([0xab; 32]);
/// let parsed: Address = address.to_string().parse().unwrap();
/// assert_eq!(parsed, address);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Wrap raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an address from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            SelfkitError::invalid_data(
                "address",
                format!("expected {} bytes, got {}", ADDRESS_LEN, bytes.len()),
            )
        })?;
        Ok(Self(array))
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this address refers to the same endpoint as `other`.
    pub fn matches(&self, other: &Address) -> bool {
        self == other
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = SelfkitError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s.trim()).map_err(|e| SelfkitError::invalid_data("address", e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of a content value, derived from its kind and encoded payload.
///
/// Responses carry the originating request's `ContentId` in their
/// `response_to` field, which makes it the correlation key for the
/// pending-request registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(Vec<u8>);

impl ContentId {
    /// Wrap raw identifier bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex form, as used in log lines.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = SelfkitError;

    fn from_str(s: &str) -> Result<Self> {
        hex::decode(s.trim())
            .map(Self)
            .map_err(|e| SelfkitError::invalid_data("content id", e.to_string()))
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let address = Address::from_bytes([0x5a; 32]);
        let text = address.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("abcd".parse::<Address>().is_err());
        assert!(Address::from_slice(&[1u8; 31]).is_err());
    }

    #[test]
    fn test_address_serializes_as_string() {
        let address = Address::from_bytes([1u8; 32]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert!(back.matches(&address));
    }

    #[test]
    fn test_content_id_from_str_literal_is_raw_bytes() {
        let id = ContentId::from("X");
        assert_eq!(id.as_bytes(), b"X");
        assert_eq!(id.to_hex(), "58");
    }
}
