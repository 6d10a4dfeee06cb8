//! The external SDK boundary.
//!
//! [`Account`] is the single seam through which the demos reach the
//! identity/messaging SDK: inboxes, connections, messaging, credential
//! signing and validation, object upload and token storage. Everything on the
//! far side of this trait (key exchange, encryption, wire format) is treated as
//! a black box.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::{
    UnsignedCredential, UnsignedPresentation, VerifiableCredential, VerifiablePresentation,
};
use crate::message::{Content, ContentSummary};
use crate::{Address, Object, Result};

/// Key material a counterparty can use to open an encrypted group with `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPackage {
    owner: Address,
    expires: DateTime<Utc>,
    #[serde(with = "hex::serde")]
    bytes: Vec<u8>,
}

impl KeyPackage {
    pub fn new(owner: Address, expires: DateTime<Utc>, bytes: Vec<u8>) -> Self {
        Self {
            owner,
            expires,
            bytes,
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// Invitation into an encrypted group created by a counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Address of the group the invitation is for.
    pub group: Address,
    #[serde(with = "hex::serde")]
    pub bytes: Vec<u8>,
}

/// Opaque token granting the holder the ability to reach its issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub issuer: Address,
    #[serde(with = "hex::serde")]
    pub bytes: Vec<u8>,
}

/// Operations the demos consume from the identity/messaging SDK.
///
/// Inbound events are not part of this trait; the SDK delivers them through a
/// single reactive callback which the session bootstrap feeds into the
/// dispatcher.
#[async_trait]
pub trait Account: Send + Sync {
    /// Open a new inbox and return its address.
    async fn inbox_open(&self) -> Result<Address>;

    /// List the addresses of every open inbox.
    async fn inbox_list(&self) -> Result<Vec<Address>>;

    /// Produce a key package for out-of-band distribution (e.g. a QR code).
    async fn connection_negotiate_out_of_band(
        &self,
        as_address: &Address,
        expires: DateTime<Utc>,
    ) -> Result<KeyPackage>;

    /// Send a key package directly to `with_address`.
    async fn connection_negotiate(
        &self,
        as_address: &Address,
        with_address: &Address,
        expires: DateTime<Utc>,
    ) -> Result<()>;

    /// Create an encrypted group with the owner of `key_package`.
    ///
    /// Returns the group address. The owner receives a welcome event.
    async fn connection_establish(
        &self,
        as_address: &Address,
        key_package: &KeyPackage,
    ) -> Result<Address>;

    /// Join the group a welcome invites us into. Returns the group address.
    async fn connection_accept(&self, as_address: &Address, welcome: &Welcome) -> Result<Address>;

    /// Send a content value to a connected counterparty.
    async fn message_send(&self, to_address: &Address, content: &Content) -> Result<()>;

    /// Push a notification describing content already sent to `to_address`.
    async fn notification_send(&self, to_address: &Address, summary: &ContentSummary)
        -> Result<()>;

    /// Sign a credential as its issuer.
    async fn credential_issue(&self, credential: &UnsignedCredential)
        -> Result<VerifiableCredential>;

    /// Sign a presentation as its holder.
    async fn presentation_issue(
        &self,
        presentation: &UnsignedPresentation,
    ) -> Result<VerifiablePresentation>;

    /// Check a credential's signature and that it was signed by its issuer.
    fn credential_validate(&self, credential: &VerifiableCredential) -> Result<()>;

    /// Check a presentation's signature and that it was signed by its holder.
    fn presentation_validate(&self, presentation: &VerifiablePresentation) -> Result<()>;

    /// Keep a credential for later presentation.
    async fn credential_store(&self, credential: &VerifiableCredential) -> Result<()>;

    /// Every stored credential whose subject is one of our inboxes.
    async fn credentials_list(&self) -> Result<Vec<VerifiableCredential>>;

    /// Upload an object so counterparties can fetch it by id.
    async fn object_upload(&self, as_address: &Address, object: &Object) -> Result<()>;

    /// Fetch a previously uploaded object.
    async fn object_download(&self, object_id: &str) -> Result<Object>;

    /// Keep a token received in an introduction.
    async fn token_store(&self, token: &Token) -> Result<()>;

    /// Close the session. Further calls fail with a session error.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_key_package_expiry() {
        let now = Utc::now();
        let package = KeyPackage::new(Address::from_bytes([1; 32]), now, vec![]);
        assert!(package.is_expired_at(now));
        assert!(!package.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_key_package_bytes_serialize_as_hex() {
        let package = KeyPackage::new(Address::from_bytes([1; 32]), Utc::now(), vec![0xde, 0xad]);
        let json = serde_json::to_value(&package).unwrap();
        assert_eq!(json["bytes"], "dead");
    }
}
