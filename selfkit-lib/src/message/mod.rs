//! Content kinds and their typed payloads.
//!
//! A [`Content`] is an immutable, identifiable message body. Its identifier is
//! derived from the kind tag, a random nonce and the encoded payload, so two
//! otherwise identical requests still get distinct ids. Responses carry the
//! originating request's id in `response_to`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{ContentId, Result, SelfkitError};

mod chat;
mod credential;
mod discovery;

pub use chat::{Chat, Introduction};
pub use credential::{
    CredentialMessage, CredentialPresentationRequest, CredentialPresentationRequestBuilder,
    CredentialPresentationResponse, CredentialVerificationRequest,
    CredentialVerificationRequestBuilder, CredentialVerificationResponse, Evidence,
};
pub use discovery::{DiscoveryRequest, DiscoveryRequestBuilder, DiscoveryResponse};

/// Length of the random nonce mixed into every content id.
pub const NONCE_LEN: usize = 16;

/// Prefix of the out-of-band transferable encoding.
pub const ANONYMOUS_PREFIX: &str = "selfkit:";

/// The closed set of content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    DiscoveryRequest,
    DiscoveryResponse,
    CredentialPresentationRequest,
    CredentialPresentationResponse,
    CredentialVerificationRequest,
    CredentialVerificationResponse,
    Chat,
    Introduction,
    Credential,
}

impl ContentType {
    /// Stable tag used in content ids and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscoveryRequest => "discovery_request",
            Self::DiscoveryResponse => "discovery_response",
            Self::CredentialPresentationRequest => "credential_presentation_request",
            Self::CredentialPresentationResponse => "credential_presentation_response",
            Self::CredentialVerificationRequest => "credential_verification_request",
            Self::CredentialVerificationResponse => "credential_verification_response",
            Self::Chat => "chat",
            Self::Introduction => "introduction",
            Self::Credential => "credential",
        }
    }

    /// Whether this kind answers an earlier request via `response_to`.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryResponse
                | Self::CredentialPresentationResponse
                | Self::CredentialVerificationResponse
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status carried by every response kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Accepted,
    Created,
    Unauthorized,
    Forbidden,
    NotAcceptable,
    NotFound,
}

impl ResponseStatus {
    /// The responder agreed to the request.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::Created)
    }

    /// The responder refused the request.
    pub fn is_declined(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::Forbidden | Self::NotAcceptable
        )
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepted => "accepted",
            Self::Created => "created",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotAcceptable => "not_acceptable",
            Self::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// A typed payload bound to exactly one [`ContentType`].
pub trait ContentPayload: Serialize + DeserializeOwned {
    /// Kind this payload is encoded as.
    const CONTENT_TYPE: ContentType;

    /// Encode into an identifiable content value.
    fn into_content(self) -> Result<Content>
    where
        Self: Sized,
    {
        Content::encode(Self::CONTENT_TYPE, &self)
    }
}

/// A payload that answers an earlier request.
pub trait ResponsePayload: ContentPayload {
    /// Id of the request being answered.
    fn response_to(&self) -> &ContentId;

    /// Responder's verdict.
    fn status(&self) -> ResponseStatus;
}

/// An immutable, identifiable message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    id: ContentId,
    content_type: ContentType,
    #[serde(with = "hex::serde")]
    nonce: Vec<u8>,
    payload: serde_json::Value,
}

impl Content {
    /// Encode a payload of the given kind with a fresh nonce.
    pub fn encode<T: Serialize>(content_type: ContentType, payload: &T) -> Result<Self> {
        use rand::RngCore;

        let mut nonce = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let payload = serde_json::to_value(payload)?;
        let id = Self::derive_id(content_type, &nonce, &payload)?;

        Ok(Self {
            id,
            content_type,
            nonce,
            payload,
        })
    }

    fn derive_id(
        content_type: ContentType,
        nonce: &[u8],
        payload: &serde_json::Value,
    ) -> Result<ContentId> {
        let mut hasher = Sha256::new();
        hasher.update(content_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(nonce);
        hasher.update(serde_json::to_vec(payload)?);
        Ok(ContentId::new(hasher.finalize().to_vec()))
    }

    /// Content identifier.
    pub fn id(&self) -> &ContentId {
        &self.id
    }

    /// Declared kind.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Raw payload document.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Whether the id still matches the kind, nonce and payload.
    pub fn is_intact(&self) -> bool {
        Self::derive_id(self.content_type, &self.nonce, &self.payload)
            .map(|id| id == self.id)
            .unwrap_or(false)
    }

    /// Decode the typed payload, checking the declared kind first.
    pub fn decode<T: ContentPayload>(&self) -> Result<T> {
        if self.content_type != T::CONTENT_TYPE {
            return Err(SelfkitError::WrongContentType {
                expected: T::CONTENT_TYPE.to_string(),
                actual: self.content_type.to_string(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Short description suitable for a push notification.
    pub fn summary(&self) -> ContentSummary {
        let description = match self.content_type {
            ContentType::Chat => self
                .payload
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.chars().take(64).collect())
                .unwrap_or_else(|| "new message".to_string()),
            other => other.as_str().replace('_', " "),
        };

        ContentSummary {
            content_id: self.id.clone(),
            content_type: self.content_type,
            description,
        }
    }
}

/// Notification text describing a content value without its body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSummary {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub description: String,
}

/// A content value addressed to nobody, relayed out-of-band (e.g. as a QR code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousMessage {
    content: Content,
    created: DateTime<Utc>,
}

impl AnonymousMessage {
    pub fn new(content: Content) -> Self {
        Self {
            content,
            created: Utc::now(),
        }
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn into_content(self) -> Content {
        self.content
    }

    /// Encode into a human-transferable string.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{}{}", ANONYMOUS_PREFIX, hex::encode(json)))
    }

    /// Decode a string produced by [`AnonymousMessage::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let body = encoded
            .trim()
            .strip_prefix(ANONYMOUS_PREFIX)
            .ok_or_else(|| SelfkitError::invalid_data("anonymous message", "missing prefix"))?;
        let json = hex::decode(body)
            .map_err(|e| SelfkitError::invalid_data("anonymous message", e.to_string()))?;
        let message: Self = serde_json::from_slice(&json)?;
        if !message.content.is_intact() {
            return Err(SelfkitError::ValidationFailed(
                "anonymous message content id does not match its payload".into(),
            ));
        }
        Ok(message)
    }
}
