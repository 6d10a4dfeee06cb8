//! Inbound events delivered by the SDK's reactive callback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Content, ContentType};
use crate::{Address, ContentId, KeyPackage, Welcome};

/// Every event the transport can deliver. Matching on it is exhaustive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The messaging socket connected.
    Connect,
    /// The messaging socket disconnected, with an error if it was not clean.
    Disconnect { error: Option<String> },
    /// A counterparty created an encrypted group and invites us into it.
    Welcome(WelcomeEvent),
    /// A counterparty sent key material to establish a connection with.
    KeyPackage(KeyPackageEvent),
    /// A content value arrived on an established connection.
    Message(MessageEvent),
}

impl InboundEvent {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Welcome(_) => "welcome",
            Self::KeyPackage(_) => "key_package",
            Self::Message(msg) => msg.content.content_type().as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeEvent {
    pub from: Address,
    pub to: Address,
    pub welcome: Welcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPackageEvent {
    pub from: Address,
    pub to: Address,
    pub key_package: KeyPackage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub from: Address,
    pub to: Address,
    pub content: Content,
    pub received: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(from: Address, to: Address, content: Content) -> Self {
        Self {
            from,
            to,
            content,
            received: Utc::now(),
        }
    }

    /// Id of the carried content.
    pub fn id(&self) -> &ContentId {
        self.content.id()
    }

    pub fn content_type(&self) -> ContentType {
        self.content.content_type()
    }
}
