//! Selfkit Interactive Layer
//!
//! Correlates outbound requests with their eventual responses and drives the
//! multi-round flows built on top of that: discovery, connection lifecycle,
//! credential presentation and agreement exchange, plus the counterparty side
//! of each.
//!
//! The pieces fit together like this:
//!
//! - [`PendingRequestRegistry`] maps a request's [`ContentId`] to a one-shot
//!   slot. Every flow registers before sending and awaits the slot afterwards.
//! - [`EventDispatcher`] is the single entry point for inbound events. Response
//!   kinds resolve a registry slot; everything else goes to an [`EventHandler`].
//! - [`DiscoveryHandshake`] and [`CredentialExchangeOrchestrator`] issue
//!   requests and suspend on the registry.
//! - [`SessionHandler`] wires [`ConnectionLifecycle`], [`Responder`] and
//!   [`CommandRouter`] behind the handler interface.

use selfkit_lib::{ContentId, SelfkitError};

pub mod chat;
pub mod commands;
pub mod discovery;
pub mod dispatcher;
pub mod exchange;
pub mod handler;
pub mod lifecycle;
pub mod registry;
pub mod responder;
pub mod stats;

pub use commands::{ChatCommand, CommandRouter};
pub use discovery::{DiscoveryHandshake, DiscoveryTicket, HandshakePhase};
pub use dispatcher::{DispatchOutcome, EventDispatcher, EventHandler, ResponseEvent};
pub use exchange::{
    AgreementTerms, CredentialExchangeOrchestrator, ExchangeConfig, ExchangeOutcome,
    ExchangeSession, Rejection, RejectionReason, RoundTimeout, SessionStatus,
};
pub use handler::SessionHandler;
pub use lifecycle::ConnectionLifecycle;
pub use registry::{PendingInfo, PendingRequestRegistry, PendingResponse, Resolution};
pub use responder::Responder;
pub use stats::{DispatchStats, DispatchStatsSnapshot};

/// Result alias for interactive operations.
pub type Result<T> = std::result::Result<T, InteractiveError>;

/// Failures a flow reports to its caller.
///
/// Problems with a single inbound event (decode failures, responses to unknown
/// requests, credentials that fail validation) never show up here. They are
/// logged and dropped where they occur.
#[derive(thiserror::Error, Debug)]
pub enum InteractiveError {
    #[error("sdk error: {0}")]
    Sdk(#[from] SelfkitError),
    #[error("request {request_id} timed out after {waited_ms}ms")]
    Timeout { request_id: ContentId, waited_ms: u64 },
    #[error("request {0} is already pending")]
    DuplicateRequest(ContentId),
    #[error("response slot for request {0} was closed")]
    ChannelClosed(ContentId),
    #[error("expected {expected} response, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl InteractiveError {
    /// Whether the current round cannot continue.
    ///
    /// SDK failures during setup or while building outbound requests are
    /// fatal. A timeout or a closed slot ends one round only.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Sdk(err) => !err.is_content_error(),
            Self::DuplicateRequest(_) | Self::Serialization(_) => true,
            Self::Timeout { .. }
            | Self::ChannelClosed(_)
            | Self::UnexpectedResponse { .. }
            | Self::Protocol(_) => false,
        }
    }
}

impl From<serde_json::Error> for InteractiveError {
    fn from(e: serde_json::Error) -> Self {
        InteractiveError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let session = InteractiveError::from(SelfkitError::Session("closed".into()));
        assert!(session.is_fatal());

        let decode = InteractiveError::from(SelfkitError::Serialization("bad".into()));
        assert!(!decode.is_fatal());

        let timeout = InteractiveError::Timeout {
            request_id: ContentId::from("X"),
            waited_ms: 10,
        };
        assert!(!timeout.is_fatal());
        assert_eq!(timeout.to_string(), "request 58 timed out after 10ms");
    }
}
