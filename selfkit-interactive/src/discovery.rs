//! Out-of-band discovery handshake.
//!
//! A round moves through three phases:
//!
//! ```text
//! Idle --begin()--> RequestSent --await_responder()--> Resolved --reset()--> Idle
//! ```
//!
//! `begin` negotiates a key package, wraps it in a discovery request, registers
//! the request id and returns a transferable code for a human to relay (for
//! example as a QR code). Nothing is sent over the network. `await_responder`
//! suspends until the dispatcher resolves that id and yields the responder's
//! address.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use selfkit_lib::message::{AnonymousMessage, ContentType, DiscoveryRequest, ResponsePayload};
use selfkit_lib::{Account, Address, ContentId};
use tracing::{info, instrument, warn};

use crate::dispatcher::ResponseEvent;
use crate::registry::{PendingRequestRegistry, PendingResponse};
use crate::{InteractiveError, Result};

/// Observable phase of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Idle,
    RequestSent,
    Resolved,
}

/// What a caller needs to relay a discovery request out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTicket {
    pub request_id: ContentId,
    /// Anonymous message encoding, ready to render as a QR code.
    pub code: String,
    pub expires: DateTime<Utc>,
}

enum State {
    Idle,
    RequestSent {
        pending: PendingResponse<ResponseEvent>,
        expires: DateTime<Utc>,
    },
    Resolved {
        responder: Address,
    },
}

/// One discovery state machine bound to one local inbox.
pub struct DiscoveryHandshake {
    account: Arc<dyn Account>,
    registry: PendingRequestRegistry<ResponseEvent>,
    inbox: Address,
    expiry: chrono::Duration,
    state: State,
}

impl DiscoveryHandshake {
    pub fn new(
        account: Arc<dyn Account>,
        registry: PendingRequestRegistry<ResponseEvent>,
        inbox: Address,
        expiry: chrono::Duration,
    ) -> Self {
        Self {
            account,
            registry,
            inbox,
            expiry,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        match self.state {
            State::Idle => HandshakePhase::Idle,
            State::RequestSent { .. } => HandshakePhase::RequestSent,
            State::Resolved { .. } => HandshakePhase::Resolved,
        }
    }

    /// Responder address once the round has resolved.
    pub fn responder(&self) -> Option<&Address> {
        match &self.state {
            State::Resolved { responder } => Some(responder),
            _ => None,
        }
    }

    /// Build and register a discovery request. Idle -> RequestSent.
    #[instrument(skip(self), fields(inbox = %self.inbox))]
    pub async fn begin(&mut self) -> Result<DiscoveryTicket> {
        if !matches!(self.state, State::Idle) {
            return Err(InteractiveError::Protocol(
                "discovery round already in progress".into(),
            ));
        }

        let expires = Utc::now() + self.expiry;
        let key_package = self
            .account
            .connection_negotiate_out_of_band(&self.inbox, expires)
            .await?;

        let content = DiscoveryRequest::builder(key_package)
            .expires(expires)
            .finish()?;
        let pending = self.registry.track(
            content.id().clone(),
            ContentType::DiscoveryResponse,
            Some(expires),
        )?;
        let code = AnonymousMessage::new(content.clone()).encode()?;

        info!(request_id = %content.id(), "waiting for response to discovery request");
        self.state = State::RequestSent { pending, expires };

        Ok(DiscoveryTicket {
            request_id: content.id().clone(),
            code,
            expires,
        })
    }

    /// Suspend until the responder answers. RequestSent -> Resolved.
    ///
    /// `timeout` of `None` waits until the response arrives. On any error the
    /// handshake returns to Idle and the pending entry is gone.
    pub async fn await_responder(&mut self, timeout: Option<Duration>) -> Result<Address> {
        let pending = match std::mem::replace(&mut self.state, State::Idle) {
            State::RequestSent { pending, expires } => {
                if Utc::now() >= expires {
                    warn!(request_id = %pending.id(), "waiting on a discovery request past its advisory expiry");
                }
                pending
            }
            other => {
                self.state = other;
                return Err(InteractiveError::Protocol(
                    "no discovery request outstanding".into(),
                ));
            }
        };

        let (from, response) = match pending.wait(timeout).await? {
            ResponseEvent::Discovery { from, response } => (from, response),
            other => {
                return Err(InteractiveError::UnexpectedResponse {
                    expected: "discovery",
                    actual: other.kind(),
                })
            }
        };

        if !response.status().is_accepted() {
            return Err(InteractiveError::Protocol(format!(
                "discovery request answered with status {}",
                response.status()
            )));
        }

        info!(responder = %from, "discovery round resolved");
        self.state = State::Resolved { responder: from };
        Ok(from)
    }

    /// Start over for the next round. Abandons any outstanding request.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}

