//! Inbound event dispatch.
//!
//! [`EventDispatcher::dispatch`] is invoked once per inbound event. It matches
//! exhaustively on the event and content kind, decodes the typed payload, and
//! then either resolves a pending request (response kinds) or calls the
//! matching [`EventHandler`] method (everything else). Decode failures,
//! responses to unknown requests and responses of the wrong kind are logged
//! and dropped; none of them ever reaches a waiting caller.
//!
//! `dispatch` takes `&self` and touches no state besides the registry and the
//! counters, so it is correct whether the transport calls it from one task or
//! from many.

use std::sync::Arc;

use async_trait::async_trait;
use selfkit_lib::event::{InboundEvent, KeyPackageEvent, MessageEvent, WelcomeEvent};
use selfkit_lib::message::{
    Chat, ContentType, CredentialMessage, CredentialPresentationRequest,
    CredentialPresentationResponse, CredentialVerificationRequest,
    CredentialVerificationResponse, DiscoveryRequest, DiscoveryResponse, Introduction,
    ResponsePayload,
};
use selfkit_lib::{Address, ContentId};
use tracing::{debug, info, instrument, warn};

use crate::registry::{PendingRequestRegistry, Resolution};
use crate::stats::DispatchStats;

/// A decoded response, as delivered to the waiter that registered for it.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Discovery {
        from: Address,
        response: DiscoveryResponse,
    },
    Presentation {
        from: Address,
        response: CredentialPresentationResponse,
    },
    Verification {
        from: Address,
        response: CredentialVerificationResponse,
    },
}

impl ResponseEvent {
    /// Sender of the response.
    pub fn from(&self) -> &Address {
        match self {
            Self::Discovery { from, .. }
            | Self::Presentation { from, .. }
            | Self::Verification { from, .. } => from,
        }
    }

    /// Short name for errors and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discovery { .. } => "discovery",
            Self::Presentation { .. } => "presentation",
            Self::Verification { .. } => "verification",
        }
    }
}

/// Reactions to unsolicited events, one method per kind.
///
/// Implementations must not block for long: the dispatcher awaits each call
/// before the transport can deliver the next event on a serialized stream.
/// Long-running work should be spawned.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_connect(&self) {
        info!("messaging socket connected");
    }

    async fn on_disconnect(&self, error: Option<&str>) {
        match error {
            Some(error) => warn!(error, "messaging socket disconnected"),
            None => info!("messaging socket disconnected"),
        }
    }

    async fn on_welcome(&self, event: &WelcomeEvent);

    async fn on_key_package(&self, event: &KeyPackageEvent);

    async fn on_discovery_request(&self, msg: &MessageEvent, request: DiscoveryRequest);

    async fn on_presentation_request(
        &self,
        msg: &MessageEvent,
        request: CredentialPresentationRequest,
    );

    async fn on_verification_request(
        &self,
        msg: &MessageEvent,
        request: CredentialVerificationRequest,
    );

    async fn on_chat(&self, msg: &MessageEvent, chat: Chat);

    async fn on_introduction(&self, msg: &MessageEvent, introduction: Introduction);

    async fn on_credential(&self, msg: &MessageEvent, credential: CredentialMessage);
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A pending request was resolved.
    Resolved { response_to: ContentId },
    /// A response named a request nobody is waiting for. Dropped.
    UnknownRequest { response_to: ContentId },
    /// A response whose kind does not match what its request expects. Dropped,
    /// and the request stays pending.
    WrongKind {
        response_to: ContentId,
        expected: ContentType,
    },
    /// Passed to the handler.
    Handled,
    /// Payload failed to decode, or its id did not match it. Dropped.
    DecodeFailed,
}

/// Demultiplexes inbound events onto the registry and a handler.
pub struct EventDispatcher<H: ?Sized> {
    registry: PendingRequestRegistry<ResponseEvent>,
    handler: Arc<H>,
    stats: Arc<DispatchStats>,
}

impl<H: ?Sized> Clone for EventDispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            handler: Arc::clone(&self.handler),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<H: EventHandler + ?Sized> EventDispatcher<H> {
    pub fn new(registry: PendingRequestRegistry<ResponseEvent>, handler: Arc<H>) -> Self {
        Self::with_stats(registry, handler, Arc::new(DispatchStats::new()))
    }

    pub fn with_stats(
        registry: PendingRequestRegistry<ResponseEvent>,
        handler: Arc<H>,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            registry,
            handler,
            stats,
        }
    }

    pub fn registry(&self) -> &PendingRequestRegistry<ResponseEvent> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Route one inbound event.
    #[instrument(skip_all, fields(kind = event.kind()))]
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        self.stats.record_received();

        match event {
            InboundEvent::Connect => {
                self.handler.on_connect().await;
                self.handled()
            }
            InboundEvent::Disconnect { error } => {
                self.handler.on_disconnect(error.as_deref()).await;
                self.handled()
            }
            InboundEvent::Welcome(welcome) => {
                self.handler.on_welcome(&welcome).await;
                self.handled()
            }
            InboundEvent::KeyPackage(key_package) => {
                self.handler.on_key_package(&key_package).await;
                self.handled()
            }
            InboundEvent::Message(msg) => self.dispatch_message(msg).await,
        }
    }

    async fn dispatch_message(&self, msg: MessageEvent) -> DispatchOutcome {
        if !msg.content.is_intact() {
            warn!(from = %msg.from, request_id = %msg.id(), "content id does not match payload");
            self.stats.record_decode_failure();
            return DispatchOutcome::DecodeFailed;
        }

        match msg.content_type() {
            ContentType::DiscoveryResponse => {
                self.resolve::<DiscoveryResponse>(&msg, |from, response| {
                    ResponseEvent::Discovery { from, response }
                })
            }
            ContentType::CredentialPresentationResponse => {
                self.resolve::<CredentialPresentationResponse>(&msg, |from, response| {
                    ResponseEvent::Presentation { from, response }
                })
            }
            ContentType::CredentialVerificationResponse => {
                self.resolve::<CredentialVerificationResponse>(&msg, |from, response| {
                    ResponseEvent::Verification { from, response }
                })
            }
            ContentType::DiscoveryRequest => match self.decode(&msg) {
                Some(request) => {
                    info!(from = %msg.from, request_id = %msg.id(), "received discovery request");
                    self.handler.on_discovery_request(&msg, request).await;
                    self.handled()
                }
                None => DispatchOutcome::DecodeFailed,
            },
            ContentType::CredentialPresentationRequest => match self.decode(&msg) {
                Some(request) => {
                    info!(from = %msg.from, request_id = %msg.id(), "received credential presentation request");
                    self.handler.on_presentation_request(&msg, request).await;
                    self.handled()
                }
                None => DispatchOutcome::DecodeFailed,
            },
            ContentType::CredentialVerificationRequest => match self.decode(&msg) {
                Some(request) => {
                    info!(from = %msg.from, request_id = %msg.id(), "received credential verification request");
                    self.handler.on_verification_request(&msg, request).await;
                    self.handled()
                }
                None => DispatchOutcome::DecodeFailed,
            },
            ContentType::Chat => match self.decode(&msg) {
                Some(chat) => {
                    self.handler.on_chat(&msg, chat).await;
                    self.handled()
                }
                None => DispatchOutcome::DecodeFailed,
            },
            ContentType::Introduction => match self.decode(&msg) {
                Some(introduction) => {
                    self.handler.on_introduction(&msg, introduction).await;
                    self.handled()
                }
                None => DispatchOutcome::DecodeFailed,
            },
            ContentType::Credential => match self.decode(&msg) {
                Some(credential) => {
                    self.handler.on_credential(&msg, credential).await;
                    self.handled()
                }
                None => DispatchOutcome::DecodeFailed,
            },
        }
    }

    fn decode<P: selfkit_lib::message::ContentPayload>(&self, msg: &MessageEvent) -> Option<P> {
        match msg.content.decode::<P>() {
            Ok(payload) => Some(payload),
            Err(error) => {
                warn!(
                    from = %msg.from,
                    request_id = %msg.id(),
                    kind = %msg.content_type(),
                    %error,
                    "failed to decode message"
                );
                self.stats.record_decode_failure();
                None
            }
        }
    }

    fn resolve<R: ResponsePayload>(
        &self,
        msg: &MessageEvent,
        wrap: impl FnOnce(Address, R) -> ResponseEvent,
    ) -> DispatchOutcome {
        let Some(response) = self.decode::<R>(msg) else {
            return DispatchOutcome::DecodeFailed;
        };

        let response_to = response.response_to().clone();
        info!(
            from = %msg.from,
            request_id = %msg.id(),
            status = %response.status(),
            "received response to {}",
            msg.content_type()
        );

        let kind = msg.content_type();
        match self
            .registry
            .resolve_kind(&response_to, kind, wrap(msg.from, response))
        {
            Resolution::Delivered => {
                debug!(%response_to, "resolved pending request");
                self.stats.record_resolved();
                DispatchOutcome::Resolved { response_to }
            }
            Resolution::KindMismatch { expected } => {
                warn!(
                    request_id = %msg.id(),
                    %response_to,
                    %expected,
                    actual = %kind,
                    "response kind does not match pending request"
                );
                self.stats.record_decode_failure();
                DispatchOutcome::WrongKind {
                    response_to,
                    expected,
                }
            }
            Resolution::Unknown => {
                warn!(
                    request_id = %msg.id(),
                    %response_to,
                    "received response to unknown request"
                );
                self.stats.record_unknown_request();
                DispatchOutcome::UnknownRequest { response_to }
            }
        }
    }

    fn handled(&self) -> DispatchOutcome {
        self.stats.record_handled();
        DispatchOutcome::Handled
    }
}
