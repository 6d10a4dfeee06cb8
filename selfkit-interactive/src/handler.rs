//! The default [`EventHandler`] used by every demo session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use selfkit_lib::event::{KeyPackageEvent, MessageEvent, WelcomeEvent};
use selfkit_lib::message::{
    Chat, CredentialMessage, CredentialPresentationRequest, CredentialVerificationRequest,
    DiscoveryRequest, Introduction,
};
use selfkit_lib::Account;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::CommandRouter;
use crate::dispatcher::EventHandler;
use crate::lifecycle::ConnectionLifecycle;
use crate::responder::Responder;

/// Composes connection handling, the responder and the command router.
///
/// Requests are only answered when a [`Responder`] is attached, and chat
/// commands only run when a [`CommandRouter`] is attached. Without them those
/// events are logged and dropped.
///
/// Command rounds run on their own tasks. The handler keeps their handles so
/// that [`abort_rounds`](Self::abort_rounds) can stop whatever is still
/// running when the session closes.
pub struct SessionHandler {
    account: Arc<dyn Account>,
    lifecycle: Arc<ConnectionLifecycle>,
    responder: Option<Responder>,
    commands: Option<CommandRouter>,
    rounds: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionHandler {
    pub fn new(account: Arc<dyn Account>, lifecycle: Arc<ConnectionLifecycle>) -> Self {
        Self {
            account,
            lifecycle,
            responder: None,
            commands: None,
            rounds: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn with_commands(mut self, commands: CommandRouter) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn lifecycle(&self) -> &Arc<ConnectionLifecycle> {
        &self.lifecycle
    }

    /// Command rounds that have not finished yet.
    pub fn active_rounds(&self) -> usize {
        let mut rounds = self.rounds();
        rounds.retain(|round| !round.is_finished());
        rounds.len()
    }

    /// Abort every unfinished command round. Returns how many were stopped.
    pub fn abort_rounds(&self) -> usize {
        let mut aborted = 0;
        for round in self.rounds().drain(..) {
            if !round.is_finished() {
                round.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            debug!(aborted, "abandoned unfinished command rounds");
        }
        aborted
    }

    fn rounds(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        // A panicking round cannot leave the list half-updated.
        self.rounds.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventHandler for SessionHandler {
    async fn on_welcome(&self, event: &WelcomeEvent) {
        self.lifecycle.on_welcome(event).await;
    }

    async fn on_key_package(&self, event: &KeyPackageEvent) {
        self.lifecycle.on_key_package(event).await;
    }

    async fn on_discovery_request(&self, msg: &MessageEvent, request: DiscoveryRequest) {
        let Some(responder) = &self.responder else {
            debug!(from = %msg.from, "no responder attached, ignoring discovery request");
            return;
        };
        if let Err(error) = responder.on_discovery_request(msg, &request).await {
            warn!(from = %msg.from, %error, "failed to answer discovery request");
        }
    }

    async fn on_presentation_request(
        &self,
        msg: &MessageEvent,
        request: CredentialPresentationRequest,
    ) {
        let Some(responder) = &self.responder else {
            debug!(from = %msg.from, "no responder attached, ignoring presentation request");
            return;
        };
        if let Err(error) = responder.on_presentation_request(msg, &request).await {
            warn!(from = %msg.from, %error, "failed to answer presentation request");
        }
    }

    async fn on_verification_request(
        &self,
        msg: &MessageEvent,
        request: CredentialVerificationRequest,
    ) {
        let Some(responder) = &self.responder else {
            debug!(from = %msg.from, "no responder attached, ignoring verification request");
            return;
        };
        if let Err(error) = responder.on_verification_request(msg, &request).await {
            warn!(from = %msg.from, %error, "failed to answer verification request");
        }
    }

    async fn on_chat(&self, msg: &MessageEvent, chat: Chat) {
        info!(from = %msg.from, message = chat.message(), "received chat message");
        let Some(commands) = &self.commands else {
            return;
        };
        if let Some(round) = commands.route(msg, &chat) {
            let mut rounds = self.rounds();
            rounds.retain(|round| !round.is_finished());
            rounds.push(round);
        }
    }

    async fn on_introduction(&self, msg: &MessageEvent, introduction: Introduction) {
        info!(from = %msg.from, tokens = introduction.tokens().len(), "received introduction");
        for token in introduction.tokens() {
            if let Err(error) = self.account.token_store(token).await {
                warn!(from = %msg.from, %error, "failed to store token");
                return;
            }
        }
    }

    async fn on_credential(&self, msg: &MessageEvent, credential: CredentialMessage) {
        let credential = credential.into_credential();
        if let Err(error) = self.account.credential_validate(&credential) {
            warn!(from = %msg.from, %error, "received credential failed validation");
            return;
        }
        if !credential.subject().matches(&msg.to) {
            warn!(from = %msg.from, subject = %credential.subject(), "received credential for another subject");
            return;
        }
        match self.account.credential_store(&credential).await {
            Ok(()) => info!(
                from = %msg.from,
                credential_type = ?credential.credential_type(),
                "stored received credential"
            ),
            Err(error) => warn!(from = %msg.from, %error, "failed to store credential"),
        }
    }
}
