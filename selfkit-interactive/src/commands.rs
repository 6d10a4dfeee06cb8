//! Chat command server.
//!
//! Inbound chat texts are parsed into a [`ChatCommand`]; each recognised
//! command starts a correlated round against the sender in its own task, so
//! the dispatcher is never blocked on a response. Anything else is logged and
//! ignored.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use selfkit_lib::credential::predicate::Predicate;
use selfkit_lib::event::MessageEvent;
use selfkit_lib::message::Chat;
use selfkit_lib::Address;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use crate::exchange::{AgreementTerms, CredentialExchangeOrchestrator, ExchangeOutcome};
use crate::InteractiveError;

/// Name placed in customer credentials issued on request.
pub const DEFAULT_CUSTOMER_NAME: &str = "Test Name";

/// Commands a counterparty can send as chat text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    RequestCredentialAuth,
    ProvideCredentialEmail,
    ProvideCredentialDocument,
    ProvideCredentialCustom,
    RequestGetCustomCredential,
    RequestDocumentSigning,
}

impl ChatCommand {
    pub const ALL: [ChatCommand; 6] = [
        Self::RequestCredentialAuth,
        Self::ProvideCredentialEmail,
        Self::ProvideCredentialDocument,
        Self::ProvideCredentialCustom,
        Self::RequestGetCustomCredential,
        Self::RequestDocumentSigning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCredentialAuth => "REQUEST_CREDENTIAL_AUTH",
            Self::ProvideCredentialEmail => "PROVIDE_CREDENTIAL_EMAIL",
            Self::ProvideCredentialDocument => "PROVIDE_CREDENTIAL_DOCUMENT",
            Self::ProvideCredentialCustom => "PROVIDE_CREDENTIAL_CUSTOM",
            Self::RequestGetCustomCredential => "REQUEST_GET_CUSTOM_CREDENTIAL",
            Self::RequestDocumentSigning => "REQUEST_DOCUMENT_SIGNING",
        }
    }

    /// Predicate tree for commands that ask for a presentation.
    pub fn predicate(&self) -> Option<Predicate> {
        match self {
            Self::RequestCredentialAuth => Some(Predicate::liveness()),
            Self::ProvideCredentialEmail => Some(Predicate::email()),
            Self::ProvideCredentialDocument => Some(Predicate::passport()),
            Self::ProvideCredentialCustom => Some(Predicate::customer()),
            Self::RequestGetCustomCredential | Self::RequestDocumentSigning => None,
        }
    }
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown command '{}'", s))
    }
}

/// Starts a round for every recognised chat command.
#[derive(Clone)]
pub struct CommandRouter {
    orchestrator: Arc<CredentialExchangeOrchestrator>,
    terms: Arc<dyn AgreementTerms>,
}

impl CommandRouter {
    pub fn new(
        orchestrator: Arc<CredentialExchangeOrchestrator>,
        terms: Arc<dyn AgreementTerms>,
    ) -> Self {
        Self {
            orchestrator,
            terms,
        }
    }

    /// Parse `chat` and spawn the matching round against the sender.
    ///
    /// Returns the spawned task, or `None` if the text is not a command.
    pub fn route(&self, msg: &MessageEvent, chat: &Chat) -> Option<JoinHandle<()>> {
        let command = match chat.message().parse::<ChatCommand>() {
            Ok(command) => command,
            Err(reason) => {
                warn!(from = %msg.from, %reason, "ignoring chat message");
                return None;
            }
        };

        info!(from = %msg.from, %command, "received command");
        let router = self.clone();
        let counterparty = msg.from;
        let span = tracing::info_span!("command", %command, %counterparty);

        Some(tokio::spawn(
            async move {
                match router.run(command, counterparty).await {
                    Ok(Some(outcome)) => log_outcome(command, &outcome),
                    Ok(None) => {}
                    Err(error) => warn!(%error, "command round failed"),
                }
            }
            .instrument(span),
        ))
    }

    /// Run the round for `command` to completion.
    pub async fn run(
        &self,
        command: ChatCommand,
        counterparty: Address,
    ) -> Result<Option<ExchangeOutcome>, InteractiveError> {
        if let Some(predicate) = command.predicate() {
            return self
                .orchestrator
                .request_presentations(counterparty, vec![predicate])
                .await
                .map(Some);
        }

        match command {
            ChatCommand::RequestGetCustomCredential => {
                self.orchestrator
                    .issue_custom_credential(counterparty, DEFAULT_CUSTOMER_NAME)
                    .await?;
                Ok(None)
            }
            ChatCommand::RequestDocumentSigning => {
                let terms = self.terms.document(self.orchestrator.inbox(), &counterparty);
                self.orchestrator
                    .run_agreement(counterparty, terms)
                    .await
                    .map(Some)
            }
            // Presentation commands returned above.
            _ => Ok(None),
        }
    }
}

fn log_outcome(command: ChatCommand, outcome: &ExchangeOutcome) {
    if !outcome.is_accepted() {
        warn!(
            %command,
            status = %outcome.response_status,
            rejections = outcome.rejections.len(),
            "round completed without an accepted credential"
        );
        return;
    }

    for (credential_type, claims) in outcome.verified_claims() {
        for (field, value) in claims {
            info!(?credential_type, field, %value, "credential value");
        }
    }
}
