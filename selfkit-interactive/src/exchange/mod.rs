//! Credential exchange orchestration.
//!
//! Once a counterparty address is known (usually from a discovery round), the
//! orchestrator runs one of three rounds against it:
//!
//! - **presentation**: ask for credentials matching predicate trees, await the
//!   response, run it through the trust gate;
//! - **agreement**: upload a terms document, issue and present our own
//!   agreement credential, ask the counterparty to countersign, await, gate,
//!   and store what passes;
//! - **custom credential**: issue a credential to the counterparty and send it
//!   unsolicited (no response expected).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use selfkit_lib::credential::predicate::Predicate;
use selfkit_lib::credential::{
    CredentialBuilder, PresentationBuilder, VerifiableCredential, VerifiablePresentation,
    CREDENTIAL_TYPE_AGREEMENT, CREDENTIAL_TYPE_CUSTOMER, CREDENTIAL_TYPE_VERIFIABLE,
    PRESENTATION_TYPE_AGREEMENT, PRESENTATION_TYPE_CUSTOM,
};
use selfkit_lib::message::{
    ContentPayload, ContentType, CredentialMessage, CredentialPresentationRequest,
    CredentialVerificationRequest, ResponsePayload, ResponseStatus,
};
use selfkit_lib::{Account, Address, Object};
use tracing::{info, instrument, warn};

use crate::dispatcher::ResponseEvent;
use crate::registry::PendingRequestRegistry;
use crate::{InteractiveError, Result};

mod session;
pub mod validation;

pub use session::{ExchangeOutcome, ExchangeSession, SessionStatus};
pub use validation::{ClaimRequirement, Rejection, RejectionReason, Validated};

/// How long an awaited round may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundTimeout {
    /// Until the advisory expiry sent to the peer.
    #[default]
    UntilExpiry,
    /// A fixed limit regardless of the advisory expiry.
    After(Duration),
    /// Block until the response arrives or the round is dropped.
    Never,
}

impl RoundTimeout {
    /// Concrete limit for a request carrying `expiry`.
    pub fn resolve(&self, expiry: chrono::Duration) -> Option<Duration> {
        match self {
            Self::UntilExpiry => Some(expiry.to_std().unwrap_or(Duration::ZERO)),
            Self::After(limit) => Some(*limit),
            Self::Never => None,
        }
    }
}

/// Expiries and timeouts for exchange rounds.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub presentation_expiry: chrono::Duration,
    pub verification_expiry: chrono::Duration,
    pub round_timeout: RoundTimeout,
    /// Keep agreement credentials that pass the gate.
    pub store_accepted: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            presentation_expiry: chrono::Duration::minutes(5),
            verification_expiry: chrono::Duration::hours(24),
            round_timeout: RoundTimeout::default(),
            store_accepted: true,
        }
    }
}

/// Source of the terms document an agreement round asks to countersign.
pub trait AgreementTerms: Send + Sync {
    fn document(&self, issuer: &Address, counterparty: &Address) -> Object;
}

/// Drives exchange rounds from one local inbox.
pub struct CredentialExchangeOrchestrator {
    account: Arc<dyn Account>,
    registry: PendingRequestRegistry<ResponseEvent>,
    inbox: Address,
    config: ExchangeConfig,
}

impl CredentialExchangeOrchestrator {
    pub fn new(
        account: Arc<dyn Account>,
        registry: PendingRequestRegistry<ResponseEvent>,
        inbox: Address,
        config: ExchangeConfig,
    ) -> Self {
        Self {
            account,
            registry,
            inbox,
            config,
        }
    }

    pub fn inbox(&self) -> &Address {
        &self.inbox
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Ask `counterparty` for credentials matching any of `predicates`.
    #[instrument(skip(self, predicates))]
    pub async fn request_presentations(
        &self,
        counterparty: Address,
        predicates: Vec<Predicate>,
    ) -> Result<ExchangeOutcome> {
        let mut session = ExchangeSession::new(self.inbox, counterparty);
        let expiry = self.config.presentation_expiry;
        let expires = Utc::now() + expiry;

        let content = predicates
            .into_iter()
            .fold(
                CredentialPresentationRequest::builder().presentation_type(PRESENTATION_TYPE_CUSTOM),
                |builder, predicate| builder.predicate(predicate),
            )
            .expires(expires)
            .finish()?;

        let pending = self.registry.track(
            content.id().clone(),
            ContentType::CredentialPresentationResponse,
            Some(expires),
        )?;
        session.request_id = Some(content.id().clone());

        self.account.message_send(&counterparty, &content).await?;
        info!(request_id = %content.id(), "waiting for response to credential presentation request");

        let response = match pending.wait(self.config.round_timeout.resolve(expiry)).await? {
            ResponseEvent::Presentation { response, .. } => response,
            other => {
                return Err(InteractiveError::UnexpectedResponse {
                    expected: "presentation",
                    actual: other.kind(),
                })
            }
        };

        Ok(self.conclude(
            session,
            response.status(),
            response.presentations(),
            ClaimRequirement::None,
        ))
    }

    /// Run an agreement round: both parties sign the same terms.
    #[instrument(skip(self, terms))]
    pub async fn run_agreement(
        &self,
        counterparty: Address,
        terms: Object,
    ) -> Result<ExchangeOutcome> {
        let mut session = ExchangeSession::new(self.inbox, counterparty);
        let expiry = self.config.verification_expiry;
        let expires = Utc::now() + expiry;

        // Upload failures leave the round usable; the counterparty still sees
        // the terms hash.
        if let Err(error) = self.account.object_upload(&self.inbox, &terms).await {
            warn!(%error, "failed to upload agreement terms");
        }

        let unsigned = CredentialBuilder::new()
            .credential_type([CREDENTIAL_TYPE_VERIFIABLE, CREDENTIAL_TYPE_AGREEMENT])
            .subject(self.inbox)
            .issuer(self.inbox)
            .claim("termsHash", terms.hash_hex())
            .claim("terms", terms.id())
            .claim(
                "parties",
                validation::agreement_parties(&self.inbox, &counterparty),
            )
            .valid_from(Utc::now())
            .finish()?;
        let credential = self.account.credential_issue(&unsigned).await?;

        let presentation = self
            .present(
                [PRESENTATION_TYPE_AGREEMENT],
                std::slice::from_ref(&credential),
            )
            .await?;
        session.issued_credential = Some(credential);
        session.presentation = Some(presentation.clone());

        let content = CredentialVerificationRequest::builder()
            .credential_type([CREDENTIAL_TYPE_VERIFIABLE, CREDENTIAL_TYPE_AGREEMENT])
            .evidence("terms", &terms)
            .proof(presentation)
            .expires(expires)
            .finish()?;

        let pending = self.registry.track(
            content.id().clone(),
            ContentType::CredentialVerificationResponse,
            Some(expires),
        )?;
        session.request_id = Some(content.id().clone());

        self.account.message_send(&counterparty, &content).await?;
        info!(request_id = %content.id(), "waiting for response to credential verification request");

        let response = match pending.wait(self.config.round_timeout.resolve(expiry)).await? {
            ResponseEvent::Verification { response, .. } => response,
            other => {
                return Err(InteractiveError::UnexpectedResponse {
                    expected: "verification",
                    actual: other.kind(),
                })
            }
        };

        let outcome = self.conclude(
            session,
            response.status(),
            response.presentations(),
            ClaimRequirement::AgreementParties {
                issuer: self.inbox,
                responder: counterparty,
            },
        );

        if outcome.is_accepted() {
            info!(credentials = outcome.accepted.len(), "agreement is valid and signed by both parties");
            if self.config.store_accepted {
                for credential in &outcome.accepted {
                    if let Err(error) = self.account.credential_store(credential).await {
                        warn!(%error, "failed to store agreement credential");
                    }
                }
            }
        } else {
            warn!("agreement is not valid or not signed by both parties");
        }

        Ok(outcome)
    }

    /// Issue a customer credential to `counterparty` and send it.
    #[instrument(skip(self))]
    pub async fn issue_custom_credential(
        &self,
        counterparty: Address,
        name: &str,
    ) -> Result<VerifiableCredential> {
        let unsigned = CredentialBuilder::new()
            .credential_type([CREDENTIAL_TYPE_VERIFIABLE, CREDENTIAL_TYPE_CUSTOMER])
            .subject(counterparty)
            .issuer(self.inbox)
            .claim("name", name)
            .valid_from(Utc::now())
            .finish()?;
        let credential = self.account.credential_issue(&unsigned).await?;

        let content = CredentialMessage::new(credential.clone()).into_content()?;
        self.account.message_send(&counterparty, &content).await?;
        info!(request_id = %content.id(), "custom credential sent");

        Ok(credential)
    }

    async fn present<const N: usize>(
        &self,
        presentation_type: [&str; N],
        credentials: &[VerifiableCredential],
    ) -> Result<VerifiablePresentation> {
        let unsigned = credentials
            .iter()
            .cloned()
            .fold(
                PresentationBuilder::new()
                    .presentation_type(presentation_type)
                    .holder(self.inbox),
                |builder, credential| builder.credential_add(credential),
            )
            .finish()?;
        Ok(self.account.presentation_issue(&unsigned).await?)
    }

    fn conclude(
        &self,
        mut session: ExchangeSession,
        status: ResponseStatus,
        presentations: &[VerifiablePresentation],
        requirement: ClaimRequirement,
    ) -> ExchangeOutcome {
        info!(%status, presentations = presentations.len(), "response received");

        let Validated {
            accepted,
            rejections,
        } = if status.is_accepted() {
            validation::validate_presentations(
                self.account.as_ref(),
                presentations,
                &session.counterparty,
                &requirement,
                Utc::now(),
            )
        } else {
            warn!(%status, "counterparty did not accept the request");
            Validated::default()
        };

        session.status = if accepted.is_empty() {
            SessionStatus::Rejected
        } else {
            SessionStatus::Accepted
        };

        ExchangeOutcome {
            session,
            response_status: status,
            accepted,
            rejections,
        }
    }
}
