//! Counterparty side of each correlated flow.
//!
//! The responder answers requests the way a scanning party would: discovery
//! requests open a connection and get an acceptance back; presentation
//! requests are answered from the credential store; agreement verification
//! requests are countersigned when the proof checks out.

use std::sync::Arc;

use chrono::Utc;
use selfkit_lib::credential::{
    CredentialBuilder, PresentationBuilder, VerifiableCredential, CREDENTIAL_TYPE_AGREEMENT,
    PRESENTATION_TYPE_AGREEMENT, PRESENTATION_TYPE_CUSTOM,
};
use selfkit_lib::event::MessageEvent;
use selfkit_lib::message::{
    ContentPayload, CredentialPresentationRequest, CredentialPresentationResponse,
    CredentialVerificationRequest, CredentialVerificationResponse, DiscoveryRequest,
    DiscoveryResponse, ResponseStatus,
};
use selfkit_lib::{Account, Address, ContentId, SelfkitError};
use tracing::{info, instrument, warn};

use crate::exchange::validation::{self, ClaimRequirement};
use crate::lifecycle::ConnectionLifecycle;
use crate::Result;

/// Answers discovery, presentation and verification requests.
pub struct Responder {
    account: Arc<dyn Account>,
    lifecycle: Option<Arc<ConnectionLifecycle>>,
}

impl Responder {
    pub fn new(account: Arc<dyn Account>) -> Self {
        Self {
            account,
            lifecycle: None,
        }
    }

    /// Record connections opened while answering discovery requests.
    pub fn with_lifecycle(mut self, lifecycle: Arc<ConnectionLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Open a connection with the requester and accept its discovery request.
    ///
    /// Returns `None` when the request has expired; nothing is sent then.
    #[instrument(skip_all, fields(request_id = %msg.id()))]
    pub async fn on_discovery_request(
        &self,
        msg: &MessageEvent,
        request: &DiscoveryRequest,
    ) -> Result<Option<ContentId>> {
        let now = Utc::now();
        if request.is_expired_at(now) || request.key_package().is_expired_at(now) {
            warn!(expires = %request.expires(), "ignoring expired discovery request");
            return Ok(None);
        }

        let requester = *request.key_package().owner();
        let group = self
            .account
            .connection_establish(&msg.to, request.key_package())
            .await?;
        info!(%requester, %group, "established connection with requester");
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.record(requester, group);
        }

        let content = DiscoveryResponse::new(msg.id().clone(), ResponseStatus::Accepted)
            .into_content()?;
        self.account.message_send(&requester, &content).await?;
        Ok(Some(content.id().clone()))
    }

    /// Present every held credential that satisfies the request.
    #[instrument(skip_all, fields(request_id = %msg.id(), from = %msg.from))]
    pub async fn on_presentation_request(
        &self,
        msg: &MessageEvent,
        request: &CredentialPresentationRequest,
    ) -> Result<ContentId> {
        let matching: Vec<VerifiableCredential> = self
            .account
            .credentials_list()
            .await?
            .into_iter()
            .filter(|c| c.subject().matches(&msg.to) && request.is_satisfied_by(c))
            .collect();

        let (status, presentations) = if matching.is_empty() {
            info!("no held credentials match the request");
            (ResponseStatus::NotFound, Vec::new())
        } else {
            info!(credentials = matching.len(), "presenting matching credentials");
            let unsigned = matching
                .into_iter()
                .fold(
                    PresentationBuilder::new()
                        .presentation_type([PRESENTATION_TYPE_CUSTOM])
                        .holder(msg.to),
                    |builder, c| builder.credential_add(c),
                )
                .finish()?;
            let presentation = self.account.presentation_issue(&unsigned).await?;
            (ResponseStatus::Accepted, vec![presentation])
        };

        let content =
            CredentialPresentationResponse::new(msg.id().clone(), status, presentations)
                .into_content()?;
        self.account.message_send(&msg.from, &content).await?;
        Ok(content.id().clone())
    }

    /// Countersign an agreement if the requester's proof holds up.
    #[instrument(skip_all, fields(request_id = %msg.id(), from = %msg.from))]
    pub async fn on_verification_request(
        &self,
        msg: &MessageEvent,
        request: &CredentialVerificationRequest,
    ) -> Result<ContentId> {
        let (status, presentations) = match self.countersign(msg, request).await {
            Ok(presentation) => {
                info!("agreement countersigned");
                (ResponseStatus::Accepted, vec![presentation])
            }
            Err(reason) => {
                warn!(%reason, "declining verification request");
                (ResponseStatus::NotAcceptable, Vec::new())
            }
        };

        let content =
            CredentialVerificationResponse::new(msg.id().clone(), status, presentations)
                .into_content()?;
        self.account.message_send(&msg.from, &content).await?;
        Ok(content.id().clone())
    }

    async fn countersign(
        &self,
        msg: &MessageEvent,
        request: &CredentialVerificationRequest,
    ) -> std::result::Result<selfkit_lib::VerifiablePresentation, SelfkitError> {
        if request.is_expired_at(Utc::now()) {
            return Err(SelfkitError::Expired {
                what: "verification request".into(),
                expired_at: request.expires().timestamp(),
            });
        }
        if !request
            .credential_type()
            .iter()
            .any(|t| t == CREDENTIAL_TYPE_AGREEMENT)
        {
            return Err(SelfkitError::ValidationFailed(
                "only agreement verification is supported".into(),
            ));
        }

        let validated = validation::validate_presentations(
            self.account.as_ref(),
            request.proof(),
            &msg.from,
            &ClaimRequirement::AgreementParties {
                issuer: msg.from,
                responder: msg.to,
            },
            Utc::now(),
        );
        let proof = validated
            .accepted
            .into_iter()
            .find(|c| c.has_type(CREDENTIAL_TYPE_AGREEMENT) && c.issuer().matches(&msg.from))
            .ok_or_else(|| SelfkitError::ValidationFailed("no valid agreement in proof".into()))?;

        let own = self.issue_counterpart(&msg.to, &proof).await?;
        let unsigned = PresentationBuilder::new()
            .presentation_type([PRESENTATION_TYPE_AGREEMENT])
            .holder(msg.to)
            .credential_add(proof)
            .credential_add(own)
            .finish()?;
        self.account.presentation_issue(&unsigned).await
    }

    async fn issue_counterpart(
        &self,
        signer: &Address,
        proof: &VerifiableCredential,
    ) -> std::result::Result<VerifiableCredential, SelfkitError> {
        let unsigned = CredentialBuilder::new()
            .credential_type(proof.credential_type().iter().cloned())
            .subject(*signer)
            .issuer(*signer)
            .claims(proof.subject_claims().clone())
            .valid_from(Utc::now())
            .finish()?;
        self.account.credential_issue(&unsigned).await
    }
}
