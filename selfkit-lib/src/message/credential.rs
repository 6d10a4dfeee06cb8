use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Content, ContentPayload, ContentType, ResponsePayload, ResponseStatus};
use crate::credential::predicate::Predicate;
use crate::credential::{VerifiableCredential, VerifiablePresentation};
use crate::{ContentId, Object, Result, SelfkitError};

/// Asks the counterparty to present credentials matching any of the predicate trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialPresentationRequest {
    presentation_type: Vec<String>,
    predicates: Vec<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<DateTime<Utc>>,
}

impl CredentialPresentationRequest {
    pub fn builder() -> CredentialPresentationRequestBuilder {
        CredentialPresentationRequestBuilder::default()
    }

    pub fn presentation_type(&self) -> &[String] {
        &self.presentation_type
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    /// Whether a credential satisfies at least one of the requested trees.
    pub fn is_satisfied_by(&self, credential: &VerifiableCredential) -> bool {
        self.predicates.iter().any(|p| p.matches(credential))
    }
}

impl ContentPayload for CredentialPresentationRequest {
    const CONTENT_TYPE: ContentType = ContentType::CredentialPresentationRequest;
}

#[derive(Debug, Clone, Default)]
pub struct CredentialPresentationRequestBuilder {
    presentation_type: Vec<String>,
    predicates: Vec<Predicate>,
    expires: Option<DateTime<Utc>>,
}

impl CredentialPresentationRequestBuilder {
    pub fn presentation_type(mut self, presentation_type: &str) -> Self {
        self.presentation_type.push(presentation_type.to_string());
        self
    }

    /// Add a predicate tree. A credential matching any tree is eligible.
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn finish(self) -> Result<Content> {
        if self.predicates.is_empty() {
            return Err(SelfkitError::invalid_data(
                "predicates",
                "at least one predicate tree is required",
            ));
        }

        let mut presentation_type = vec![crate::credential::PRESENTATION_TYPE_VERIFIABLE.to_string()];
        presentation_type.extend(
            self.presentation_type
                .into_iter()
                .filter(|t| t != crate::credential::PRESENTATION_TYPE_VERIFIABLE),
        );

        CredentialPresentationRequest {
            presentation_type,
            predicates: self.predicates,
            expires: self.expires,
        }
        .into_content()
    }
}

/// Presentations returned for a [`CredentialPresentationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialPresentationResponse {
    response_to: ContentId,
    status: ResponseStatus,
    #[serde(default)]
    presentations: Vec<VerifiablePresentation>,
}

impl CredentialPresentationResponse {
    pub fn new(
        response_to: ContentId,
        status: ResponseStatus,
        presentations: Vec<VerifiablePresentation>,
    ) -> Self {
        Self {
            response_to,
            status,
            presentations,
        }
    }

    pub fn presentations(&self) -> &[VerifiablePresentation] {
        &self.presentations
    }
}

impl ContentPayload for CredentialPresentationResponse {
    const CONTENT_TYPE: ContentType = ContentType::CredentialPresentationResponse;
}

impl ResponsePayload for CredentialPresentationResponse {
    fn response_to(&self) -> &ContentId {
        &self.response_to
    }

    fn status(&self) -> ResponseStatus {
        self.status
    }
}

/// Reference to an uploaded object backing a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub name: String,
    pub object_id: String,
    pub hash: String,
    pub mime: String,
}

impl Evidence {
    pub fn from_object(name: impl Into<String>, object: &Object) -> Self {
        Self {
            name: name.into(),
            object_id: object.id().to_string(),
            hash: object.hash_hex(),
            mime: object.mime().to_string(),
        }
    }
}

/// Asks the counterparty to verify a proof and answer with credentials of the given type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialVerificationRequest {
    credential_type: Vec<String>,
    #[serde(default)]
    evidence: Vec<Evidence>,
    #[serde(default)]
    proof: Vec<VerifiablePresentation>,
    expires: DateTime<Utc>,
}

impl CredentialVerificationRequest {
    pub fn builder() -> CredentialVerificationRequestBuilder {
        CredentialVerificationRequestBuilder::default()
    }

    pub fn credential_type(&self) -> &[String] {
        &self.credential_type
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn proof(&self) -> &[VerifiablePresentation] {
        &self.proof
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

impl ContentPayload for CredentialVerificationRequest {
    const CONTENT_TYPE: ContentType = ContentType::CredentialVerificationRequest;
}

#[derive(Debug, Clone, Default)]
pub struct CredentialVerificationRequestBuilder {
    credential_type: Vec<String>,
    evidence: Vec<Evidence>,
    proof: Vec<VerifiablePresentation>,
    expires: Option<DateTime<Utc>>,
}

impl CredentialVerificationRequestBuilder {
    pub fn credential_type<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credential_type = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn evidence(mut self, name: &str, object: &Object) -> Self {
        self.evidence.push(Evidence::from_object(name, object));
        self
    }

    pub fn proof(mut self, presentation: VerifiablePresentation) -> Self {
        self.proof.push(presentation);
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn finish(self) -> Result<Content> {
        if self.credential_type.is_empty() {
            return Err(SelfkitError::invalid_data("credential type", "required"));
        }
        let expires = self
            .expires
            .ok_or_else(|| SelfkitError::invalid_data("expires", "required"))?;

        CredentialVerificationRequest {
            credential_type: self.credential_type,
            evidence: self.evidence,
            proof: self.proof,
            expires,
        }
        .into_content()
    }
}

/// Answer to a [`CredentialVerificationRequest`].
///
/// Credentials travel inside presentations held by the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialVerificationResponse {
    response_to: ContentId,
    status: ResponseStatus,
    #[serde(default)]
    presentations: Vec<VerifiablePresentation>,
}

impl CredentialVerificationResponse {
    pub fn new(
        response_to: ContentId,
        status: ResponseStatus,
        presentations: Vec<VerifiablePresentation>,
    ) -> Self {
        Self {
            response_to,
            status,
            presentations,
        }
    }

    pub fn presentations(&self) -> &[VerifiablePresentation] {
        &self.presentations
    }

    /// All credentials across every returned presentation.
    pub fn credentials(&self) -> impl Iterator<Item = &VerifiableCredential> {
        self.presentations.iter().flat_map(|p| p.credentials())
    }
}

impl ContentPayload for CredentialVerificationResponse {
    const CONTENT_TYPE: ContentType = ContentType::CredentialVerificationResponse;
}

impl ResponsePayload for CredentialVerificationResponse {
    fn response_to(&self) -> &ContentId {
        &self.response_to
    }

    fn status(&self) -> ResponseStatus {
        self.status
    }
}

/// An issued credential handed to its subject without being asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialMessage {
    credential: VerifiableCredential,
}

impl CredentialMessage {
    pub fn new(credential: VerifiableCredential) -> Self {
        Self { credential }
    }

    pub fn credential(&self) -> &VerifiableCredential {
        &self.credential
    }

    pub fn into_credential(self) -> VerifiableCredential {
        self.credential
    }
}

impl ContentPayload for CredentialMessage {
    const CONTENT_TYPE: ContentType = ContentType::Credential;
}
