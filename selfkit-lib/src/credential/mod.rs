//! Verifiable credentials and presentations.
//!
//! The types here are documents only. Signing and validation belong to the
//! [`Account`](crate::Account) implementation; this module supplies the
//! canonical digest that gets signed and the accessors the validation gate
//! reads (type, issuer, holder, subject claims, `validFrom`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{Address, Result, SelfkitError};

pub mod predicate;

pub const CREDENTIAL_TYPE_VERIFIABLE: &str = "VerifiableCredential";
pub const CREDENTIAL_TYPE_LIVENESS: &str = "LivenessCredential";
pub const CREDENTIAL_TYPE_EMAIL: &str = "EmailCredential";
pub const CREDENTIAL_TYPE_PASSPORT: &str = "PassportCredential";
pub const CREDENTIAL_TYPE_CUSTOMER: &str = "CustomerCredential";
pub const CREDENTIAL_TYPE_AGREEMENT: &str = "AgreementCredential";

pub const PRESENTATION_TYPE_VERIFIABLE: &str = "VerifiablePresentation";
pub const PRESENTATION_TYPE_AGREEMENT: &str = "AgreementPresentation";
pub const PRESENTATION_TYPE_CUSTOM: &str = "CustomPresentation";

pub const FIELD_TYPE: &str = "/type";
pub const FIELD_SUBJECT_LIVENESS_SOURCE_IMAGE_HASH: &str = "/credentialSubject/sourceImageHash";
pub const FIELD_SUBJECT_EMAIL_ADDRESS: &str = "/credentialSubject/emailAddress";
pub const FIELD_SUBJECT_PASSPORT_DOCUMENT_NUMBER: &str = "/credentialSubject/documentNumber";
pub const FIELD_SUBJECT_NAME: &str = "/credentialSubject/name";

/// Subject of a credential: its address plus free-form claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSubject {
    pub id: Address,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// A credential document before signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedCredential {
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    pub issuer: Address,
    pub credential_subject: CredentialSubject,
    pub valid_from: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl UnsignedCredential {
    /// SHA-256 over the canonical JSON form. This is what the issuer signs.
    pub fn signing_digest(&self) -> Result<[u8; 32]> {
        digest(self)
    }
}

/// Signature block attached to a credential or presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    /// Address whose key produced the signature.
    pub verification_method: Address,
    pub created: DateTime<Utc>,
    /// Hex-encoded signature.
    pub signature: String,
}

/// A signed credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiableCredential {
    #[serde(flatten)]
    credential: UnsignedCredential,
    proof: Proof,
}

impl VerifiableCredential {
    /// Attach a proof produced by the signer.
    pub fn from_parts(credential: UnsignedCredential, proof: Proof) -> Self {
        Self { credential, proof }
    }

    pub fn unsigned(&self) -> &UnsignedCredential {
        &self.credential
    }

    pub fn proof(&self) -> &Proof {
        &self.proof
    }

    pub fn credential_type(&self) -> &[String] {
        &self.credential.credential_type
    }

    /// Whether the type list contains `credential_type`.
    pub fn has_type(&self, credential_type: &str) -> bool {
        self.credential.credential_type.iter().any(|t| t == credential_type)
    }

    pub fn issuer(&self) -> &Address {
        &self.credential.issuer
    }

    pub fn subject(&self) -> &Address {
        &self.credential.credential_subject.id
    }

    /// Subject claims as a string-keyed map (the subject id excluded).
    pub fn subject_claims(&self) -> &Map<String, Value> {
        &self.credential.credential_subject.claims
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.credential.valid_from
    }

    /// Full JSON document, as predicates see it.
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Builder for [`UnsignedCredential`].
#[derive(Debug, Clone, Default)]
pub struct CredentialBuilder {
    credential_type: Vec<String>,
    subject: Option<Address>,
    claims: Map<String, Value>,
    issuer: Option<Address>,
    valid_from: Option<DateTime<Utc>>,
}

impl CredentialBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credential_type<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credential_type = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn subject(mut self, subject: Address) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Merge a map of claims into the subject.
    pub fn claims(mut self, claims: Map<String, Value>) -> Self {
        self.claims.extend(claims);
        self
    }

    pub fn claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    pub fn issuer(mut self, issuer: Address) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn valid_from(mut self, valid_from: DateTime<Utc>) -> Self {
        self.valid_from = Some(valid_from);
        self
    }

    pub fn finish(self) -> Result<UnsignedCredential> {
        let subject = self
            .subject
            .ok_or_else(|| SelfkitError::invalid_data("credential subject", "required"))?;
        let issuer = self
            .issuer
            .ok_or_else(|| SelfkitError::invalid_data("issuer", "required"))?;
        if self.claims.contains_key("id") {
            return Err(SelfkitError::invalid_data(
                "credential subject",
                "'id' is reserved for the subject address",
            ));
        }

        let mut credential_type = vec![CREDENTIAL_TYPE_VERIFIABLE.to_string()];
        credential_type.extend(
            self.credential_type
                .into_iter()
                .filter(|t| t != CREDENTIAL_TYPE_VERIFIABLE),
        );
        if credential_type.len() == 1 {
            return Err(SelfkitError::invalid_data("credential type", "required"));
        }

        let now = Utc::now();
        Ok(UnsignedCredential {
            credential_type,
            issuer,
            credential_subject: CredentialSubject {
                id: subject,
                claims: self.claims,
            },
            valid_from: self.valid_from.unwrap_or(now),
            created: now,
        })
    }
}

/// A presentation document before signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedPresentation {
    #[serde(rename = "type")]
    pub presentation_type: Vec<String>,
    pub holder: Address,
    pub verifiable_credential: Vec<VerifiableCredential>,
    pub created: DateTime<Utc>,
}

impl UnsignedPresentation {
    /// SHA-256 over the canonical JSON form. This is what the holder signs.
    pub fn signing_digest(&self) -> Result<[u8; 32]> {
        digest(self)
    }
}

/// A signed bundle of credentials presented by a holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiablePresentation {
    #[serde(flatten)]
    presentation: UnsignedPresentation,
    proof: Proof,
}

impl VerifiablePresentation {
    pub fn from_parts(presentation: UnsignedPresentation, proof: Proof) -> Self {
        Self {
            presentation,
            proof,
        }
    }

    pub fn unsigned(&self) -> &UnsignedPresentation {
        &self.presentation
    }

    pub fn proof(&self) -> &Proof {
        &self.proof
    }

    pub fn presentation_type(&self) -> &[String] {
        &self.presentation.presentation_type
    }

    pub fn holder(&self) -> &Address {
        &self.presentation.holder
    }

    pub fn credentials(&self) -> &[VerifiableCredential] {
        &self.presentation.verifiable_credential
    }
}

/// Builder for [`UnsignedPresentation`].
#[derive(Debug, Clone, Default)]
pub struct PresentationBuilder {
    presentation_type: Vec<String>,
    holder: Option<Address>,
    credentials: Vec<VerifiableCredential>,
}

impl PresentationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presentation_type<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presentation_type = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn holder(mut self, holder: Address) -> Self {
        self.holder = Some(holder);
        self
    }

    pub fn credential_add(mut self, credential: VerifiableCredential) -> Self {
        self.credentials.push(credential);
        self
    }

    pub fn finish(self) -> Result<UnsignedPresentation> {
        let holder = self
            .holder
            .ok_or_else(|| SelfkitError::invalid_data("holder", "required"))?;

        let mut presentation_type = vec![PRESENTATION_TYPE_VERIFIABLE.to_string()];
        presentation_type.extend(
            self.presentation_type
                .into_iter()
                .filter(|t| t != PRESENTATION_TYPE_VERIFIABLE),
        );

        Ok(UnsignedPresentation {
            presentation_type,
            holder,
            verifiable_credential: self.credentials,
            created: Utc::now(),
        })
    }
}

fn digest<T: Serialize>(document: &T) -> Result<[u8; 32]> {
    // Round-trip through Value so map keys are emitted in a stable order.
    let canonical = serde_json::to_vec(&serde_json::to_value(document)?)?;
    Ok(Sha256::digest(&canonical).into())
}
