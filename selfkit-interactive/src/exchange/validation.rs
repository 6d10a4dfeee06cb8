//! Trust gate applied to every presentation a counterparty returns.
//!
//! Each candidate is checked independently, in order:
//!
//! 1. the presentation validates;
//! 2. its holder is the counterparty we asked;
//! 3. each embedded credential validates;
//! 4. the credential's `validFrom` is not in the future;
//! 5. for agreements, the `parties` claim lists both signatories.
//!
//! A failure skips that candidate only. The round is accepted when at least
//! one credential passes every check.

use chrono::{DateTime, Utc};
use selfkit_lib::credential::{VerifiableCredential, VerifiablePresentation};
use selfkit_lib::{Account, Address};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

/// Party tag an agreement must carry for both sides.
pub const SIGNATORY: &str = "signatory";

/// Claim-level requirement on top of the structural checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRequirement {
    /// Any claims are acceptable.
    None,
    /// `parties` must list both addresses as signatories.
    AgreementParties { issuer: Address, responder: Address },
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    PresentationInvalid(String),
    HolderMismatch { expected: Address, actual: Address },
    CredentialInvalid(String),
    NotYetValid { valid_from: DateTime<Utc> },
    AgreementPartiesMissing,
    ClaimsMalformed(String),
}

impl RejectionReason {
    /// Name of the check that failed.
    pub fn predicate(&self) -> &'static str {
        match self {
            Self::PresentationInvalid(_) => "presentation_valid",
            Self::HolderMismatch { .. } => "holder_matches",
            Self::CredentialInvalid(_) => "credential_valid",
            Self::NotYetValid { .. } => "valid_from_not_future",
            Self::AgreementPartiesMissing => "agreement_parties",
            Self::ClaimsMalformed(_) => "claims_well_formed",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PresentationInvalid(e) => write!(f, "presentation failed validation: {}", e),
            Self::HolderMismatch { expected, actual } => write!(
                f,
                "presentation holder {} is not the counterparty {}",
                actual, expected
            ),
            Self::CredentialInvalid(e) => write!(f, "credential failed validation: {}", e),
            Self::NotYetValid { valid_from } => {
                write!(f, "credential is not valid until {}", valid_from)
            }
            Self::AgreementPartiesMissing => {
                write!(f, "agreement is not signed by both parties")
            }
            Self::ClaimsMalformed(e) => write!(f, "credential claims are malformed: {}", e),
        }
    }
}

/// A rejected candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Index of the presentation in the response.
    pub index: usize,
    /// Index of the credential within that presentation, if the failure was
    /// credential-level.
    pub credential: Option<usize>,
    pub reason: RejectionReason,
}

/// Credentials that passed, and everything that did not.
#[derive(Debug, Clone, Default)]
pub struct Validated {
    pub accepted: Vec<VerifiableCredential>,
    pub rejections: Vec<Rejection>,
}

/// Run the gate over every presentation in a response.
pub fn validate_presentations(
    account: &dyn Account,
    presentations: &[VerifiablePresentation],
    expected_holder: &Address,
    requirement: &ClaimRequirement,
    now: DateTime<Utc>,
) -> Validated {
    let mut validated = Validated::default();

    for (index, presentation) in presentations.iter().enumerate() {
        if let Err(e) = account.presentation_validate(presentation) {
            reject(
                &mut validated,
                index,
                None,
                RejectionReason::PresentationInvalid(e.to_string()),
            );
            continue;
        }

        if !presentation.holder().matches(expected_holder) {
            reject(
                &mut validated,
                index,
                None,
                RejectionReason::HolderMismatch {
                    expected: *expected_holder,
                    actual: *presentation.holder(),
                },
            );
            continue;
        }

        for (position, credential) in presentation.credentials().iter().enumerate() {
            match check_credential(account, credential, requirement, now) {
                Ok(()) => {
                    debug!(
                        issuer = %credential.issuer(),
                        credential_type = ?credential.credential_type(),
                        "credential accepted"
                    );
                    validated.accepted.push(credential.clone());
                }
                Err(reason) => reject(&mut validated, index, Some(position), reason),
            }
        }
    }

    validated
}

/// Checks 3 to 5 for a single credential.
pub fn check_credential(
    account: &dyn Account,
    credential: &VerifiableCredential,
    requirement: &ClaimRequirement,
    now: DateTime<Utc>,
) -> Result<(), RejectionReason> {
    account
        .credential_validate(credential)
        .map_err(|e| RejectionReason::CredentialInvalid(e.to_string()))?;

    if credential.valid_from() > now {
        return Err(RejectionReason::NotYetValid {
            valid_from: credential.valid_from(),
        });
    }

    match requirement {
        ClaimRequirement::None => Ok(()),
        ClaimRequirement::AgreementParties { issuer, responder } => {
            check_agreement_parties(credential.subject_claims(), issuer, responder)
        }
    }
}

/// Check that `parties` tags both `issuer` and `responder` as signatories.
///
/// Entries that are not objects, lack a string `id`, or carry another `type`
/// are skipped rather than failing the whole claim.
pub fn check_agreement_parties(
    claims: &Map<String, Value>,
    issuer: &Address,
    responder: &Address,
) -> Result<(), RejectionReason> {
    let parties = match claims.get("parties") {
        Some(Value::Array(parties)) => parties,
        Some(_) => {
            return Err(RejectionReason::ClaimsMalformed(
                "parties claim is not an array".into(),
            ))
        }
        None => return Err(RejectionReason::AgreementPartiesMissing),
    };

    let issuer = issuer.to_string();
    let responder = responder.to_string();
    let mut has_issuer = false;
    let mut has_responder = false;

    for party in parties {
        let Some(party) = party.as_object() else {
            warn!("agreement party is not an object");
            continue;
        };
        if party.get("type").and_then(Value::as_str) != Some(SIGNATORY) {
            continue;
        }
        let Some(id) = party.get("id").and_then(Value::as_str) else {
            warn!("agreement party id is not a string");
            continue;
        };

        has_issuer |= id == issuer;
        has_responder |= id == responder;
    }

    if has_issuer && has_responder {
        Ok(())
    } else {
        Err(RejectionReason::AgreementPartiesMissing)
    }
}

/// Build the `parties` claim value for an agreement between two signatories.
pub fn agreement_parties(first: &Address, second: &Address) -> Value {
    serde_json::json!([
        { "type": SIGNATORY, "id": first.to_string() },
        { "type": SIGNATORY, "id": second.to_string() },
    ])
}

fn reject(
    validated: &mut Validated,
    index: usize,
    credential: Option<usize>,
    reason: RejectionReason,
) {
    warn!(
        index,
        credential,
        predicate = reason.predicate(),
        %reason,
        "rejected credential candidate"
    );
    validated.rejections.push(Rejection {
        index,
        credential,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn claims(parties: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("parties".into(), parties);
        map
    }

    #[test]
    fn test_agreement_gate_accepts_both_signatories() {
        let (a, b) = (addr(0xa), addr(0xb));
        assert!(check_agreement_parties(&claims(agreement_parties(&a, &b)), &a, &b).is_ok());
    }

    #[test]
    fn test_agreement_gate_rejects_missing_party() {
        let (a, b) = (addr(0xa), addr(0xb));
        let only_a = json!([{ "type": "signatory", "id": a.to_string() }]);
        let only_b = json!([{ "type": "signatory", "id": b.to_string() }]);

        assert_eq!(
            check_agreement_parties(&claims(only_a), &a, &b),
            Err(RejectionReason::AgreementPartiesMissing)
        );
        assert_eq!(
            check_agreement_parties(&claims(only_b), &a, &b),
            Err(RejectionReason::AgreementPartiesMissing)
        );
    }

    #[test]
    fn test_agreement_gate_requires_signatory_tag() {
        let (a, b) = (addr(0xa), addr(0xb));
        let parties = json!([
            { "type": "signatory", "id": a.to_string() },
            { "type": "witness", "id": b.to_string() },
        ]);
        assert!(check_agreement_parties(&claims(parties), &a, &b).is_err());
    }

    #[test]
    fn test_agreement_gate_skips_malformed_entries() {
        let (a, b) = (addr(0xa), addr(0xb));
        let parties = json!([
            "not an object",
            { "type": "signatory", "id": 42 },
            { "type": "signatory", "id": a.to_string() },
            { "type": "signatory", "id": b.to_string() },
        ]);
        assert!(check_agreement_parties(&claims(parties), &a, &b).is_ok());
    }

    #[test]
    fn test_agreement_gate_rejects_non_array() {
        let (a, b) = (addr(0xa), addr(0xb));
        let result = check_agreement_parties(&claims(json!("everyone")), &a, &b);
        assert!(matches!(result, Err(RejectionReason::ClaimsMalformed(_))));
        assert_eq!(
            check_agreement_parties(&Map::new(), &a, &b),
            Err(RejectionReason::AgreementPartiesMissing)
        );
    }

    #[test]
    fn test_predicate_names() {
        assert_eq!(
            RejectionReason::AgreementPartiesMissing.predicate(),
            "agreement_parties"
        );
        assert_eq!(
            RejectionReason::NotYetValid {
                valid_from: Utc::now()
            }
            .predicate(),
            "valid_from_not_future"
        );
    }
}
