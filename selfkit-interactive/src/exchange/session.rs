use selfkit_lib::credential::{VerifiableCredential, VerifiablePresentation};
use selfkit_lib::message::ResponseStatus;
use selfkit_lib::{Address, ContentId};
use serde_json::{Map, Value};

use super::validation::Rejection;

/// Where an exchange round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Accepted,
    Rejected,
}

/// One exchange round with one counterparty. Not persisted.
#[derive(Debug, Clone)]
pub struct ExchangeSession {
    pub local: Address,
    pub counterparty: Address,
    /// Credential we issued for this round, if any.
    pub issued_credential: Option<VerifiableCredential>,
    /// Presentation we sent as proof, if any.
    pub presentation: Option<VerifiablePresentation>,
    /// Id of the request awaiting an answer.
    pub request_id: Option<ContentId>,
    pub status: SessionStatus,
}

impl ExchangeSession {
    pub fn new(local: Address, counterparty: Address) -> Self {
        Self {
            local,
            counterparty,
            issued_credential: None,
            presentation: None,
            request_id: None,
            status: SessionStatus::Pending,
        }
    }
}

/// Result of one completed round.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub session: ExchangeSession,
    /// Status the counterparty answered with.
    pub response_status: ResponseStatus,
    /// Credentials that passed every check.
    pub accepted: Vec<VerifiableCredential>,
    /// Every candidate that failed, with the first check it failed.
    pub rejections: Vec<Rejection>,
}

impl ExchangeOutcome {
    pub fn is_accepted(&self) -> bool {
        self.session.status == SessionStatus::Accepted
    }

    /// Subject claims of each accepted credential, keyed by its type list.
    pub fn verified_claims(&self) -> Vec<(&[String], &Map<String, Value>)> {
        self.accepted
            .iter()
            .map(|c| (c.credential_type(), c.subject_claims()))
            .collect()
    }
}
