//! Simulated counterparty.
//!
//! The peer is a second account on the same loopback network. It answers
//! every request through a [`Responder`](selfkit_interactive::Responder),
//! holds a credential of each well-known kind, and "scans" discovery codes on
//! its own after a short delay, standing in for a person with a phone.

use anyhow::{Context, Result};
use chrono::Utc;
use selfkit_interactive::chat;
use selfkit_lib::credential::{
    CredentialBuilder, CREDENTIAL_TYPE_CUSTOMER, CREDENTIAL_TYPE_EMAIL,
    CREDENTIAL_TYPE_LIVENESS, CREDENTIAL_TYPE_PASSPORT,
};
use selfkit_lib::{Account, Address, ContentId};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::DemoConfig;
use crate::identity::Identity;
use crate::loopback::{LoopbackAccount, LoopbackNetwork};
use crate::session::{DemoSession, SessionOptions};

pub const PEER_NAME: &str = "Simulated Peer";

/// Credentials the peer holds: type and the claim its predicate checks.
const HELD_CREDENTIALS: [(&str, &str, &str); 4] = [
    (CREDENTIAL_TYPE_LIVENESS, "sourceImageHash", "9f86d081884c7d659a2feaa0c55ad015"),
    (CREDENTIAL_TYPE_EMAIL, "emailAddress", "peer@example.com"),
    (CREDENTIAL_TYPE_PASSPORT, "documentNumber", "P1234567"),
    (CREDENTIAL_TYPE_CUSTOMER, "name", PEER_NAME),
];

pub struct SimulatedPeer {
    session: DemoSession,
    network: LoopbackNetwork,
    delay: Duration,
}

impl SimulatedPeer {
    /// Open the peer's session and give it its credentials.
    pub async fn start(network: &LoopbackNetwork, config: &DemoConfig) -> Result<Self> {
        let identity = Identity::generate().with_nickname(PEER_NAME);
        let session = DemoSession::open(
            network,
            config,
            &identity,
            SessionOptions {
                answer_requests: true,
                serve_commands: false,
            },
        )?;

        let account = session.account();
        let issuer = account
            .inbox_open()
            .await
            .context("Failed to open issuer inbox")?;
        for (credential_type, claim, value) in HELD_CREDENTIALS {
            let unsigned = CredentialBuilder::new()
                .credential_type([credential_type])
                .subject(session.inbox())
                .issuer(issuer)
                .claim(claim, value)
                .valid_from(Utc::now())
                .finish()?;
            let credential = account.credential_issue(&unsigned).await?;
            account.credential_store(&credential).await?;
        }

        info!(inbox = %session.inbox(), "simulated peer ready");
        Ok(Self {
            session,
            network: network.clone(),
            delay: config.peer_delay,
        })
    }

    pub fn inbox(&self) -> Address {
        self.session.inbox()
    }

    pub fn session(&self) -> &DemoSession {
        &self.session
    }

    /// Scan `code` once the configured delay has passed.
    pub fn scan_after_delay(&self, code: String) -> JoinHandle<()> {
        let network = self.network.clone();
        let inbox = self.inbox();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = network.scan(&code, &inbox) {
                warn!(%error, "simulated peer could not scan code");
            }
        })
    }

    /// Send a chat message to a connected counterparty.
    pub async fn send_chat(&self, to: &Address, text: &str) -> Result<ContentId> {
        let account: &LoopbackAccount = self.session.account();
        chat::send_with_notification(account, to, text)
            .await
            .context("Simulated peer failed to send chat")
    }

    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }
}
