//! Credential commands - request presentations and issue custom credentials

use anyhow::{Context, Result};
use clap::ValueEnum;
use selfkit_demo_core::SessionOptions;
use selfkit_lib::credential::predicate::Predicate;
use selfkit_lib::Address;

use super::{interruptible, Demo, GlobalArgs};
use crate::ui;

/// Kinds of credential the counterparty can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CredentialKind {
    /// Liveness check
    Liveness,
    /// Verified email address
    Email,
    /// Passport document number
    Document,
    /// Customer credential issued by a previous round
    Custom,
}

impl CredentialKind {
    pub fn predicate(self) -> Predicate {
        match self {
            Self::Liveness => Predicate::liveness(),
            Self::Email => Predicate::email(),
            Self::Document => Predicate::passport(),
            Self::Custom => Predicate::customer(),
        }
    }
}

pub async fn request(args: &GlobalArgs, kinds: &[CredentialKind]) -> Result<()> {
    let demo = Demo::start(args, SessionOptions::default()).await?;
    let rounds =
        interruptible(demo.run_rounds(|responder| request_round(&demo, kinds, responder))).await;
    demo.finish(rounds).await
}

async fn request_round(demo: &Demo, kinds: &[CredentialKind], responder: Address) -> Result<()> {    let predicates = kinds.iter().map(|kind| kind.predicate()).collect();

    let spinner = ui::spinner("Waiting for response to credential presentation request...");
    let outcome = demo
        .session
        .orchestrator()
        .request_presentations(responder, predicates)
        .await;
    spinner.finish_and_clear();
    let outcome = outcome.context("Presentation round failed")?;

    if outcome.is_accepted() {
        ui::success(&format!(
            "Received {} verified credential(s)",
            outcome.accepted.len()
        ));
    } else {
        ui::warning("No credential passed verification");
    }
    ui::outcome(&outcome);
    Ok(())
}

pub async fn issue(args: &GlobalArgs, name: &str) -> Result<()> {
    let demo = Demo::start(args, SessionOptions::default()).await?;
    let rounds = interruptible(demo.run_rounds(|responder| issue_round(&demo, name, responder))).await;
    demo.finish(rounds).await
}

async fn issue_round(demo: &Demo, name: &str, responder: Address) -> Result<()> {
    let credential = demo
        .session
        .orchestrator()
        .issue_custom_credential(responder, name)
        .await
        .context("Failed to issue credential")?;

    ui::success("Custom credential sent");
    ui::key_value("Type", &credential.credential_type().join(", "));
    ui::key_value("Issuer", &credential.issuer().to_string());
    ui::key_value("Subject", &credential.subject().to_string());
    ui::key_value("Name", name);
    Ok(())
}
