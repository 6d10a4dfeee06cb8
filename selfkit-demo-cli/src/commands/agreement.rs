//! Agreement command - have the counterparty countersign a terms document

use anyhow::{Context, Result};
use selfkit_demo_core::{PlainTextTerms, SessionOptions};
use selfkit_interactive::AgreementTerms;
use selfkit_lib::Address;

use super::{interruptible, Demo, GlobalArgs};
use crate::ui;

pub async fn run(args: &GlobalArgs, title: &str) -> Result<()> {
    let demo = Demo::start(args, SessionOptions::default()).await?;
    let rounds = interruptible(demo.run_rounds(|responder| sign(&demo, title, responder))).await;
    demo.finish(rounds).await
}

async fn sign(demo: &Demo, title: &str, responder: Address) -> Result<()> {
    let terms = PlainTextTerms::new(title).document(&demo.session.inbox(), &responder);
    ui::header("Agreement");
    ui::key_value("Terms", terms.id());
    ui::key_value("Terms hash", &terms.hash_hex());

    let spinner = ui::spinner("Waiting for the counterparty to sign...");
    let outcome = demo
        .session
        .orchestrator()
        .run_agreement(responder, terms)
        .await;
    spinner.finish_and_clear();
    let outcome = outcome.context("Agreement round failed")?;

    if outcome.is_accepted() {
        ui::success("Agreement is valid and signed by both parties");
    } else {
        ui::warning("Agreement is not valid or not signed by both parties");
    }
    ui::outcome(&outcome);
    Ok(())
}
