//! Chat command - discover a counterparty and say hello

use anyhow::{Context, Result};
use selfkit_demo_core::{LoopbackAccount, SessionOptions};
use selfkit_interactive::chat::{self, GREETING};
use selfkit_lib::Address;

use super::{interruptible, Demo, GlobalArgs};
use crate::ui;

pub async fn run(args: &GlobalArgs) -> Result<()> {
    let demo = Demo::start(args, SessionOptions::default()).await?;
    let rounds = interruptible(demo.run_rounds(|responder| say_hello(&demo, responder))).await;
    demo.finish(rounds).await
}

async fn say_hello(demo: &Demo, responder: Address) -> Result<()> {
    let account: &LoopbackAccount = demo.session.account();
    let id = chat::send_with_notification(account, &responder, GREETING)
        .await
        .context("Failed to send chat message")?;

    ui::success(&format!("Sent \"{}\" to {}", GREETING, responder));
    ui::key_value("Message ID", &id.to_string());
    Ok(())
}
