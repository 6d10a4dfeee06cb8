//! Serve command - answer requests and run rounds for chat commands

use anyhow::{Context, Result};
use selfkit_demo_core::SessionOptions;
use selfkit_interactive::ChatCommand;
use std::time::Duration;

use super::{interruptible, Demo, GlobalArgs};
use crate::ui;

pub async fn run(args: &GlobalArgs, send: &[ChatCommand], duration: Option<u64>) -> Result<()> {
    let options = SessionOptions {
        answer_requests: true,
        serve_commands: true,
    };
    let demo = Demo::start(args, options).await?;
    let round = interruptible(serve(&demo, send, duration)).await;

    let stats = demo.session.stats().snapshot();
    ui::header("Session Statistics");
    ui::key_value("Events received", &stats.received.to_string());
    ui::key_value("Responses resolved", &stats.resolved.to_string());
    ui::key_value("Unknown requests", &stats.unknown_requests.to_string());
    ui::key_value("Decode failures", &stats.decode_failures.to_string());
    ui::key_value(
        "Unfinished rounds",
        &demo.session.handler().active_rounds().to_string(),
    );

    demo.finish(round).await
}

async fn serve(demo: &Demo, send: &[ChatCommand], duration: Option<u64>) -> Result<()> {
    let mut handshake = demo.session.handshake();
    let responder = demo.discover(&mut handshake).await?;

    ui::header("Command Server");
    ui::info(&format!("Serving chat commands from {}", responder));
    for command in ChatCommand::ALL {
        ui::key_value("Command", command.as_str());
    }
    ui::separator();

    if let Some(peer) = &demo.peer {
        for command in send {
            peer.send_chat(&demo.session.inbox(), command.as_str())
                .await
                .context("Simulated peer failed to send command")?;
            ui::info(&format!("Simulated peer sent {}", command));
        }
    }

    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            ui::info("Press Ctrl-C to stop");
            std::future::pending::<()>().await
        }
    }
    Ok(())
}
