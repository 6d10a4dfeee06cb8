//! Terminal UI utilities

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use selfkit_interactive::ExchangeOutcome;
use std::time::Duration;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print a section header
pub fn header(text: &str) {
    println!("\n{}", text.bold().underline());
}

/// Print a key-value pair
pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Create a spinner progress indicator
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Prompt for user confirmation
pub fn confirm(prompt: &str, default: bool) -> anyhow::Result<bool> {
    use dialoguer::Confirm;
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

/// Prompt for text input
pub fn input(prompt: &str) -> anyhow::Result<String> {
    use dialoguer::Input;
    Ok(Input::new().with_prompt(prompt).interact_text()?)
}

/// Whether stdin is attached to a terminal
pub fn is_interactive() -> bool {
    console::user_attended()
}

/// Display a QR code in the terminal
pub fn qr_code(data: &str) -> anyhow::Result<()> {
    use qrcode::QrCode;

    let code = QrCode::new(data)?;
    let string = code
        .render::<char>()
        .quiet_zone(false)
        .module_dimensions(2, 1)
        .build();

    println!("\n{}\n", string);
    Ok(())
}

/// Print a separator line
pub fn separator() {
    println!("{}", "─".repeat(60).dimmed());
}

/// Print JSON prettily
pub fn json(value: &serde_json::Value) {
    if let Ok(pretty) = serde_json::to_string_pretty(value) {
        println!("{}", pretty);
    }
}

/// Print what a round verified and what it rejected
pub fn outcome(outcome: &ExchangeOutcome) {
    key_value("Response status", &outcome.response_status.to_string());

    for (credential_type, claims) in outcome.verified_claims() {
        header(&format!("Verified {}", credential_type.join(", ")));
        for (field, value) in claims {
            match value {
                serde_json::Value::String(text) => key_value(field, text),
                other => {
                    key_value(field, "");
                    json(other);
                }
            }
        }
    }

    for rejection in &outcome.rejections {
        warning(&format!(
            "Presentation {} rejected by {}: {}",
            rejection.index,
            rejection.reason.predicate(),
            rejection.reason
        ));
    }
}
