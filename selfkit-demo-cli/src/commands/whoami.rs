//! Whoami command - show current identity

use anyhow::Result;
use selfkit_demo_core::StorageKeySource;

use super::{identity_manager, GlobalArgs};
use crate::ui;

pub async fn run(args: &GlobalArgs) -> Result<()> {
    let config = args.config()?;
    let manager = identity_manager(&config);

    let Some(name) = manager.current_name() else {
        ui::error("No identity configured");
        ui::info("Run 'selfkit-demo setup' to create an identity");
        return Ok(());
    };

    ui::header("Current Identity");
    ui::key_value("Name", &name);
    ui::key_value("Environment", config.environment.as_str());

    if config.storage_key_source == StorageKeySource::Generated {
        ui::warning("SELFKIT_STORAGE_KEY is not set; cannot decrypt the identity");
        return Ok(());
    }

    let identity = manager.load(&name)?;
    let address = identity.address().to_string();
    ui::key_value("Address", &address);

    println!();
    ui::qr_code(&address)?;
    Ok(())
}
